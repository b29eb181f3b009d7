//! Mock exchange and collaborators for integration testing.
//!
//! Everything is in-memory and fully controllable from test code: prices
//! can be changed between cycles, the listing or single markets can be
//! forced to fail, and every notifier call is recorded.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use spreadwatch::alerts::limiter::AlertRateLimiter;
use spreadwatch::alerts::{AlertGate, Notifier};
use spreadwatch::engine::cycle::{CycleRunner, CycleSettings};
use spreadwatch::engine::normalizer::Vocabulary;
use spreadwatch::engine::orchestrator::ExchangeTask;
use spreadwatch::exchanges::{Exchange, Listing};
use spreadwatch::fx::{FixedFx, FxSource};
use spreadwatch::storage::{MarginSink, SqliteStore};
use spreadwatch::types::{MarginRecord, RawTicker, SelectionPolicy};

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// How the mock answers its listing call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// One listing call carrying every price.
    Snapshot,
    /// Market ids first, then one ticker call per market.
    Markets,
}

pub struct MockExchange {
    id: String,
    mode: Mode,
    prices: Mutex<BTreeMap<String, f64>>,
    failing_markets: Mutex<HashSet<String>>,
    listing_error: Mutex<Option<String>>,
    panic_on_list: bool,
}

impl MockExchange {
    pub fn new(id: &str, mode: Mode, prices: &[(&str, f64)]) -> Self {
        Self {
            id: id.to_string(),
            mode,
            prices: Mutex::new(prices.iter().map(|(s, p)| (s.to_string(), *p)).collect()),
            failing_markets: Mutex::new(HashSet::new()),
            listing_error: Mutex::new(None),
            panic_on_list: false,
        }
    }

    pub fn snapshot(id: &str, prices: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self::new(id, Mode::Snapshot, prices))
    }

    pub fn markets(id: &str, prices: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self::new(id, Mode::Markets, prices))
    }

    /// An exchange whose listing panics, standing in for a defect.
    pub fn panicking(id: &str) -> Arc<Self> {
        Arc::new(Self {
            panic_on_list: true,
            ..Self::new(id, Mode::Snapshot, &[])
        })
    }

    /// Replace the whole price table.
    pub fn set_prices(&self, prices: &[(&str, f64)]) {
        *self.prices.lock().unwrap() = prices.iter().map(|(s, p)| (s.to_string(), *p)).collect();
    }

    /// Force the listing call to fail.
    pub fn set_listing_error(&self, msg: &str) {
        *self.listing_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Force the ticker call for one market to fail.
    pub fn fail_market(&self, market: &str) {
        self.failing_markets.lock().unwrap().insert(market.to_string());
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list(&self) -> Result<Listing> {
        if self.panic_on_list {
            panic!("{} listing exploded", self.id);
        }
        if let Some(msg) = self.listing_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let prices = self.prices.lock().unwrap();
        Ok(match self.mode {
            Mode::Snapshot => Listing::Snapshot(
                prices.iter().map(|(s, p)| RawTicker::new(s.as_str(), *p)).collect(),
            ),
            Mode::Markets => Listing::Markets(prices.keys().cloned().collect()),
        })
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        tokio::task::yield_now().await;
        if self.failing_markets.lock().unwrap().contains(market) {
            return Err(anyhow!("HTTP 502 for {market}"));
        }
        let price = self.prices.lock().unwrap().get(market).copied();
        Ok(price.map(|p| RawTicker::new(market, p)))
    }
}

// ---------------------------------------------------------------------------
// Notifier and sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentAlert {
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()> {
        self.sent.lock().unwrap().push(SentAlert {
            subject: subject.to_string(),
            body: body.to_string(),
            recipients: recipients.to_vec(),
        });
        Ok(())
    }
}

/// Margin sink that rejects every write.
pub struct BrokenSink;

#[async_trait]
impl MarginSink for BrokenSink {
    async fn record_margin(&self, record: &MarginRecord) -> Result<()> {
        Err(anyhow!("disk full writing {}", record.code))
    }
}

/// FX source whose feed is down.
pub struct DownFx;

#[async_trait]
impl FxSource for DownFx {
    async fn rate(&self) -> Result<f64> {
        Err(anyhow!("fx feed unreachable"))
    }

    fn name(&self) -> &str {
        "down"
    }
}

// ---------------------------------------------------------------------------
// Runner assembly
// ---------------------------------------------------------------------------

pub const RECIPIENT: &str = "ops@example.com";

/// Knobs for assembling a `CycleRunner` around mocks.
pub struct Harness {
    pub codes: Vec<&'static str>,
    pub policy: SelectionPolicy,
    pub threshold: f64,
    pub excluded_bases: Vec<&'static str>,
    pub fx: Arc<dyn FxSource>,
    pub store: Arc<SqliteStore>,
    pub sink: Option<Arc<dyn MarginSink>>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub async fn new(codes: &[&'static str]) -> Self {
        Self {
            codes: codes.to_vec(),
            policy: SelectionPolicy::LowestPrice,
            threshold: 0.10,
            excluded_bases: Vec::new(),
            fx: Arc::new(FixedFx(1.0)),
            store: Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap()),
            sink: None,
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn runner(&self, domestic: Arc<dyn Exchange>, exchanges: Vec<Arc<dyn Exchange>>) -> CycleRunner {
        let settings = CycleSettings {
            policy: self.policy,
            threshold: self.threshold,
            excluded_bases: self
                .excluded_bases
                .iter()
                .map(|b| spreadwatch::types::CurrencyCode::new(b))
                .collect(),
            domestic_fiat: "IDR".into(),
        };
        let sink: Arc<dyn MarginSink> = match &self.sink {
            Some(sink) => sink.clone(),
            None => self.store.clone(),
        };
        let gate = AlertGate::new(
            AlertRateLimiter::new(self.store.clone(), chrono::Duration::minutes(5)),
            self.notifier.clone(),
            vec![RECIPIENT.to_string()],
            "Arbitrage margin alert".into(),
        );
        CycleRunner::new(
            settings,
            Arc::new(Vocabulary::new(self.codes.as_slice(), "USD")),
            ExchangeTask::new(domestic, 2),
            exchanges.into_iter().map(|e| ExchangeTask::new(e, 3)).collect(),
            self.fx.clone(),
            sink,
            gate,
        )
    }
}
