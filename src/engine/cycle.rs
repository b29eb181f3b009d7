//! One aggregation cycle, end to end.
//!
//! Phase A fetches the FX rate and the domestic reference prices
//! concurrently; both are frozen into `MarginInputs` before any global
//! exchange is swept. Phase B sweeps every exchange into a fresh
//! best-quote table. Once all sweeps have finished, margins are computed,
//! persisted and checked against the alert threshold.
//!
//! Every cycle owns its own `AggregationContext`, so a scheduled cycle and
//! an on-demand HTTP cycle can run side by side without sharing quotes.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::alerts::{AlertGate, AlertOutcome};
use crate::engine::margin::{compute_margins, MarginInputs, MarginSheet};
use crate::engine::normalizer::Vocabulary;
use crate::engine::orchestrator::{self, DomesticSink, ExchangeTask, SelectorSink, SweepReport};
use crate::engine::report;
use crate::engine::selector::BestQuoteSelector;
use crate::fx::FxSource;
use crate::storage::MarginSink;
use crate::types::{CurrencyCode, MarginRecord, SelectionPolicy};

/// Cycle-scoped state: created at the start of a cycle, dropped at its end.
pub struct AggregationContext {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub inputs: Arc<MarginInputs>,
    pub selector: Arc<BestQuoteSelector>,
}

impl AggregationContext {
    pub fn new(
        cycle_id: Uuid,
        started_at: DateTime<Utc>,
        policy: SelectionPolicy,
        inputs: MarginInputs,
    ) -> Self {
        let inputs = Arc::new(inputs);
        Self {
            cycle_id,
            started_at,
            selector: Arc::new(BestQuoteSelector::new(policy, inputs.clone())),
            inputs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub policy: SelectionPolicy,
    /// Alert threshold as a fraction.
    pub threshold: f64,
    /// Bases that never trigger an alert.
    pub excluded_bases: Vec<CurrencyCode>,
    pub domestic_fiat: String,
}

/// Everything a cycle produced, for reporting.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub policy: SelectionPolicy,
    pub fx: Option<f64>,
    /// Pairs in the final best-quote table.
    pub quotes: usize,
    /// Bases with a domestic sell price.
    pub domestic: usize,
    pub sheet: MarginSheet,
    pub domestic_sweep: SweepReport,
    pub sweeps: Vec<SweepReport>,
    pub alert: AlertOutcome,
    /// Margin rows successfully written.
    pub persisted: usize,
}

pub struct CycleRunner {
    settings: CycleSettings,
    vocabulary: Arc<Vocabulary>,
    domestic: ExchangeTask,
    exchanges: Vec<ExchangeTask>,
    fx: Arc<dyn FxSource>,
    margins: Arc<dyn MarginSink>,
    alerts: AlertGate,
}

impl CycleRunner {
    pub fn new(
        settings: CycleSettings,
        vocabulary: Arc<Vocabulary>,
        domestic: ExchangeTask,
        exchanges: Vec<ExchangeTask>,
        fx: Arc<dyn FxSource>,
        margins: Arc<dyn MarginSink>,
        alerts: AlertGate,
    ) -> Self {
        Self {
            settings,
            vocabulary,
            domestic,
            exchanges,
            fx,
            margins,
            alerts,
        }
    }

    /// Run one cycle. Individual failures are logged and contained; this
    /// never returns an error.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("cycle", id = %cycle_id);
        self.run_phases(cycle_id, Utc::now()).instrument(span).await
    }

    async fn run_phases(&self, cycle_id: Uuid, started_at: DateTime<Utc>) -> CycleOutcome {
        // Phase A: FX and domestic reference, concurrently.
        let domestic_sink = DomesticSink::new(self.vocabulary.clone(), &self.settings.domestic_fiat);
        let (fx, domestic_sweep) = tokio::join!(
            self.fx.rate(),
            orchestrator::sweep(
                self.domestic.exchange.as_ref(),
                self.domestic.concurrency,
                &domestic_sink
            )
        );
        let fx = match fx {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(source = self.fx.name(), error = %e, "FX rate unavailable, margins undefined this cycle");
                None
            }
        };
        let reference = domestic_sink.into_reference();
        let domestic = reference.len();

        let ctx = AggregationContext::new(
            cycle_id,
            started_at,
            self.settings.policy,
            MarginInputs::new(self.vocabulary.usd().clone(), fx, reference),
        );
        info!(fx = ?ctx.inputs.fx(), domestic, "Reference inputs ready");

        // Phase B: global exchanges.
        let sink = SelectorSink::new(self.vocabulary.clone(), ctx.selector.clone());
        let sweeps = orchestrator::sweep_all(&self.exchanges, &sink).await;

        let quotes = ctx.selector.finalize();
        let sheet = compute_margins(&quotes, &ctx.inputs);
        let persisted = self.persist(&sheet, ctx.started_at).await;

        let hot = sheet.above(self.settings.threshold, &self.settings.excluded_bases);
        let alert = self
            .alerts
            .maybe_alert(&hot, self.settings.threshold, Utc::now())
            .await;

        info!(
            quotes = quotes.len(),
            margins = sheet.len(),
            undefined = sheet.undefined.len(),
            hot = hot.len(),
            persisted,
            "Cycle complete"
        );

        CycleOutcome {
            cycle_id: ctx.cycle_id,
            started_at: ctx.started_at,
            policy: self.settings.policy,
            fx: ctx.inputs.fx(),
            quotes: quotes.len(),
            domestic,
            domestic_sweep,
            sweeps,
            alert,
            persisted,
            sheet,
        }
    }

    async fn persist(&self, sheet: &MarginSheet, timestamp: DateTime<Utc>) -> usize {
        let mut written = 0;
        for margin in sheet.all() {
            let record = MarginRecord::from_margin(margin, timestamp);
            match self.margins.record_margin(&record).await {
                Ok(()) => written += 1,
                Err(e) => warn!(code = %record.code, error = %e, "Failed to persist margin"),
            }
        }
        written
    }

    /// Run a cycle and render its report. A panic anywhere in the cycle is
    /// caught and returned as an error string so the scheduler keeps going.
    pub async fn generate_report(&self) -> String {
        match AssertUnwindSafe(self.run_cycle()).catch_unwind().await {
            Ok(outcome) => report::render(&outcome),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(error = %message, "Report generation failed");
                format!("Report generation failed: {message}")
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::alerts::limiter::AlertRateLimiter;
    use crate::alerts::LogNotifier;
    use crate::exchanges::{Exchange, Listing};
    use crate::fx::FixedFx;
    use crate::storage::SqliteStore;
    use crate::types::RawTicker;
    use async_trait::async_trait;

    /// Exchange that answers every listing with the same snapshot.
    pub(crate) struct Static {
        pub id: &'static str,
        pub tickers: Vec<RawTicker>,
    }

    #[async_trait]
    impl Exchange for Static {
        fn id(&self) -> &str {
            self.id
        }

        async fn list(&self) -> anyhow::Result<Listing> {
            Ok(Listing::Snapshot(self.tickers.clone()))
        }

        async fn ticker(&self, _market: &str) -> anyhow::Result<Option<RawTicker>> {
            Ok(None)
        }
    }

    pub(crate) fn settings() -> CycleSettings {
        CycleSettings {
            policy: SelectionPolicy::LowestPrice,
            threshold: 0.10,
            excluded_bases: vec![],
            domestic_fiat: "IDR".into(),
        }
    }

    /// BTC at 9000 USD abroad and 10000 at home (fx 1), ETH/BTC at 0.05
    /// against a domestic 460.
    pub(crate) async fn runner() -> CycleRunner {
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
        let domestic = Static {
            id: "indodax",
            tickers: vec![RawTicker::new("BTCIDR", 10_000.0), RawTicker::new("ETHIDR", 460.0)],
        };
        let global = Static {
            id: "binance",
            tickers: vec![RawTicker::new("BTCUSD", 9000.0), RawTicker::new("ETHBTC", 0.05)],
        };
        CycleRunner::new(
            settings(),
            Arc::new(Vocabulary::new(&["BTC", "ETH"], "USD")),
            ExchangeTask::new(Arc::new(domestic), 1),
            vec![ExchangeTask::new(Arc::new(global), 5)],
            Arc::new(FixedFx(1.0)),
            store.clone(),
            AlertGate::new(
                AlertRateLimiter::new(store, chrono::Duration::minutes(5)),
                Arc::new(LogNotifier),
                vec![],
                "Arbitrage margin alert".into(),
            ),
        )
    }
}
