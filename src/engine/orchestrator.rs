//! Fetch orchestration.
//!
//! Sweeps every exchange concurrently. Within one exchange, ticker
//! requests run with a bounded number in flight; each result is handed to
//! the sink as soon as it arrives, so nothing is buffered per exchange.
//!
//! Failures are contained: a failed listing empties that exchange for the
//! cycle, a failed ticker loses that one market. Neither aborts the sweep.

use dashmap::DashMap;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::margin::DomesticReference;
use crate::engine::normalizer::Vocabulary;
use crate::engine::selector::BestQuoteSelector;
use crate::exchanges::{Exchange, Listing};
use crate::types::{is_valid_price, CurrencyCode, RawTicker, SpreadError, TickerObservation};

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    Accepted,
    /// Symbol is not a pair this sink tracks.
    Unparsed,
    /// Price was zero, negative or non-finite.
    Discarded,
}

/// Destination for raw tickers coming off the wire.
pub trait TickerSink: Send + Sync {
    fn accept(&self, source_id: &str, ticker: &RawTicker) -> Intake;

    /// Whether a ticker with this raw symbol could ever be accepted. Lets
    /// the sweep skip requests for markets that would be thrown away.
    fn wants(&self, symbol: &str) -> bool;
}

/// Feeds normalized observations into the cycle's best-quote table.
pub struct SelectorSink {
    vocabulary: Arc<Vocabulary>,
    selector: Arc<BestQuoteSelector>,
}

impl SelectorSink {
    pub fn new(vocabulary: Arc<Vocabulary>, selector: Arc<BestQuoteSelector>) -> Self {
        Self {
            vocabulary,
            selector,
        }
    }
}

impl TickerSink for SelectorSink {
    fn accept(&self, source_id: &str, ticker: &RawTicker) -> Intake {
        let Some(pair) = self.vocabulary.parse_pair(&ticker.symbol) else {
            return Intake::Unparsed;
        };
        if !is_valid_price(ticker.price) {
            return Intake::Discarded;
        }
        self.selector.update(TickerObservation {
            pair,
            price: ticker.price,
            source_id: source_id.to_string(),
        });
        Intake::Accepted
    }

    fn wants(&self, symbol: &str) -> bool {
        self.vocabulary.parse_pair(symbol).is_some()
    }
}

/// Collects domestic fiat prices (symbols like "BTCIDR") per base asset.
pub struct DomesticSink {
    vocabulary: Arc<Vocabulary>,
    fiat: CurrencyCode,
    prices: DashMap<CurrencyCode, f64>,
}

impl DomesticSink {
    pub fn new(vocabulary: Arc<Vocabulary>, fiat: &str) -> Self {
        Self {
            vocabulary,
            fiat: CurrencyCode::new(fiat),
            prices: DashMap::new(),
        }
    }

    fn base_of(&self, symbol: &str) -> Option<CurrencyCode> {
        let symbol = symbol.trim().to_ascii_uppercase();
        let base = symbol.strip_suffix(self.fiat.as_str())?;
        if base.is_empty() || !self.vocabulary.contains(base) {
            return None;
        }
        let base = CurrencyCode::new(base);
        (base != *self.vocabulary.usd()).then_some(base)
    }

    pub fn into_reference(self) -> DomesticReference {
        self.prices.into_iter().collect()
    }
}

impl TickerSink for DomesticSink {
    fn accept(&self, _source_id: &str, ticker: &RawTicker) -> Intake {
        let Some(base) = self.base_of(&ticker.symbol) else {
            return Intake::Unparsed;
        };
        if !is_valid_price(ticker.price) {
            return Intake::Discarded;
        }
        self.prices.insert(base, ticker.price);
        Intake::Accepted
    }

    fn wants(&self, symbol: &str) -> bool {
        self.base_of(symbol).is_some()
    }
}

// ---------------------------------------------------------------------------
// Sweeps
// ---------------------------------------------------------------------------

/// An exchange and its in-flight request bound.
#[derive(Clone)]
pub struct ExchangeTask {
    pub exchange: Arc<dyn Exchange>,
    pub concurrency: usize,
}

impl ExchangeTask {
    pub fn new(exchange: Arc<dyn Exchange>, concurrency: usize) -> Self {
        Self {
            exchange,
            concurrency: concurrency.max(1),
        }
    }
}

/// What one exchange contributed to a cycle.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SweepReport {
    pub exchange: String,
    /// Markets (or snapshot tickers) returned by the listing call.
    pub listed: usize,
    pub accepted: usize,
    pub unparsed: usize,
    pub discarded: usize,
    /// Markets never requested because they could not normalize, plus
    /// markets the exchange answered with no quote.
    pub skipped: usize,
    pub failed: usize,
    pub listing_error: Option<String>,
}

impl SweepReport {
    fn new(exchange: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            ..Default::default()
        }
    }

    fn tally(&mut self, intake: Intake) {
        match intake {
            Intake::Accepted => self.accepted += 1,
            Intake::Unparsed => self.unparsed += 1,
            Intake::Discarded => self.discarded += 1,
        }
    }
}

/// Sweep one exchange into `sink`.
pub async fn sweep(exchange: &dyn Exchange, limit: usize, sink: &dyn TickerSink) -> SweepReport {
    let id = exchange.id();
    let mut report = SweepReport::new(id);

    let listing = match exchange.list().await {
        Ok(listing) => listing,
        Err(e) => {
            let message = format!("{e:#}");
            let err = SpreadError::Listing {
                exchange: id.to_string(),
                message: message.clone(),
            };
            warn!(error = %err, "Exchange skipped this cycle");
            report.listing_error = Some(message);
            return report;
        }
    };

    match listing {
        Listing::Snapshot(tickers) => {
            report.listed = tickers.len();
            for ticker in &tickers {
                report.tally(sink.accept(id, ticker));
            }
        }
        Listing::Markets(markets) => {
            report.listed = markets.len();
            let wanted: Vec<String> = markets
                .into_iter()
                .filter(|market| match exchange.market_symbol(market) {
                    Some(symbol) => sink.wants(&symbol),
                    None => true,
                })
                .collect();
            report.skipped = report.listed - wanted.len();
            debug!(exchange = id, listed = report.listed, requesting = wanted.len(), "Fetching tickers");

            let mut results = stream::iter(wanted)
                .map(|market| async move {
                    let result = exchange.ticker(&market).await;
                    (market, result)
                })
                .buffer_unordered(limit.max(1));

            while let Some((market, result)) = results.next().await {
                match result {
                    Ok(Some(ticker)) => report.tally(sink.accept(id, &ticker)),
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        let err = SpreadError::Ticker {
                            exchange: id.to_string(),
                            market,
                            message: format!("{e:#}"),
                        };
                        warn!(error = %err, "Market dropped");
                        report.failed += 1;
                    }
                }
            }
        }
    }

    info!(
        exchange = id,
        listed = report.listed,
        accepted = report.accepted,
        skipped = report.skipped,
        failed = report.failed,
        "Exchange sweep complete"
    );
    report
}

/// Sweep every task concurrently. Completes when all sweeps have.
pub async fn sweep_all(tasks: &[ExchangeTask], sink: &dyn TickerSink) -> Vec<SweepReport> {
    join_all(
        tasks
            .iter()
            .map(|task| sweep(task.exchange.as_ref(), task.concurrency, sink)),
    )
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
