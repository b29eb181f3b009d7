//! Exchange integrations.
//!
//! Defines the `Exchange` trait and provides thin HTTP/JSON adapters for:
//! - Binance, Bitfinex: snapshot endpoints (one request lists every price)
//! - GDAX, Kraken, Bittrex, Gemini, Coinbase: list markets, then one
//!   ticker request per market
//! - Indodax (bitcoin.co.id): domestic fiat reference market
//!
//! Adapters only translate transport and payload shape. They strip
//! exchange-specific punctuation from symbols but never decide which
//! pairs are meaningful; that is the normalizer's job.

pub mod binance;
pub mod bitfinex;
pub mod bittrex;
pub mod coinbase;
pub mod gdax;
pub mod gemini;
pub mod http;
pub mod indodax;
pub mod kraken;
pub mod overrides;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OverrideConfig;
use crate::engine::normalizer::Vocabulary;
use crate::types::{RawTicker, SpreadError};

use overrides::WithOverrides;

/// Exchange ids accepted in `[[exchanges]]`.
pub const GLOBAL_SOURCES: &[&str] = &[
    binance::EXCHANGE_ID,
    bitfinex::EXCHANGE_ID,
    bittrex::EXCHANGE_ID,
    coinbase::EXCHANGE_ID,
    gdax::EXCHANGE_ID,
    gemini::EXCHANGE_ID,
    kraken::EXCHANGE_ID,
];

/// Exchange ids accepted as `domestic.source`.
pub const DOMESTIC_SOURCES: &[&str] = &[indodax::EXCHANGE_ID];

/// Result of the first, top-level call against an exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Listing {
    /// The listing call already carried every price.
    Snapshot(Vec<RawTicker>),
    /// Market ids that each need their own ticker request.
    Markets(Vec<String>),
}

/// Abstraction over a price source.
///
/// A failing `list` means the exchange contributes nothing this cycle.
/// A failing `ticker` only loses that one market.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Stable identifier used in logs, reports and overrides.
    fn id(&self) -> &str;

    /// List tradable markets (or return a full price snapshot).
    async fn list(&self) -> Result<Listing>;

    /// Fetch the ticker for one market id from `list`. `Ok(None)` means
    /// the exchange answered but has no usable quote for that market.
    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>>;

    /// The raw symbol a market id will produce, when it can be derived
    /// without a request. Lets the orchestrator skip markets that could
    /// never normalize.
    fn market_symbol(&self, _market: &str) -> Option<String> {
        None
    }
}

/// Build a global exchange adapter by id.
pub fn build(id: &str, vocabulary: &Vocabulary, timeout: Duration) -> Result<Arc<dyn Exchange>> {
    let exchange: Arc<dyn Exchange> = match id {
        binance::EXCHANGE_ID => Arc::new(binance::BinanceClient::new(timeout)?),
        bitfinex::EXCHANGE_ID => Arc::new(bitfinex::BitfinexClient::new(timeout)?),
        bittrex::EXCHANGE_ID => Arc::new(bittrex::BittrexClient::new(timeout)?),
        coinbase::EXCHANGE_ID => Arc::new(coinbase::CoinbaseClient::new(
            vocabulary.assets().map(|c| c.to_string()).collect(),
            vocabulary.usd().as_str(),
            timeout,
        )?),
        gdax::EXCHANGE_ID => Arc::new(gdax::GdaxClient::new(timeout)?),
        gemini::EXCHANGE_ID => Arc::new(gemini::GeminiClient::new(timeout)?),
        kraken::EXCHANGE_ID => Arc::new(kraken::KrakenClient::new(timeout)?),
        other => return Err(SpreadError::UnknownExchange(other.to_string()).into()),
    };
    Ok(exchange)
}

/// Build the domestic reference adapter by id.
pub fn build_domestic(
    id: &str,
    vocabulary: &Vocabulary,
    fiat: &str,
    timeout: Duration,
) -> Result<Arc<dyn Exchange>> {
    match id {
        indodax::EXCHANGE_ID => Ok(Arc::new(indodax::IndodaxClient::new(
            vocabulary.assets().map(|c| c.to_string()).collect(),
            fiat,
            timeout,
        )?)),
        other => Err(SpreadError::UnknownExchange(other.to_string()).into()),
    }
}

/// Wrap `exchange` with its manual price overrides, if any are configured.
pub fn with_overrides<'a>(
    exchange: Arc<dyn Exchange>,
    overrides: impl Iterator<Item = &'a OverrideConfig>,
) -> Arc<dyn Exchange> {
    let prices: Vec<(String, f64)> = overrides.map(|o| (o.market.clone(), o.price)).collect();
    if prices.is_empty() {
        exchange
    } else {
        Arc::new(WithOverrides::new(exchange, prices))
    }
}
