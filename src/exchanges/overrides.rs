//! Manual price overrides.
//!
//! Some markets have APIs that are known to return garbage or nothing at
//! all. A deployment can pin their price in configuration; this wrapper
//! answers those markets from the pinned price without calling the
//! exchange, and patches them into snapshot listings.
//!
//! Markets are matched on their stripped, upper-cased form, so "xlm_idr"
//! and "XLMIDR" name the same market.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::http::strip_symbol;
use super::{Exchange, Listing};
use crate::types::RawTicker;

pub struct WithOverrides {
    inner: Arc<dyn Exchange>,
    /// Stripped market → (configured market id, price).
    prices: BTreeMap<String, (String, f64)>,
}

impl WithOverrides {
    pub fn new(inner: Arc<dyn Exchange>, overrides: Vec<(String, f64)>) -> Self {
        let prices = overrides
            .into_iter()
            .map(|(market, price)| (strip_symbol(&market), (market, price)))
            .collect();
        Self { inner, prices }
    }

    fn pinned(&self, market: &str) -> Option<f64> {
        self.prices.get(&strip_symbol(market)).map(|(_, price)| *price)
    }

    fn symbol_for(&self, market: &str) -> String {
        self.inner
            .market_symbol(market)
            .unwrap_or_else(|| strip_symbol(market))
    }
}

#[async_trait]
impl Exchange for WithOverrides {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn list(&self) -> Result<Listing> {
        match self.inner.list().await? {
            Listing::Snapshot(mut tickers) => {
                for ticker in tickers.iter_mut() {
                    if let Some(price) = self.pinned(&ticker.symbol) {
                        ticker.price = price;
                    }
                }
                for (key, (market, price)) in &self.prices {
                    if !tickers.iter().any(|t| strip_symbol(&t.symbol) == *key) {
                        tickers.push(RawTicker::new(self.symbol_for(market), *price));
                    }
                }
                Ok(Listing::Snapshot(tickers))
            }
            Listing::Markets(mut markets) => {
                for (key, (market, _)) in &self.prices {
                    if !markets.iter().any(|m| strip_symbol(m) == *key) {
                        markets.push(market.clone());
                    }
                }
                Ok(Listing::Markets(markets))
            }
        }
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        if let Some(price) = self.pinned(market) {
            debug!(exchange = self.id(), market, price, "Using manual override price");
            return Ok(Some(RawTicker::new(self.symbol_for(market), price)));
        }
        self.inner.ticker(market).await
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        self.inner.market_symbol(market)
    }
}
