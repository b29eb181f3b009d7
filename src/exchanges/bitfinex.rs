//! Bitfinex public API.
//!
//! Symbols come from the v1 API; prices for all of them are then fetched
//! in one batched v2 `/tickers` call. Both calls belong to the listing
//! phase, so a failure of either empties this exchange for the cycle.
//!
//! v2 trading tickers are arrays:
//! `[SYMBOL, BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, ...]`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::http;
use super::{Exchange, Listing};
use crate::types::RawTicker;

pub const EXCHANGE_ID: &str = "bitfinex";
const BASE_URL: &str = "https://api.bitfinex.com";

/// Index of the ask price in a v2 trading ticker.
const ASK_INDEX: usize = 3;

pub struct BitfinexClient {
    http: Client,
    base_url: String,
}

impl BitfinexClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    fn tickers_param(symbols: &[String]) -> String {
        symbols
            .iter()
            .map(|s| format!("t{}", s.to_ascii_uppercase()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Rows that are not trading tickers or carry no numeric ask are skipped.
    fn parse_tickers(rows: Vec<Vec<Value>>) -> Vec<RawTicker> {
        rows.into_iter()
            .filter_map(|row| {
                let symbol = row.first()?.as_str()?.strip_prefix('t')?;
                let ask = row.get(ASK_INDEX)?.as_f64()?;
                Some(RawTicker::new(http::strip_symbol(symbol), ask))
            })
            .collect()
    }
}

#[async_trait]
impl Exchange for BitfinexClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        let url = format!("{}/v1/symbols", self.base_url);
        let symbols: Vec<String> = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        if symbols.is_empty() {
            return Ok(Listing::Snapshot(Vec::new()));
        }

        let url = format!(
            "{}/v2/tickers?symbols={}",
            self.base_url,
            Self::tickers_param(&symbols)
        );
        let rows: Vec<Vec<Value>> = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        let tickers = Self::parse_tickers(rows);
        debug!(symbols = symbols.len(), tickers = tickers.len(), "Bitfinex snapshot");
        Ok(Listing::Snapshot(tickers))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        anyhow::bail!("{EXCHANGE_ID} has no per-market ticker phase (asked for {market})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tickers_param() {
        let symbols = vec!["btcusd".to_string(), "ethbtc".to_string()];
        assert_eq!(BitfinexClient::tickers_param(&symbols), "tBTCUSD,tETHBTC");
    }

    #[test]
    fn test_parse_tickers() {
        let json = r#"[
            ["tBTCUSD", 9000.5, 10.1, 9001.0, 12.3, 5.0, 0.001, 9000.9, 1000.0, 9100.0, 8900.0],
            ["tETHBTC", 0.0499, 3.0, 0.05, 4.0, 0.0, 0.0, 0.05, 10.0, 0.051, 0.049],
            ["fUSD", 0.0001, 30, 2, 0.0002],
            ["tBROKEN", 1.0, 2.0, null]
        ]"#;
        let rows: Vec<Vec<Value>> = serde_json::from_str(json).unwrap();
        let tickers = BitfinexClient::parse_tickers(rows);
        assert_eq!(
            tickers,
            vec![RawTicker::new("BTCUSD", 9001.0), RawTicker::new("ETHBTC", 0.05)]
        );
    }
}
