//! Binance spot prices.
//!
//! API docs: https://binance-docs.github.io/apidocs/spot/en/
//! `/api/v3/ticker/price` returns the last price of every symbol in one
//! response, so this adapter never needs a second phase. Rows are decoded
//! one by one: a malformed row loses only that market.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::RawTicker;

pub const EXCHANGE_ID: &str = "binance";
const BASE_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
struct BinancePrice {
    symbol: String,
    #[serde(deserialize_with = "de_price")]
    price: f64,
}

pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    fn parse_prices(rows: Vec<Value>) -> Vec<RawTicker> {
        let total = rows.len();
        let tickers: Vec<RawTicker> = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<BinancePrice>(row).ok())
            .map(|p| RawTicker::new(http::strip_symbol(&p.symbol), p.price))
            .collect();
        if tickers.len() < total {
            debug!(dropped = total - tickers.len(), "Binance rows without a usable price");
        }
        tickers
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let rows: Vec<Value> = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Listing::Snapshot(Self::parse_prices(rows)))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        anyhow::bail!("{EXCHANGE_ID} has no per-market ticker phase (asked for {market})")
    }
}
