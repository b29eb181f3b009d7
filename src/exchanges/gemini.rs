//! Gemini public API.
//!
//! API docs: https://docs.gemini.com/rest-api/
//! `/v1/symbols` lists lower-case symbols ("btcusd"); each ticker is then
//! fetched from `/v1/pubticker/{symbol}`. The ask price is used.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::RawTicker;

pub const EXCHANGE_ID: &str = "gemini";
const BASE_URL: &str = "https://api.gemini.com";

#[derive(Debug, Deserialize)]
struct GeminiTicker {
    #[serde(deserialize_with = "de_price")]
    ask: f64,
}

pub struct GeminiClient {
    http: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl Exchange for GeminiClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        let url = format!("{}/v1/symbols", self.base_url);
        let symbols: Vec<String> = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Listing::Markets(symbols))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        let url = format!("{}/v1/pubticker/{}", self.base_url, urlencoding::encode(market));
        let ticker: GeminiTicker = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Some(RawTicker::new(http::strip_symbol(market), ticker.ask)))
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        Some(http::strip_symbol(market))
    }
}
