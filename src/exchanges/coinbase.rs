//! Coinbase consumer buy prices.
//!
//! There is no listing endpoint worth calling: one market per tracked asset
//! ("BTC-USD") is derived from the vocabulary and priced through
//! `/v2/prices/{market}/buy`. Unsupported assets come back with an
//! `errors` payload and are skipped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::RawTicker;

pub const EXCHANGE_ID: &str = "coinbase";
const BASE_URL: &str = "https://api.coinbase.com";

#[derive(Debug, Deserialize)]
struct CoinbaseEnvelope {
    data: Option<CoinbasePrice>,
    #[serde(default)]
    errors: Option<Vec<CoinbaseError>>,
}

#[derive(Debug, Deserialize)]
struct CoinbasePrice {
    base: String,
    currency: String,
    #[serde(deserialize_with = "de_price")]
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct CoinbaseError {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: String,
}

pub struct CoinbaseClient {
    http: Client,
    base_url: String,
    markets: Vec<String>,
}

impl CoinbaseClient {
    pub fn new(assets: Vec<String>, usd: &str, timeout: Duration) -> Result<Self> {
        let markets = assets.iter().map(|a| format!("{a}-{usd}")).collect();
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
            markets,
        })
    }

    fn parse_price(market: &str, envelope: CoinbaseEnvelope) -> Option<RawTicker> {
        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let reasons: Vec<String> = errors.iter().map(|e| format!("{}: {}", e.id, e.message)).collect();
            debug!(market, errors = ?reasons, "Coinbase has no price, skipping market");
            return None;
        }
        let price = envelope.data?;
        Some(RawTicker::new(
            http::strip_symbol(&format!("{}{}", price.base, price.currency)),
            price.amount,
        ))
    }

    /// Unsupported assets answer 4xx with an `errors` body: a skip, not a
    /// failure. Server errors still fail the market.
    fn read_response(market: &str, status: StatusCode, body: &str) -> Result<Option<RawTicker>> {
        if status.is_server_error() {
            anyhow::bail!("{EXCHANGE_ID} API error {status}: {body}");
        }
        let envelope: CoinbaseEnvelope = serde_json::from_str(body)
            .with_context(|| format!("Failed to parse {EXCHANGE_ID} price for {market} ({status})"))?;
        Ok(Self::parse_price(market, envelope))
    }
}

#[async_trait]
impl Exchange for CoinbaseClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        Ok(Listing::Markets(self.markets.clone()))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        let url = format!("{}/v2/prices/{}/buy", self.base_url, urlencoding::encode(market));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("{EXCHANGE_ID} request failed: {url}"))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .with_context(|| format!("{EXCHANGE_ID} response body unreadable for {market}"))?;
        Self::read_response(market, status, &body)
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        Some(http::strip_symbol(market))
    }
}
