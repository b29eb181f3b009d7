//! Indodax (formerly bitcoin.co.id), the domestic reference market.
//!
//! One market per tracked asset ("btc_idr") is derived from the
//! vocabulary. The price recorded is the best bid (`ticker.buy`): what the
//! domestic market pays for the asset right now, i.e. the price we could
//! sell at.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::{RawTicker, SpreadError};

pub const EXCHANGE_ID: &str = "indodax";
const BASE_URL: &str = "https://indodax.com/api";

#[derive(Debug, Deserialize)]
struct IndodaxEnvelope {
    ticker: Option<IndodaxTicker>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndodaxTicker {
    #[serde(deserialize_with = "de_price")]
    buy: f64,
}

pub struct IndodaxClient {
    http: Client,
    base_url: String,
    markets: Vec<String>,
}

impl IndodaxClient {
    pub fn new(assets: Vec<String>, fiat: &str, timeout: Duration) -> Result<Self> {
        let fiat = fiat.to_ascii_lowercase();
        let markets = assets
            .iter()
            .map(|a| format!("{}_{fiat}", a.to_ascii_lowercase()))
            .collect();
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
            markets,
        })
    }

    fn parse_ticker(market: &str, envelope: IndodaxEnvelope) -> Result<Option<RawTicker>> {
        if let Some(error) = envelope.error {
            return Err(SpreadError::Rejected {
                exchange: EXCHANGE_ID.into(),
                message: format!("ticker {market}: {error}"),
            }
            .into());
        }
        let ticker = envelope
            .ticker
            .with_context(|| format!("{EXCHANGE_ID} ticker {market} has no ticker object"))?;
        Ok(Some(RawTicker::new(http::strip_symbol(market), ticker.buy)))
    }
}

#[async_trait]
impl Exchange for IndodaxClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        Ok(Listing::Markets(self.markets.clone()))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        let url = format!("{}/{}/ticker", self.base_url, urlencoding::encode(market));
        let envelope = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Self::parse_ticker(market, envelope)
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        Some(http::strip_symbol(market))
    }
}
