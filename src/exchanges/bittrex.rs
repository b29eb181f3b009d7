//! Bittrex v1.1 public API.
//!
//! Market names are written quote first ("USD-BTC" is BTC priced in USD),
//! so the halves are swapped before the symbol reaches the normalizer.
//! The ask price is used.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::{RawTicker, SpreadError};

pub const EXCHANGE_ID: &str = "bittrex";
const BASE_URL: &str = "https://bittrex.com/api/v1.1/public";

#[derive(Debug, Deserialize)]
struct BittrexEnvelope<T> {
    success: bool,
    #[serde(default)]
    message: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BittrexMarket {
    market_name: String,
    #[serde(default = "active_default")]
    is_active: bool,
}

fn active_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BittrexTicker {
    #[serde(deserialize_with = "de_price")]
    ask: f64,
}

pub struct BittrexClient {
    http: Client,
    base_url: String,
}

impl BittrexClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    /// "USD-BTC" → "BTCUSD".
    fn base_first(market: &str) -> Option<String> {
        let (quote, base) = market.split_once('-')?;
        Some(http::strip_symbol(&format!("{base}{quote}")))
    }

    fn parse_markets(envelope: BittrexEnvelope<Vec<BittrexMarket>>) -> Result<Vec<String>> {
        if !envelope.success {
            return Err(SpreadError::Rejected {
                exchange: EXCHANGE_ID.into(),
                message: format!("getmarkets: {}", envelope.message),
            }
            .into());
        }
        Ok(envelope
            .result
            .context("Bittrex getmarkets response has no result")?
            .into_iter()
            .filter(|m| m.is_active)
            .map(|m| m.market_name)
            .collect())
    }

    fn parse_ticker(market: &str, envelope: BittrexEnvelope<BittrexTicker>) -> Result<Option<RawTicker>> {
        if !envelope.success {
            return Err(SpreadError::Rejected {
                exchange: EXCHANGE_ID.into(),
                message: format!("getticker {market}: {}", envelope.message),
            }
            .into());
        }
        let (Some(ticker), Some(symbol)) = (envelope.result, Self::base_first(market)) else {
            return Ok(None);
        };
        Ok(Some(RawTicker::new(symbol, ticker.ask)))
    }
}

#[async_trait]
impl Exchange for BittrexClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        let url = format!("{}/getmarkets", self.base_url);
        let envelope = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Listing::Markets(Self::parse_markets(envelope)?))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        let url = format!(
            "{}/getticker?market={}",
            self.base_url,
            urlencoding::encode(market)
        );
        let envelope = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Self::parse_ticker(market, envelope)
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        Self::base_first(market)
    }
}
