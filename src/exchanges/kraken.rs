//! Kraken public market data.
//!
//! API docs: https://docs.kraken.com/rest/
//! Asset pairs are listed once; each pair's ticker is then requested by
//! its altname ("XBTUSD"). Kraken spells bitcoin "XBT" and dogecoin "XDG",
//! which are mapped back to the common codes here. The ask price is used.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::{RawTicker, SpreadError};

pub const EXCHANGE_ID: &str = "kraken";
const BASE_URL: &str = "https://api.kraken.com";

/// Kraken-specific asset spellings.
const ASSET_ALIASES: &[(&str, &str)] = &[("XBT", "BTC"), ("XDG", "DOGE")];

#[derive(Debug, Deserialize)]
struct KrakenEnvelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KrakenAssetPair {
    altname: String,
}

#[derive(Debug, Deserialize)]
struct KrakenTicker {
    /// Ask: [price, whole lot volume, lot volume].
    a: (PriceField, serde_json::Value, serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct PriceField(#[serde(deserialize_with = "de_price")] f64);

pub struct KrakenClient {
    http: Client,
    base_url: String,
}

impl KrakenClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Rewrite Kraken asset spellings inside a stripped altname.
    fn canonical_symbol(altname: &str) -> String {
        let mut symbol = http::strip_symbol(altname);
        for (kraken, common) in ASSET_ALIASES {
            symbol = symbol.replace(kraken, common);
        }
        symbol
    }

    fn parse_pairs(envelope: KrakenEnvelope<HashMap<String, KrakenAssetPair>>) -> Result<Vec<String>> {
        if !envelope.error.is_empty() {
            return Err(SpreadError::Rejected {
                exchange: EXCHANGE_ID.into(),
                message: format!("AssetPairs: {}", envelope.error.join(", ")),
            }
            .into());
        }
        let mut altnames: Vec<String> = envelope
            .result
            .context("Kraken AssetPairs response has no result")?
            .into_values()
            // Dark-pool pairs duplicate the regular book.
            .filter(|p| !p.altname.ends_with(".d"))
            .map(|p| p.altname)
            .collect();
        altnames.sort();
        Ok(altnames)
    }

    fn parse_ticker(
        market: &str,
        envelope: KrakenEnvelope<HashMap<String, KrakenTicker>>,
    ) -> Option<RawTicker> {
        if !envelope.error.is_empty() {
            debug!(market, errors = ?envelope.error, "Kraken ticker error, skipping market");
            return None;
        }
        let ticker = envelope.result?.into_values().next()?;
        Some(RawTicker::new(Self::canonical_symbol(market), ticker.a.0 .0))
    }
}

#[async_trait]
impl Exchange for KrakenClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        let url = format!("{}/0/public/AssetPairs", self.base_url);
        let envelope = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Listing::Markets(Self::parse_pairs(envelope)?))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        let url = format!(
            "{}/0/public/Ticker?pair={}",
            self.base_url,
            urlencoding::encode(market)
        );
        let envelope = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Self::parse_ticker(market, envelope))
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        Some(Self::canonical_symbol(market))
    }
}
