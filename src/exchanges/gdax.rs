//! GDAX (Coinbase Exchange) public market data.
//!
//! API docs: https://docs.cdp.coinbase.com/exchange/reference
//! Products are listed once, then each product ticker is fetched on its
//! own. Product ids look like "BTC-USD".

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::http::{self, de_price};
use super::{Exchange, Listing};
use crate::types::RawTicker;

pub const EXCHANGE_ID: &str = "gdax";
const BASE_URL: &str = "https://api.exchange.coinbase.com";

#[derive(Debug, Deserialize)]
struct GdaxProduct {
    id: String,
    #[serde(default)]
    trading_disabled: bool,
}

#[derive(Debug, Deserialize)]
struct GdaxTicker {
    #[serde(deserialize_with = "de_price")]
    price: f64,
}

pub struct GdaxClient {
    http: Client,
    base_url: String,
}

impl GdaxClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(EXCHANGE_ID, timeout)?,
            base_url: BASE_URL.to_string(),
        })
    }

    fn parse_products(products: Vec<GdaxProduct>) -> Vec<String> {
        products
            .into_iter()
            .filter(|p| !p.trading_disabled)
            .map(|p| p.id)
            .collect()
    }
}

#[async_trait]
impl Exchange for GdaxClient {
    fn id(&self) -> &str {
        EXCHANGE_ID
    }

    async fn list(&self) -> Result<Listing> {
        let url = format!("{}/products", self.base_url);
        let products: Vec<GdaxProduct> = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Listing::Markets(Self::parse_products(products)))
    }

    async fn ticker(&self, market: &str) -> Result<Option<RawTicker>> {
        let url = format!("{}/products/{}/ticker", self.base_url, urlencoding::encode(market));
        let ticker: GdaxTicker = http::get_json(&self.http, EXCHANGE_ID, &url).await?;
        Ok(Some(RawTicker::new(http::strip_symbol(market), ticker.price)))
    }

    fn market_symbol(&self, market: &str) -> Option<String> {
        Some(http::strip_symbol(market))
    }
}
