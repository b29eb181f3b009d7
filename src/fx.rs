//! Domestic fiat → USD exchange rate.
//!
//! The rate is expressed as domestic fiat units per USD (e.g. 13380 IDR).
//! It is either pinned in configuration or fetched once per cycle, before
//! any margin is computed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::FxConfig;
use crate::exchanges::http;
use crate::types::{is_valid_price, SpreadError};

pub const OPEN_ER_API_ID: &str = "open-er-api";
const OPEN_ER_API_URL: &str = "https://open.er-api.com/v6/latest/USD";

#[async_trait]
pub trait FxSource: Send + Sync {
    /// Domestic fiat units per USD.
    async fn rate(&self) -> Result<f64>;

    fn name(&self) -> &str;
}

/// A rate pinned in configuration.
pub struct FixedFx(pub f64);

#[async_trait]
impl FxSource for FixedFx {
    async fn rate(&self) -> Result<f64> {
        Ok(self.0)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[derive(Debug, Deserialize)]
struct OpenErApiResponse {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// open.er-api.com: keyless USD-based daily rates.
pub struct OpenErApi {
    http: Client,
    fiat: String,
}

impl OpenErApi {
    pub fn new(fiat: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(OPEN_ER_API_ID, timeout)?,
            fiat: fiat.to_ascii_uppercase(),
        })
    }

    fn parse_rate(&self, resp: OpenErApiResponse) -> Result<f64> {
        if resp.result != "success" {
            anyhow::bail!("{OPEN_ER_API_ID} returned result={}", resp.result);
        }
        let rate = *resp
            .rates
            .get(&self.fiat)
            .with_context(|| format!("{OPEN_ER_API_ID} has no rate for {}", self.fiat))?;
        if !is_valid_price(rate) {
            anyhow::bail!("{OPEN_ER_API_ID} rate for {} is not positive: {rate}", self.fiat);
        }
        Ok(rate)
    }
}

#[async_trait]
impl FxSource for OpenErApi {
    async fn rate(&self) -> Result<f64> {
        let resp = http::get_json(&self.http, OPEN_ER_API_ID, OPEN_ER_API_URL).await?;
        self.parse_rate(resp)
    }

    fn name(&self) -> &str {
        OPEN_ER_API_ID
    }
}

/// Build the configured FX source. Validation has already guaranteed that
/// exactly one of `fixed` / `source` is set.
pub fn build(cfg: &FxConfig, fiat: &str, timeout: Duration) -> Result<Box<dyn FxSource>> {
    match (cfg.fixed, cfg.source.as_deref()) {
        (Some(rate), _) => Ok(Box::new(FixedFx(rate))),
        (None, Some(OPEN_ER_API_ID)) => Ok(Box::new(OpenErApi::new(fiat, timeout)?)),
        (None, Some(other)) => Err(SpreadError::Config(format!("unknown fx.source: {other}")).into()),
        (None, None) => Err(SpreadError::Config("fx section is empty".into()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> OpenErApi {
        OpenErApi::new("idr", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fixed_rate() {
        let fx = FixedFx(13380.0);
        assert_eq!(fx.rate().await.unwrap(), 13380.0);
        assert_eq!(fx.name(), "fixed");
    }

    #[test]
    fn test_parse_rate() {
        let json = r#"{"result": "success", "base_code": "USD", "rates": {"USD": 1, "IDR": 15612.5}}"#;
        let resp: OpenErApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(feed().parse_rate(resp).unwrap(), 15612.5);
    }

    #[test]
    fn test_parse_rate_missing_currency() {
        let json = r#"{"result": "success", "rates": {"USD": 1}}"#;
        let resp: OpenErApiResponse = serde_json::from_str(json).unwrap();
        assert!(feed().parse_rate(resp).is_err());
    }

    #[test]
    fn test_parse_rate_error_result() {
        let json = r#"{"result": "error", "error-type": "unsupported-code"}"#;
        let resp: OpenErApiResponse = serde_json::from_str(json).unwrap();
        assert!(feed().parse_rate(resp).is_err());
    }

    #[test]
    fn test_build() {
        let fixed = FxConfig { fixed: Some(1.0), source: None };
        assert_eq!(build(&fixed, "IDR", Duration::from_secs(5)).unwrap().name(), "fixed");

        let feed = FxConfig { fixed: None, source: Some(OPEN_ER_API_ID.into()) };
        assert_eq!(build(&feed, "IDR", Duration::from_secs(5)).unwrap().name(), OPEN_ER_API_ID);

        let bad = FxConfig { fixed: None, source: Some("ecb".into()) };
        assert!(build(&bad, "IDR", Duration::from_secs(5)).is_err());
    }
}
