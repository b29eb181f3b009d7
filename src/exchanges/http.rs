//! Shared HTTP plumbing for the exchange adapters.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "SPREADWATCH/0.1.0 (quote-aggregator)";

/// Build an HTTP client with a per-request timeout.
pub fn client(exchange: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .with_context(|| format!("Failed to build HTTP client for {exchange}"))
}

/// GET `url` and decode the JSON body, failing on non-2xx status.
pub async fn get_json<T: DeserializeOwned>(http: &Client, exchange: &str, url: &str) -> Result<T> {
    debug!(exchange, url = %url, "GET");

    let resp = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("{exchange} request failed: {url}"))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{exchange} API error {status}: {body}");
    }

    resp.json()
        .await
        .with_context(|| format!("Failed to parse {exchange} response from {url}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

/// Exchanges disagree on whether prices are JSON numbers or strings.
pub fn de_price<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Strip everything but ASCII alphanumerics and upper-case the rest.
pub fn strip_symbol(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Px {
        #[serde(deserialize_with = "de_price")]
        price: f64,
    }

    #[test]
    fn test_de_price_number_and_string() {
        let a: Px = serde_json::from_str(r#"{"price": 12.5}"#).unwrap();
        let b: Px = serde_json::from_str(r#"{"price": "12.5"}"#).unwrap();
        assert_eq!(a.price, 12.5);
        assert_eq!(b.price, 12.5);
    }

    #[test]
    fn test_de_price_rejects_garbage() {
        assert!(serde_json::from_str::<Px>(r#"{"price": "n/a"}"#).is_err());
        assert!(serde_json::from_str::<Px>(r#"{"price": null}"#).is_err());
    }

    #[test]
    fn test_strip_symbol() {
        assert_eq!(strip_symbol("btc-usd"), "BTCUSD");
        assert_eq!(strip_symbol("ETH/BTC"), "ETHBTC");
        assert_eq!(strip_symbol("xlm_idr"), "XLMIDR");
    }
}
