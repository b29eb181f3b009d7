//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the Mailgun API key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::exchanges::{DOMESTIC_SOURCES, GLOBAL_SOURCES};
use crate::types::{SelectionPolicy, SpreadError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub vocabulary: VocabularyConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub selection: SelectionConfig,
    pub margins: MarginsConfig,
    pub fx: FxConfig,
    pub domestic: DomesticConfig,
    #[serde(default)]
    pub overrides: Vec<OverrideConfig>,
    pub alerts: AlertsConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Delay between the end of one cycle and the start of the next.
    pub cycle_delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VocabularyConfig {
    /// Asset codes tracked on every exchange, in display order.
    pub codes: Vec<String>,
    #[serde(default = "default_usd")]
    pub usd: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Default bound on concurrent ticker requests per exchange.
    #[serde(default = "default_concurrency")]
    pub concurrency_per_exchange: usize,
    /// Per-request transport timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency_per_exchange: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides `fetch.concurrency_per_exchange` for this exchange.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SelectionConfig {
    #[serde(default)]
    pub policy: SelectionPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarginsConfig {
    /// Alert threshold as a fraction (0.10 = 10%).
    pub threshold: f64,
}

/// Either a fixed rate or a feed id, never both.
#[derive(Debug, Deserialize, Clone)]
pub struct FxConfig {
    /// Domestic fiat units per USD.
    #[serde(default)]
    pub fixed: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DomesticConfig {
    pub source: String,
    pub fiat: String,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

/// A hand-maintained price for a market whose API is known to be broken.
#[derive(Debug, Deserialize, Clone)]
pub struct OverrideConfig {
    pub exchange: String,
    pub market: String,
    pub price: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub cooldown_secs: u64,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Bases that are reported but never alerted on.
    #[serde(default)]
    pub excluded_bases: Vec<String>,
    #[serde(default)]
    pub mailgun: Option<MailgunConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailgunConfig {
    pub domain: String,
    pub from: String,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

fn default_usd() -> String {
    "USD".to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_subject() -> String {
    "Arbitrage margin alert".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> std::result::Result<(), SpreadError> {
        if self.vocabulary.codes.iter().all(|c| c.trim().is_empty()) {
            return Err(SpreadError::Config("vocabulary.codes is empty".into()));
        }
        if !self.margins.threshold.is_finite() {
            return Err(SpreadError::Config("margins.threshold must be finite".into()));
        }
        if self.fetch.concurrency_per_exchange == 0
            || self.exchanges.iter().any(|e| e.concurrency == Some(0))
            || self.domestic.concurrency == Some(0)
        {
            return Err(SpreadError::Config("concurrency limits must be at least 1".into()));
        }
        match (self.fx.fixed, self.fx.source.as_deref()) {
            (Some(rate), None) if rate.is_finite() && rate > 0.0 => {}
            (Some(_), None) => {
                return Err(SpreadError::Config("fx.fixed must be a positive number".into()))
            }
            (None, Some(_)) => {}
            _ => {
                return Err(SpreadError::Config(
                    "exactly one of fx.fixed and fx.source must be set".into(),
                ))
            }
        }
        if !DOMESTIC_SOURCES.contains(&self.domestic.source.as_str()) {
            return Err(SpreadError::UnknownExchange(self.domestic.source.clone()));
        }
        if let Some(unknown) = self
            .exchanges
            .iter()
            .find(|e| !GLOBAL_SOURCES.contains(&e.id.as_str()))
        {
            return Err(SpreadError::UnknownExchange(unknown.id.clone()));
        }
        if let Some(bad) = self.overrides.iter().find(|o| !(o.price.is_finite() && o.price > 0.0)) {
            return Err(SpreadError::Config(format!(
                "override price for {}/{} must be positive",
                bad.exchange, bad.market
            )));
        }
        Ok(())
    }

    /// Ids of enabled global exchanges, in configuration order.
    pub fn enabled_exchanges(&self) -> impl Iterator<Item = &ExchangeConfig> {
        self.exchanges.iter().filter(|e| e.enabled)
    }

    pub fn concurrency_for(&self, exchange: &ExchangeConfig) -> usize {
        exchange
            .concurrency
            .unwrap_or(self.fetch.concurrency_per_exchange)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.agent.cycle_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alerts.cooldown_secs as i64)
    }

    /// Overrides configured for one exchange.
    pub fn overrides_for<'a>(&'a self, exchange: &'a str) -> impl Iterator<Item = &'a OverrideConfig> + 'a {
        self.overrides.iter().filter(move |o| o.exchange == exchange)
    }
}
