//! Shared types for the SPREADWATCH engine.
//!
//! These types form the data model used across all modules. Exchange
//! adapters, the aggregation engine and the storage layer all depend on
//! them, never on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Currency codes and pairs
// ---------------------------------------------------------------------------

/// Short upper-case currency identifier ("BTC", "USD").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (base, quote) tuple identifying an instrument independently of how
/// any exchange spells it.
///
/// Only the normalizer builds pairs from raw symbols, so both codes are
/// always members of the configured vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalPair {
    pub base: CurrencyCode,
    pub quote: CurrencyCode,
}

impl CanonicalPair {
    pub(crate) fn new(base: CurrencyCode, quote: CurrencyCode) -> Self {
        Self { base, quote }
    }

    /// Concatenated form ("BTCUSD"), used as the persistence key.
    pub fn code(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    pub fn is_quoted_in(&self, code: &CurrencyCode) -> bool {
        &self.quote == code
    }
}

impl fmt::Display for CanonicalPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

// ---------------------------------------------------------------------------
// Observations and quotes
// ---------------------------------------------------------------------------

/// A raw ticker as an exchange adapter reports it: the symbol has had
/// exchange-specific punctuation stripped but is not yet normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTicker {
    pub symbol: String,
    pub price: f64,
}

impl RawTicker {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
        }
    }
}

/// One normalized price observation from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerObservation {
    pub pair: CanonicalPair,
    pub price: f64,
    pub source_id: String,
}

/// The winning observation for a pair in the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestQuote {
    pub pair: CanonicalPair,
    pub price: f64,
    pub source_id: String,
    /// Margin the extreme-margin policy ranked this quote by. Always `None`
    /// under the lowest-price policy.
    pub margin: Option<f64>,
}

impl fmt::Display for BestQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} ({})", self.pair, self.price, self.source_id)
    }
}

/// Whether a price may take part in selection at all.
pub fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

// ---------------------------------------------------------------------------
// Selection policy
// ---------------------------------------------------------------------------

/// Rule the selector uses to decide whether a new observation replaces
/// the current best quote for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Cheapest ask wins.
    #[default]
    LowestPrice,
    /// Largest absolute margin against the domestic market wins.
    ExtremeMargin,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::LowestPrice => write!(f, "lowest-price"),
            SelectionPolicy::ExtremeMargin => write!(f, "extreme-margin"),
        }
    }
}

// ---------------------------------------------------------------------------
// Margins
// ---------------------------------------------------------------------------

/// Computed margin for one pair, as handed to the report and the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairMargin {
    pub quote: BestQuote,
    /// Domestic fiat sell price of the pair's base.
    pub domestic_sell: f64,
    pub margin: f64,
}

impl PairMargin {
    pub fn pair(&self) -> &CanonicalPair {
        &self.quote.pair
    }

    pub fn margin_pct(&self) -> f64 {
        self.margin * 100.0
    }
}

/// Write-only record handed to the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginRecord {
    pub code: String,
    pub timestamp: DateTime<Utc>,
    pub margin: f64,
}

impl MarginRecord {
    pub fn from_margin(margin: &PairMargin, timestamp: DateTime<Utc>) -> Self {
        Self {
            code: margin.pair().code(),
            timestamp,
            margin: margin.margin,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SPREADWATCH.
#[derive(Debug, thiserror::Error)]
pub enum SpreadError {
    #[error("Listing failed ({exchange}): {message}")]
    Listing { exchange: String, message: String },

    #[error("Ticker failed ({exchange}/{market}): {message}")]
    Ticker {
        exchange: String,
        market: String,
        message: String,
    },

    #[error("Rejected response ({exchange}): {message}")]
    Rejected { exchange: String, message: String },

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
