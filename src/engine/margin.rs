//! Margin calculation.
//!
//! Compares the price a base asset fetches on the domestic fiat market with
//! what it costs abroad, converted through the FX rate:
//!
//! ```text
//! (base, USD):   margin = sell[base] / (best(base,USD) * fx) - 1
//! (base, quote): margin = sell[base] / (best(base,quote) * fx * best(quote,USD)) - 1
//! ```
//!
//! Any missing input, zero denominator or non-finite intermediate leaves
//! the margin undefined. Undefined margins are excluded from reporting,
//! persistence and alerting, so NaN and infinity never leave this module.

use std::collections::HashMap;
use tracing::debug;

use crate::types::{is_valid_price, BestQuote, CanonicalPair, CurrencyCode, PairMargin};

// ---------------------------------------------------------------------------
// Domestic reference
// ---------------------------------------------------------------------------

/// Domestic fiat sell price per base asset for one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomesticReference {
    sell: HashMap<CurrencyCode, f64>,
}

impl DomesticReference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sell price. Invalid prices are dropped.
    pub fn insert(&mut self, base: CurrencyCode, price: f64) -> bool {
        if !is_valid_price(price) {
            return false;
        }
        self.sell.insert(base, price);
        true
    }

    pub fn sell_price(&self, base: &CurrencyCode) -> Option<f64> {
        self.sell.get(base).copied()
    }

    pub fn len(&self) -> usize {
        self.sell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sell.is_empty()
    }
}

impl FromIterator<(CurrencyCode, f64)> for DomesticReference {
    fn from_iter<I: IntoIterator<Item = (CurrencyCode, f64)>>(iter: I) -> Self {
        let mut reference = Self::new();
        for (base, price) in iter {
            reference.insert(base, price);
        }
        reference
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Everything besides the best-quote table that a margin depends on.
/// Frozen before any exchange task runs.
#[derive(Debug, Clone)]
pub struct MarginInputs {
    usd: CurrencyCode,
    /// Domestic fiat units per USD. `None` when the feed failed.
    fx: Option<f64>,
    domestic: DomesticReference,
}

impl MarginInputs {
    pub fn new(usd: CurrencyCode, fx: Option<f64>, domestic: DomesticReference) -> Self {
        let fx = fx.filter(|rate| is_valid_price(*rate));
        Self { usd, fx, domestic }
    }

    pub fn fx(&self) -> Option<f64> {
        self.fx
    }

    pub fn usd(&self) -> &CurrencyCode {
        &self.usd
    }

    /// The pair whose best price is needed to chain `pair` back to USD,
    /// or `None` if `pair` is already USD-quoted.
    pub fn cross_pair(&self, pair: &CanonicalPair) -> Option<CanonicalPair> {
        if pair.is_quoted_in(&self.usd) {
            None
        } else {
            Some(CanonicalPair::new(pair.quote.clone(), self.usd.clone()))
        }
    }

    /// Margin for buying `pair` at `price` abroad and selling its base
    /// domestically. `cross_usd` is the best price of (quote, USD) and is
    /// ignored for USD-quoted pairs.
    pub fn margin_for(
        &self,
        pair: &CanonicalPair,
        price: f64,
        cross_usd: Option<f64>,
    ) -> Option<f64> {
        if pair.base == self.usd {
            return None;
        }
        let sell = self.domestic.sell_price(&pair.base)?;
        let fx = self.fx?;
        let cross = if pair.is_quoted_in(&self.usd) {
            1.0
        } else {
            cross_usd?
        };

        let denominator = price * fx * cross;
        if !denominator.is_finite() || denominator == 0.0 {
            return None;
        }

        let margin = sell / denominator - 1.0;
        margin.is_finite().then_some(margin)
    }
}

// ---------------------------------------------------------------------------
// Margin sheet
// ---------------------------------------------------------------------------

/// Margins for every pair in a cycle's final best-quote table, split the
/// way the report presents them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarginSheet {
    /// USD-quoted pairs, sorted by pair code.
    pub usd: Vec<PairMargin>,
    /// Crypto-to-crypto pairs, sorted by pair code.
    pub crypto: Vec<PairMargin>,
    /// Pairs with a best quote but no defined margin.
    pub undefined: Vec<CanonicalPair>,
}

impl MarginSheet {
    pub fn all(&self) -> impl Iterator<Item = &PairMargin> {
        self.usd.iter().chain(self.crypto.iter())
    }

    pub fn len(&self) -> usize {
        self.usd.len() + self.crypto.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Margins strictly above `threshold`, skipping excluded bases.
    pub fn above(&self, threshold: f64, excluded: &[CurrencyCode]) -> Vec<&PairMargin> {
        self.all()
            .filter(|m| m.margin > threshold)
            .filter(|m| !excluded.contains(&m.pair().base))
            .collect()
    }
}

/// Compute margins over a settled best-quote table.
pub fn compute_margins(quotes: &HashMap<CanonicalPair, BestQuote>, inputs: &MarginInputs) -> MarginSheet {
    let mut sheet = MarginSheet::default();

    for (pair, quote) in quotes {
        let cross = inputs
            .cross_pair(pair)
            .and_then(|cross| quotes.get(&cross))
            .map(|q| q.price);

        let domestic_sell = inputs.domestic.sell_price(&pair.base);

        match (inputs.margin_for(pair, quote.price, cross), domestic_sell) {
            (Some(margin), Some(domestic_sell)) => {
                let entry = PairMargin {
                    quote: quote.clone(),
                    domestic_sell,
                    margin,
                };
                if pair.is_quoted_in(&inputs.usd) {
                    sheet.usd.push(entry);
                } else {
                    sheet.crypto.push(entry);
                }
            }
            _ => {
                debug!(pair = %pair, "Margin undefined, excluded");
                sheet.undefined.push(pair.clone());
            }
        }
    }

    sheet.usd.sort_by(|a, b| a.pair().cmp(b.pair()));
    sheet.crypto.sort_by(|a, b| a.pair().cmp(b.pair()));
    sheet.undefined.sort();
    sheet
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
