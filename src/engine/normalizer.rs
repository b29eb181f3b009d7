//! Symbol normalization.
//!
//! Splits an exchange-native symbol ("ETHBTC", "BTCUSD") into a canonical
//! (base, quote) pair against the configured currency vocabulary.
//!
//! When one code is a prefix of another ("ETC" vs "ETCX"), more than one
//! split can be valid. Candidates are tried longest code first, ties in
//! lexicographic order, so the result never depends on configuration
//! order or hash iteration order.

use std::collections::HashSet;

use crate::types::{CanonicalPair, CurrencyCode};

/// Fixed set of currency codes the engine understands.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Configuration order, kept for display and per-code fan-out.
    ordered: Vec<CurrencyCode>,
    /// Longest first, then lexicographic. Drives prefix matching.
    by_length: Vec<CurrencyCode>,
    members: HashSet<CurrencyCode>,
    usd: CurrencyCode,
}

impl Vocabulary {
    /// Build a vocabulary from configured codes. The USD code is always a
    /// member even if the list omits it.
    pub fn new<S: AsRef<str>>(codes: &[S], usd: &str) -> Self {
        let usd = CurrencyCode::new(usd);
        let mut ordered: Vec<CurrencyCode> = Vec::new();
        for code in codes.iter().map(|c| CurrencyCode::new(c.as_ref())) {
            if !code.is_empty() && !ordered.contains(&code) {
                ordered.push(code);
            }
        }
        if !ordered.contains(&usd) {
            ordered.push(usd.clone());
        }

        let mut by_length = ordered.clone();
        by_length.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let members = ordered.iter().cloned().collect();

        Self {
            ordered,
            by_length,
            members,
            usd,
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.members.contains(&CurrencyCode::new(code))
    }

    pub fn usd(&self) -> &CurrencyCode {
        &self.usd
    }

    /// Codes in configuration order.
    pub fn codes(&self) -> &[CurrencyCode] {
        &self.ordered
    }

    /// Codes in configuration order, USD excluded. These are the assets a
    /// domestic market can be asked about.
    pub fn assets(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.ordered.iter().filter(move |c| *c != &self.usd)
    }

    /// Split a raw symbol into a canonical pair. `None` means the symbol is
    /// not made of two vocabulary codes, which is a normal filtering
    /// outcome.
    pub fn parse_pair(&self, raw_symbol: &str) -> Option<CanonicalPair> {
        let symbol = raw_symbol.trim().to_ascii_uppercase();

        for base in &self.by_length {
            let Some(rest) = symbol.strip_prefix(base.as_str()) else {
                continue;
            };
            if rest.is_empty() || rest == base.as_str() {
                continue;
            }
            let quote = CurrencyCode::new(rest);
            if self.members.contains(&quote) {
                return Some(CanonicalPair::new(base.clone(), quote));
            }
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
