//! Best-quote selection.
//!
//! Folds every normalized observation of a cycle into per-pair candidates.
//! The table is a `DashMap`: updates to different pairs land on
//! independent shards, while the entry guard serializes updates to the
//! same pair so compare-and-replace is atomic.
//!
//! Each pair keeps its cheapest and its dearest observation. A margin falls
//! as the price rises, so whatever the policy, the winner is one of the
//! two. The winner is picked in [`BestQuoteSelector::finalize`] once every
//! exchange has settled, against the final cross quotes, so the outcome
//! does not depend on the order observations arrived in.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::engine::margin::MarginInputs;
use crate::types::{is_valid_price, BestQuote, CanonicalPair, SelectionPolicy, TickerObservation};

#[derive(Debug, Clone)]
struct Candidates {
    low: BestQuote,
    high: BestQuote,
}

fn unscored(obs: TickerObservation) -> BestQuote {
    BestQuote {
        pair: obs.pair,
        price: obs.price,
        source_id: obs.source_id,
        margin: None,
    }
}

/// Cycle-scoped best-quote table.
#[derive(Debug)]
pub struct BestQuoteSelector {
    policy: SelectionPolicy,
    inputs: Arc<MarginInputs>,
    table: DashMap<CanonicalPair, Candidates>,
}

impl BestQuoteSelector {
    /// Create an empty table. `inputs` is only consulted under the
    /// extreme-margin policy.
    pub fn new(policy: SelectionPolicy, inputs: Arc<MarginInputs>) -> Self {
        Self {
            policy,
            inputs,
            table: DashMap::new(),
        }
    }

    /// Offer an observation.
    ///
    /// Non-positive and non-finite prices are discarded. On a price tie
    /// the observation already held is kept.
    pub fn update(&self, obs: TickerObservation) {
        if !is_valid_price(obs.price) {
            trace!(pair = %obs.pair, price = obs.price, source = %obs.source_id, "Discarding invalid price");
            return;
        }

        match self.table.entry(obs.pair.clone()) {
            Entry::Vacant(slot) => {
                let quote = unscored(obs);
                slot.insert(Candidates {
                    low: quote.clone(),
                    high: quote,
                });
            }
            Entry::Occupied(mut slot) => {
                let held = slot.get_mut();
                if obs.price < held.low.price {
                    held.low = unscored(obs);
                } else if obs.price > held.high.price {
                    held.high = unscored(obs);
                }
            }
        }
    }

    /// Number of pairs with at least one observation.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Resolve the winner of every pair. Call after every task has settled.
    pub fn finalize(&self) -> HashMap<CanonicalPair, BestQuote> {
        let held: Vec<(CanonicalPair, Candidates)> = self
            .table
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        match self.policy {
            SelectionPolicy::LowestPrice => held.into_iter().map(|(pair, c)| (pair, c.low)).collect(),
            SelectionPolicy::ExtremeMargin => {
                // USD-quoted pairs first: chained pairs need their final
                // cross quote.
                let (direct, chained): (Vec<_>, Vec<_>) = held
                    .into_iter()
                    .partition(|(pair, _)| self.inputs.cross_pair(pair).is_none());

                let mut winners = HashMap::with_capacity(direct.len() + chained.len());
                for (pair, candidates) in direct {
                    let best = self.extreme(candidates, None);
                    winners.insert(pair, best);
                }
                for (pair, candidates) in chained {
                    let cross = self
                        .inputs
                        .cross_pair(&pair)
                        .and_then(|cross| winners.get(&cross))
                        .map(|q: &BestQuote| q.price);
                    let best = self.extreme(candidates, cross);
                    winners.insert(pair, best);
                }
                winners
            }
        }
    }

    /// Largest absolute margin wins; equal or undefined margins fall back
    /// to the cheaper quote.
    fn extreme(&self, candidates: Candidates, cross: Option<f64>) -> BestQuote {
        let Candidates { mut low, mut high } = candidates;
        low.margin = self.inputs.margin_for(&low.pair, low.price, cross);
        high.margin = self.inputs.margin_for(&high.pair, high.price, cross);
        match (low.margin, high.margin) {
            (Some(l), Some(h)) if h.abs() > l.abs() => high,
            (None, Some(_)) => high,
            _ => low,
        }
    }

    /// Resolved winner for one pair.
    pub fn get(&self, pair: &CanonicalPair) -> Option<BestQuote> {
        self.finalize().remove(pair)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
