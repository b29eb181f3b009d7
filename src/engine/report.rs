//! Plain-text report and alert rendering.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::alerts::AlertOutcome;
use crate::engine::cycle::CycleOutcome;
use crate::types::PairMargin;

const SEPARATOR: &str = "===============================";

fn pct(percent: f64) -> String {
    format!("{percent:.2}%")
}

fn usd_line(out: &mut String, m: &PairMargin) {
    let _ = writeln!(
        out,
        "{:<10} buy {} @ {:<10} sell {}  margin {}",
        m.pair().to_string(),
        m.quote.price,
        m.quote.source_id,
        m.domestic_sell,
        pct(m.margin_pct())
    );
}

fn crypto_line(out: &mut String, m: &PairMargin) {
    let _ = writeln!(
        out,
        "{:<10} buy {} @ {:<10} margin {}",
        m.pair().to_string(),
        m.quote.price,
        m.quote.source_id,
        pct(m.margin_pct())
    );
}

/// Render the cycle digest. Pairs without a defined margin are omitted.
pub fn render(outcome: &CycleOutcome) -> String {
    let mut out = String::new();
    let fx = outcome
        .fx
        .map(|r| format!("{r}"))
        .unwrap_or_else(|| "unavailable".to_string());

    let _ = writeln!(
        out,
        "{} | cycle {} | policy {} | fx {} | {} quotes, {} domestic, {} margins",
        outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        outcome.cycle_id,
        outcome.policy,
        fx,
        outcome.quotes,
        outcome.domestic,
        outcome.sheet.len()
    );

    out.push_str("USD Arbs\n");
    for m in &outcome.sheet.usd {
        usd_line(&mut out, m);
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str("Crypto Arbs\n");
    for m in &outcome.sheet.crypto {
        crypto_line(&mut out, m);
    }

    out.push_str(SEPARATOR);
    out.push('\n');
    for sweep in std::iter::once(&outcome.domestic_sweep).chain(&outcome.sweeps) {
        match &sweep.listing_error {
            Some(e) => {
                let _ = writeln!(out, "{:<10} listing failed: {e}", sweep.exchange);
            }
            None => {
                let _ = writeln!(
                    out,
                    "{:<10} listed {}, accepted {}, skipped {}, failed {}",
                    sweep.exchange, sweep.listed, sweep.accepted, sweep.skipped, sweep.failed
                );
            }
        }
    }

    match &outcome.alert {
        AlertOutcome::NotNeeded => {}
        AlertOutcome::Suppressed => out.push_str("alert: suppressed (cooldown)\n"),
        AlertOutcome::Sent { margins } => {
            let _ = writeln!(out, "alert: sent ({margins} margins)");
        }
        AlertOutcome::Failed(e) => {
            let _ = writeln!(out, "alert: failed ({e})");
        }
    }

    out
}

/// Body of an alert message listing every qualifying pair.
pub fn render_alert(hot: &[&PairMargin], threshold: f64, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} pair(s) above the {} margin threshold at {}:",
        hot.len(),
        pct(threshold * 100.0),
        now.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out.push('\n');
    for m in hot {
        let _ = writeln!(
            out,
            "{}: buy {} on {}, domestic sell {}, margin {}",
            m.pair(),
            m.quote.price,
            m.quote.source_id,
            m.domestic_sell,
            pct(m.margin_pct())
        );
    }
    out
}
