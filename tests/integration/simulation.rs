//! Full-cycle simulations: exchanges → selection → margins → store/alerts.

use std::sync::Arc;

use spreadwatch::alerts::AlertOutcome;
use spreadwatch::config::OverrideConfig;
use spreadwatch::exchanges::{self, Exchange};
use spreadwatch::types::SelectionPolicy;

use crate::mock_exchange::{BrokenSink, DownFx, Harness, MockExchange, RECIPIENT};

fn domestic(prices: &[(&str, f64)]) -> Arc<MockExchange> {
    MockExchange::markets("indodax", prices)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Selection and margins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lowest_price_wins_and_alert_fires() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![
            MockExchange::snapshot("a", &[("BTCUSD", 9000.0)]),
            MockExchange::markets("b", &[("BTCUSD", 9050.0)]),
        ],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.sheet.usd.len(), 1);
    let btc = &outcome.sheet.usd[0];
    assert_eq!(btc.quote.price, 9000.0);
    assert_eq!(btc.quote.source_id, "a");
    assert!(close(btc.margin, 10_000.0 / 9000.0 - 1.0));
    assert_eq!(outcome.alert, AlertOutcome::Sent { margins: 1 });

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Arbitrage margin alert");
    assert_eq!(sent[0].recipients, vec![RECIPIENT.to_string()]);
    assert!(sent[0].body.contains("BTC/USD"));
    assert!(sent[0].body.contains("11.11%"));
}

#[tokio::test]
async fn test_chained_margin_recorded_without_alert() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let runner = h.runner(
        domestic(&[("BTCIDR", 8000.0), ("ETHIDR", 460.0)]),
        vec![
            MockExchange::snapshot("a", &[("BTCUSD", 9000.0)]),
            MockExchange::snapshot("c", &[("ETHBTC", 0.05)]),
        ],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.sheet.crypto.len(), 1);
    let eth = &outcome.sheet.crypto[0];
    assert_eq!(eth.quote.source_id, "c");
    assert!(close(eth.margin, 460.0 / (0.05 * 9000.0) - 1.0));
    assert_eq!(outcome.alert, AlertOutcome::NotNeeded);
    assert!(h.notifier.sent().is_empty());

    let rows = h.store.recent_margins(10).await.unwrap();
    let codes: Vec<&str> = rows.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(rows.len(), 2);
    assert!(codes.contains(&"ETHBTC"));
    assert!(codes.contains(&"BTCUSD"));
    let started = outcome.started_at.timestamp_millis();
    assert!(rows.iter().all(|r| r.timestamp.timestamp_millis() == started));
}

#[tokio::test]
async fn test_missing_cross_quote_leaves_margin_undefined() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let runner = h.runner(
        domestic(&[("ETHIDR", 460.0)]),
        vec![MockExchange::snapshot("c", &[("ETHBTC", 0.05)])],
    );

    let outcome = runner.run_cycle().await;
    assert!(outcome.sheet.is_empty());
    assert_eq!(outcome.sheet.undefined.len(), 1);
    assert_eq!(outcome.persisted, 0);
    assert!(h.store.recent_margins(10).await.unwrap().is_empty());

    let text = runner.generate_report().await;
    assert!(!text.contains("ETH/BTC"));
}

#[tokio::test]
async fn test_extreme_margin_policy_prefers_largest_deviation() {
    let mut h = Harness::new(&["BTC", "USD"]).await;
    h.policy = SelectionPolicy::ExtremeMargin;
    h.threshold = 1.0;
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![
            MockExchange::snapshot("cheap", &[("BTCUSD", 9000.0)]),
            MockExchange::snapshot("dear", &[("BTCUSD", 20_000.0)]),
        ],
    );

    let outcome = runner.run_cycle().await;
    let btc = &outcome.sheet.usd[0];
    assert_eq!(btc.quote.source_id, "dear");
    assert!(close(btc.margin, -0.5));
}

#[tokio::test]
async fn test_extreme_margin_winner_ignores_exchange_order() {
    let prices_a: &[(&str, f64)] = &[("ETHBTC", 0.04), ("BTCUSD", 9000.0)];
    let prices_b: &[(&str, f64)] = &[("ETHBTC", 0.06)];

    let mut winners = Vec::new();
    for flipped in [false, true] {
        let mut h = Harness::new(&["BTC", "ETH", "USD"]).await;
        h.policy = SelectionPolicy::ExtremeMargin;
        h.threshold = 1.0;
        let a = MockExchange::markets("a", prices_a);
        let b = MockExchange::markets("b", prices_b);
        let exchanges: Vec<Arc<dyn Exchange>> = if flipped { vec![b, a] } else { vec![a, b] };
        let runner = h.runner(domestic(&[("ETHIDR", 460.0), ("BTCIDR", 9000.0)]), exchanges);

        let outcome = runner.run_cycle().await;
        let eth = outcome
            .sheet
            .crypto
            .iter()
            .find(|m| m.pair().code() == "ETHBTC")
            .cloned()
            .unwrap();
        winners.push(eth);
    }

    assert_eq!(winners[0].quote.source_id, "a");
    assert_eq!(winners[0], winners[1]);
}

#[tokio::test]
async fn test_fx_failure_makes_every_margin_undefined() {
    let mut h = Harness::new(&["BTC", "USD"]).await;
    h.fx = Arc::new(DownFx);
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![MockExchange::snapshot("a", &[("BTCUSD", 9000.0)])],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.fx, None);
    assert_eq!(outcome.quotes, 1);
    assert!(outcome.sheet.is_empty());
    assert_eq!(outcome.alert, AlertOutcome::NotNeeded);
    assert!(runner.generate_report().await.contains("fx unavailable"));
}

// ---------------------------------------------------------------------------
// Failure containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_listing_failure_only_drops_that_exchange() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let down = MockExchange::snapshot("down", &[("BTCUSD", 1.0)]);
    down.set_listing_error("connection reset");
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![down, MockExchange::snapshot("up", &[("BTCUSD", 9500.0)])],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.sweeps[0].listing_error.as_deref(), Some("connection reset"));
    assert_eq!(outcome.sheet.usd[0].quote.source_id, "up");
    assert_eq!(outcome.sheet.usd[0].quote.price, 9500.0);
}

#[tokio::test]
async fn test_single_market_failure_is_tolerated() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let flaky = MockExchange::markets("flaky", &[("BTCUSD", 9000.0), ("ETHUSD", 450.0)]);
    flaky.fail_market("ETHUSD");
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0), ("ETHIDR", 500.0)]),
        vec![flaky],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.sweeps[0].failed, 1);
    assert_eq!(outcome.sweeps[0].accepted, 1);
    assert_eq!(outcome.quotes, 1);
    assert_eq!(outcome.sheet.usd[0].pair().code(), "BTCUSD");
}

#[tokio::test]
async fn test_panic_becomes_error_report_and_next_cycle_runs() {
    let h = Harness::new(&["BTC", "USD"]).await;
    let broken = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![MockExchange::panicking("boom")],
    );
    let text = broken.generate_report().await;
    assert!(text.starts_with("Report generation failed"));
    assert!(text.contains("boom listing exploded"));

    let healthy = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![MockExchange::snapshot("a", &[("BTCUSD", 9000.0)])],
    );
    assert!(healthy.generate_report().await.contains("BTC/USD"));
}

#[tokio::test]
async fn test_persistence_failure_does_not_block_report_or_alert() {
    let mut h = Harness::new(&["BTC", "USD"]).await;
    h.sink = Some(Arc::new(BrokenSink));
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0)]),
        vec![MockExchange::snapshot("a", &[("BTCUSD", 9000.0)])],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.persisted, 0);
    assert_eq!(outcome.sheet.len(), 1);
    assert_eq!(outcome.alert, AlertOutcome::Sent { margins: 1 });
}

// ---------------------------------------------------------------------------
// Cycle boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_quotes_do_not_leak_between_cycles() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let ex = MockExchange::snapshot("a", &[("BTCUSD", 9000.0), ("ETHUSD", 400.0)]);
    let runner = h.runner(
        domestic(&[("BTCIDR", 9000.0), ("ETHIDR", 400.0)]),
        vec![ex.clone() as Arc<dyn Exchange>],
    );

    let first = runner.run_cycle().await;
    assert_eq!(first.quotes, 2);

    ex.set_prices(&[("BTCUSD", 9100.0)]);
    let second = runner.run_cycle().await;
    assert_eq!(second.quotes, 1);
    assert_eq!(second.sheet.usd.len(), 1);
    assert_eq!(second.sheet.usd[0].quote.price, 9100.0);
}

#[tokio::test]
async fn test_unchanged_inputs_give_identical_sheets() {
    let h = Harness::new(&["BTC", "ETH", "USD"]).await;
    let runner = h.runner(
        domestic(&[("BTCIDR", 10_000.0), ("ETHIDR", 460.0)]),
        vec![
            MockExchange::snapshot("a", &[("BTCUSD", 9000.0), ("ETHBTC", 0.05)]),
            MockExchange::markets("b", &[("BTCUSD", 9050.0), ("ETHUSD", 470.0)]),
        ],
    );

    let first = runner.run_cycle().await;
    let second = runner.run_cycle().await;
    assert_eq!(first.sheet, second.sheet);
}

#[tokio::test]
async fn test_alert_cooldown_survives_restart() {
    let h = Harness::new(&["BTC", "USD"]).await;
    let build = || {
        h.runner(
            domestic(&[("BTCIDR", 10_000.0)]),
            vec![MockExchange::snapshot("a", &[("BTCUSD", 9000.0)])],
        )
    };

    let first = build().run_cycle().await;
    assert_eq!(first.alert, AlertOutcome::Sent { margins: 1 });

    // A fresh runner over the same store sees the recorded alert.
    let second = build().run_cycle().await;
    assert_eq!(second.alert, AlertOutcome::Suppressed);
    assert_eq!(h.notifier.sent().len(), 1);
    tokio_test::assert_ok!(h.store.recent_margins(10).await);
}

// ---------------------------------------------------------------------------
// Configuration-driven behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_manual_override_fills_broken_domestic_market() {
    let mut h = Harness::new(&["BTC", "XLM", "USD"]).await;
    h.threshold = 10.0;
    let indodax = domestic(&[("BTCIDR", 10_000.0), ("XLMIDR", 0.0)]);
    indodax.fail_market("XLMIDR");
    let overrides = [OverrideConfig {
        exchange: "indodax".into(),
        market: "XLMIDR".into(),
        price: 0.6,
    }];
    let patched = exchanges::with_overrides(indodax, overrides.iter());

    let runner = h.runner(
        patched,
        vec![MockExchange::snapshot("a", &[("BTCUSD", 9000.0), ("XLMUSD", 0.5)])],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.domestic, 2);
    assert_eq!(outcome.domestic_sweep.failed, 0);
    let xlm = outcome
        .sheet
        .usd
        .iter()
        .find(|m| m.pair().code() == "XLMUSD")
        .unwrap();
    assert!(close(xlm.margin, 0.6 / 0.5 - 1.0));
}

#[tokio::test]
async fn test_excluded_base_is_reported_but_never_alerted() {
    let mut h = Harness::new(&["BTC", "XLM", "USD"]).await;
    h.excluded_bases = vec!["XLM"];
    let runner = h.runner(
        domestic(&[("BTCIDR", 9000.0), ("XLMIDR", 1.0)]),
        vec![MockExchange::snapshot("a", &[("BTCUSD", 9000.0), ("XLMUSD", 0.5)])],
    );

    let outcome = runner.run_cycle().await;
    assert_eq!(outcome.sheet.usd.len(), 2);
    assert_eq!(outcome.alert, AlertOutcome::NotNeeded);
    assert_eq!(outcome.persisted, 2);
    assert!(h.notifier.sent().is_empty());
}
