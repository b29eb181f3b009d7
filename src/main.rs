//! SPREADWATCH: cross-exchange quote aggregator
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires exchanges, FX, storage and alerts into a cycle runner, and runs
//! it on a fixed delay until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use spreadwatch::alerts::{self, limiter::AlertRateLimiter, AlertGate};
use spreadwatch::config;
use spreadwatch::dashboard::{self, routes::DashboardState};
use spreadwatch::engine::cycle::{CycleRunner, CycleSettings};
use spreadwatch::engine::normalizer::Vocabulary;
use spreadwatch::engine::orchestrator::ExchangeTask;
use spreadwatch::exchanges;
use spreadwatch::fx;
use spreadwatch::storage::SqliteStore;
use spreadwatch::types::CurrencyCode;

const BANNER: &str = r#"
 ___ ___ ___ ___   _   _____      ___ _____ ___ _  _
/ __| _ \ _ \ __| /_\ |   \ \    / /_\_   _/ __| || |
\__ \  _/   / _| / _ \| |) \ \/\/ / _ \| || (__| __ |
|___/_| |_|_\___/_/ \_\___/ \_/\_/_/ \_\_| \___|_||_|

  Cross-exchange quote aggregator, v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("SPREADWATCH_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        cycle_delay_secs = cfg.agent.cycle_delay_secs,
        policy = %cfg.selection.policy,
        threshold = cfg.margins.threshold,
        "SPREADWATCH starting up"
    );

    // -- Initialise components -------------------------------------------

    let timeout = cfg.request_timeout();
    let vocabulary = Arc::new(Vocabulary::new(cfg.vocabulary.codes.as_slice(), &cfg.vocabulary.usd));
    let store = Arc::new(SqliteStore::connect(&cfg.storage.database_url).await?);

    let domestic = exchanges::with_overrides(
        exchanges::build_domestic(&cfg.domestic.source, &vocabulary, &cfg.domestic.fiat, timeout)?,
        cfg.overrides_for(&cfg.domestic.source),
    );
    let domestic = ExchangeTask::new(
        domestic,
        cfg.domestic
            .concurrency
            .unwrap_or(cfg.fetch.concurrency_per_exchange),
    );

    let mut tasks = Vec::new();
    for ex in cfg.enabled_exchanges() {
        let exchange = exchanges::with_overrides(
            exchanges::build(&ex.id, &vocabulary, timeout)?,
            cfg.overrides_for(&ex.id),
        );
        tasks.push(ExchangeTask::new(exchange, cfg.concurrency_for(ex)));
    }
    if tasks.is_empty() {
        warn!("No global exchanges enabled, reports will be empty");
    }
    info!(
        exchanges = ?cfg.enabled_exchanges().map(|e| e.id.as_str()).collect::<Vec<_>>(),
        domestic = %cfg.domestic.source,
        "Exchanges configured"
    );

    let fx_source: Arc<dyn fx::FxSource> = fx::build(&cfg.fx, &cfg.domestic.fiat, timeout)?.into();

    let gate = AlertGate::new(
        AlertRateLimiter::new(store.clone(), cfg.alert_cooldown()),
        alerts::build_notifier(&cfg.alerts, timeout)?,
        cfg.alerts.recipients.clone(),
        cfg.alerts.subject.clone(),
    );

    let settings = CycleSettings {
        policy: cfg.selection.policy,
        threshold: cfg.margins.threshold,
        excluded_bases: cfg
            .alerts
            .excluded_bases
            .iter()
            .map(|b| CurrencyCode::new(b))
            .collect(),
        domestic_fiat: cfg.domestic.fiat.clone(),
    };

    let runner = Arc::new(CycleRunner::new(
        settings,
        vocabulary,
        domestic,
        tasks,
        fx_source,
        store.clone(),
        gate,
    ));

    let state = Arc::new(DashboardState::new(runner.clone(), Some((*store).clone())));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let delay = cfg.cycle_delay();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        delay_secs = cfg.agent.cycle_delay_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            report = runner.generate_report() => {
                info!("\n{report}");
                state.publish(report).await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }

        // Fixed delay: the next cycle starts only after this one has
        // reported.
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("SPREADWATCH shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spreadwatch=info"));

    let json_logging = std::env::var("SPREADWATCH_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
