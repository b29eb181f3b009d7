//! Alert cooldown.
//!
//! At most one alert is sent per cooldown window. The timestamp of the
//! last successful send is kept in durable storage so a restart does not
//! reopen the window.
//!
//! The store keeps millisecond precision, so both sides of the comparison
//! are truncated to whole milliseconds.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::warn;

use crate::storage::AlertStateStore;

pub struct AlertRateLimiter {
    store: Arc<dyn AlertStateStore>,
    cooldown: Duration,
}

impl AlertRateLimiter {
    pub fn new(store: Arc<dyn AlertStateStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    /// True if no alert was sent within the cooldown before `now`. An
    /// unreadable record counts as "never alerted".
    pub async fn should_alert(&self, now: DateTime<Utc>) -> bool {
        let now = now.trunc_subsecs(3);
        match self.store.last_alert_at().await {
            Ok(Some(last)) => now - last > self.cooldown,
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "Alert state unreadable, treating as never alerted");
                true
            }
        }
    }

    /// Start a new cooldown window at `now`.
    pub async fn record_alert_sent(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.store.set_last_alert_at(now.trunc_subsecs(3)).await
    }
}
