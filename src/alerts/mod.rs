//! Margin alerts.
//!
//! When any reportable margin exceeds the threshold, one summary message
//! goes out to every recipient, at most once per cooldown window. The
//! cooldown only advances after a successful send.

pub mod limiter;
pub mod mailgun;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AlertsConfig, AppConfig};
use crate::engine::report;
use crate::types::PairMargin;

use limiter::AlertRateLimiter;

/// Delivery channel for alert messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()>;
}

/// Writes alerts to the log instead of delivering them. Used when no mail
/// transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()> {
        info!(subject, recipients = ?recipients, "ALERT (not delivered)\n{body}");
        Ok(())
    }
}

/// Build the configured notifier. Mailgun needs its API key in the
/// environment variable named by `alerts.mailgun.api_key_env`.
pub fn build_notifier(cfg: &AlertsConfig, timeout: Duration) -> Result<Arc<dyn Notifier>> {
    match &cfg.mailgun {
        Some(mg) => {
            let key = AppConfig::resolve_env(&mg.api_key_env)?;
            Ok(Arc::new(mailgun::MailgunNotifier::new(&mg.domain, &mg.from, key, timeout)?))
        }
        None => {
            warn!("No mail transport configured, alerts will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

// ---------------------------------------------------------------------------
// Alert gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// Nothing above the threshold.
    NotNeeded,
    /// Above the threshold but inside the cooldown window.
    Suppressed,
    Sent { margins: usize },
    Failed(String),
}

pub struct AlertGate {
    limiter: AlertRateLimiter,
    notifier: Arc<dyn Notifier>,
    recipients: Vec<String>,
    subject: String,
    /// Serializes check-send-record so two overlapping cycles cannot both
    /// pass the cooldown check.
    lock: Mutex<()>,
}

impl AlertGate {
    pub fn new(
        limiter: AlertRateLimiter,
        notifier: Arc<dyn Notifier>,
        recipients: Vec<String>,
        subject: String,
    ) -> Self {
        Self {
            limiter,
            notifier,
            recipients,
            subject,
            lock: Mutex::new(()),
        }
    }

    /// Send one alert for `hot` unless it is empty or the cooldown is
    /// still running.
    pub async fn maybe_alert(
        &self,
        hot: &[&PairMargin],
        threshold: f64,
        now: DateTime<Utc>,
    ) -> AlertOutcome {
        if hot.is_empty() {
            return AlertOutcome::NotNeeded;
        }

        let _guard = self.lock.lock().await;
        if !self.limiter.should_alert(now).await {
            info!(margins = hot.len(), "Alert suppressed by cooldown");
            return AlertOutcome::Suppressed;
        }

        let body = report::render_alert(hot, threshold, now);
        if let Err(e) = self.notifier.send(&self.subject, &body, &self.recipients).await {
            warn!(error = %e, "Alert delivery failed");
            return AlertOutcome::Failed(e.to_string());
        }

        if let Err(e) = self.limiter.record_alert_sent(now).await {
            warn!(error = %e, "Alert sent but cooldown could not be recorded");
        }
        info!(margins = hot.len(), recipients = self.recipients.len(), "Alert sent");
        AlertOutcome::Sent { margins: hot.len() }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
