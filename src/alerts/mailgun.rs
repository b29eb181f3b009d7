//! Mailgun email delivery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;
use tracing::debug;

use super::Notifier;
use crate::types::SpreadError;

const BASE_URL: &str = "https://api.mailgun.net";

pub struct MailgunNotifier {
    http: Client,
    base_url: String,
    domain: String,
    from: String,
    api_key: Secret<String>,
}

impl MailgunNotifier {
    pub fn new(domain: &str, from: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("SPREADWATCH/0.1.0 (alerts)")
            .build()
            .context("Failed to build Mailgun HTTP client")?;
        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            domain: domain.to_string(),
            from: from.to_string(),
            api_key: Secret::new(api_key),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v3/{}/messages", self.base_url, self.domain)
    }

    fn form(&self, subject: &str, body: &str, recipients: &[String]) -> Vec<(&'static str, String)> {
        vec![
            ("from", self.from.clone()),
            ("to", recipients.join(",")),
            ("subject", subject.to_string()),
            ("text", body.to_string()),
        ]
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> Result<()> {
        let url = self.messages_url();
        let resp = self
            .http
            .post(&url)
            .basic_auth("api", Some(self.api_key.expose_secret()))
            .form(&self.form(subject, body, recipients))
            .send()
            .await
            .context("Mailgun request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SpreadError::Notification(format!("Mailgun API error {status}: {body}")).into());
        }

        debug!(recipients = recipients.len(), "Mailgun accepted message");
        Ok(())
    }
}
