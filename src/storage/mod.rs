//! Persistence layer.
//!
//! Margins are appended to a SQLite `margins` table, one row per pair per
//! cycle, for later analysis. The last alert timestamp lives in a small
//! key/value table so the alert cooldown survives restarts.
//!
//! Both concerns sit behind traits so the engine can run against an
//! in-memory store in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::MarginRecord;

const LAST_ALERT_KEY: &str = "last_alert_at";

/// Append-only sink for computed margins.
#[async_trait]
pub trait MarginSink: Send + Sync {
    async fn record_margin(&self, record: &MarginRecord) -> Result<()>;
}

/// Durable storage for the alert cooldown.
#[async_trait]
pub trait AlertStateStore: Send + Sync {
    /// `None` when no alert has ever been sent.
    async fn last_alert_at(&self) -> Result<Option<DateTime<Utc>>>;

    async fn set_last_alert_at(&self, at: DateTime<Utc>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url: {url}"))?
            .create_if_missing(true);

        // Every connection to `sqlite::memory:` is its own database, so an
        // in-memory store must hold exactly one connection for its lifetime.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {url}"))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        info!(url, "Storage ready");
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS margins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                margin REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create margins table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_state (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create alert_state table")?;

        Ok(())
    }

    /// Most recent margin rows, newest first.
    pub async fn recent_margins(&self, limit: u32) -> Result<Vec<MarginRecord>> {
        let rows = sqlx::query(
            "SELECT code, timestamp, margin FROM margins ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query margins")?;

        rows.into_iter()
            .map(|row| -> Result<MarginRecord> {
                let millis: i64 = row.try_get("timestamp")?;
                Ok(MarginRecord {
                    code: row.try_get("code")?,
                    timestamp: from_millis(millis)?,
                    margin: row.try_get("margin")?,
                })
            })
            .collect()
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .with_context(|| format!("Timestamp out of range: {millis}"))
}

#[async_trait]
impl MarginSink for SqliteStore {
    async fn record_margin(&self, record: &MarginRecord) -> Result<()> {
        sqlx::query("INSERT INTO margins (code, timestamp, margin) VALUES (?, ?, ?)")
            .bind(&record.code)
            .bind(record.timestamp.timestamp_millis())
            .bind(record.margin)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to record margin for {}", record.code))?;
        debug!(code = %record.code, margin = record.margin, "Margin recorded");
        Ok(())
    }
}

#[async_trait]
impl AlertStateStore for SqliteStore {
    async fn last_alert_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT value FROM alert_state WHERE key = ?")
            .bind(LAST_ALERT_KEY)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read alert state")?;
        match row {
            Some(row) => Ok(Some(from_millis(row.try_get("value")?)?)),
            None => Ok(None),
        }
    }

    async fn set_last_alert_at(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_state (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(LAST_ALERT_KEY)
        .bind(at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to write alert state")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
