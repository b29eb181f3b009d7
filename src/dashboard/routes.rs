//! Report API route handlers.
//!
//! Reports are plain text; the margin history is JSON. State is shared via
//! `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::engine::cycle::CycleRunner;
use crate::storage::SqliteStore;
use crate::types::MarginRecord;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PublishedReport {
    pub generated_at: DateTime<Utc>,
    pub text: String,
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub runner: Arc<CycleRunner>,
    pub store: Option<SqliteStore>,
    pub last_report: RwLock<Option<PublishedReport>>,
}

impl DashboardState {
    pub fn new(runner: Arc<CycleRunner>, store: Option<SqliteStore>) -> Self {
        Self {
            runner,
            store,
            last_report: RwLock::new(None),
        }
    }

    /// Record the report of a scheduled cycle.
    pub async fn publish(&self, text: String) {
        *self.last_report.write().await = Some(PublishedReport {
            generated_at: Utc::now(),
            text,
        });
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/report: runs a fresh cycle with its own aggregation context.
pub async fn get_report(State(state): State<AppState>) -> String {
    info!("On-demand report requested");
    state.runner.generate_report().await
}

/// GET /api/last-report
pub async fn get_last_report(State(state): State<AppState>) -> impl IntoResponse {
    match state.last_report.read().await.as_ref() {
        Some(report) => (StatusCode::OK, report.text.clone()),
        None => (StatusCode::NOT_FOUND, "No report generated yet".to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct MarginsQuery {
    pub limit: Option<u32>,
}

const DEFAULT_MARGIN_LIMIT: u32 = 100;
const MAX_MARGIN_LIMIT: u32 = 1000;

/// GET /api/margins?limit=N: most recent persisted margins.
pub async fn get_margins(
    State(state): State<AppState>,
    Query(query): Query<MarginsQuery>,
) -> Result<Json<Vec<MarginRecord>>, (StatusCode, String)> {
    let Some(store) = &state.store else {
        return Err((StatusCode::SERVICE_UNAVAILABLE, "No margin store".to_string()));
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MARGIN_LIMIT)
        .min(MAX_MARGIN_LIMIT);
    store.recent_margins(limit).await.map(Json).map_err(|e| {
        warn!(error = %e, "Margin query failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })
}
