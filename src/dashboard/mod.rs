//! Report server: Axum HTTP front end for the cycle runner.
//!
//! Serves the last scheduled report, on-demand reports and the persisted
//! margin history. CORS enabled for GET so a browser front end can poll it.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Bind the port and serve in a background task.
pub async fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard port {port}"))?;
    info!(port, "Report server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Report server stopped");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/report", get(routes::get_report))
        .route("/api/last-report", get(routes::get_last_report))
        .route("/api/margins", get(routes::get_margins))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
