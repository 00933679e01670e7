// src/routes/health.rs
//! Health report endpoint.
//!
//! Exports to the gateway (`mod.rs`) a subrouter with `GET /health`, which
//! serializes a fresh [`HealthReport`](crate::HealthReport) from the shared
//! reporter. The request never fails: the report is always `"OK"`.

use axum::{extract::State, routing::get, Json, Router};
use tracing::debug;

use super::AppState;
use crate::HealthReport;

/// Handle `GET /health`.
///
/// Probes receive a child of the shutdown token, so once shutdown has begun
/// they are skipped rather than started.
async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    // ---
    let ctx = state.shutdown.child_token();
    let report = state.reporter.report(&ctx);

    debug!(
        uptime = %report.uptime,
        checks = report.probe_results.len(),
        "GET /health"
    );
    Json(report)
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
