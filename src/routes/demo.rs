//! Demo endpoints used to exercise logging, timeouts and error responses.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use tracing::info;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/test", get(hello))
        .route("/timeout", get(slow))
        .route("/error", get(fail))
}

async fn hello() -> &'static str {
    // ---
    info!("Test request");
    "Hello, World 👋!"
}

/// Sleeps past the default request timeout; the timeout layer normally
/// answers 408 before this completes.
async fn slow(State(state): State<AppState>) -> &'static str {
    // ---
    tokio::time::sleep(state.config.slow_route_delay).await;
    info!("Timeout request completed");
    "timeout"
}

async fn fail() -> impl IntoResponse {
    // ---
    info!("Error request");
    (StatusCode::INTERNAL_SERVER_ERROR, "error")
}
