//! Application entry point for the `fiber-health-poc` service.
//!
//! This binary orchestrates the full startup sequence, including:
//! - Initializing structured logging/tracing
//! - Loading configuration from environment variables or `.env`
//! - Creating the shared health reporter and its built-in probes
//! - Mounting all routes and middleware via the `routes` gateway (EMBP pattern)
//! - Binding the Axum HTTP server and serving requests
//! - Draining in-flight requests on SIGINT/SIGTERM
//!
//! # Environment Variables
//! - `LISTEN_ADDR` (optional) – bind address (default: `0.0.0.0:8081`)
//! - `REQUEST_TIMEOUT_SECS` (optional) – per-request timeout (default: 3)
//! - `SHUTDOWN_TIMEOUT_SECS` (optional) – graceful drain limit (default: 5)
//! - `SLOW_ROUTE_DELAY_SECS` (optional) – delay of `GET /timeout` (default: 12)
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating configuration parsing to `config`, the health report to
//! `health`, signal handling to `shutdown`, and route registration to `routes`.
use std::{env, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

mod allocator;
mod config;
mod health;
mod routes;
mod shutdown;

pub use config::Config;

// Re-exported so routes/*.rs only depend on their parent module (main.rs)
pub use health::{HealthReport, HealthReporter};

#[global_allocator]
static GLOBAL: allocator::CountingAllocator = allocator::CountingAllocator;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let token = CancellationToken::new();
    let reporter = Arc::new(HealthReporter::new());
    register_builtin_probes(&reporter, &token);
    tracing::info!(version = reporter.version(), "Health reporter ready");

    // Build app from routes gateway (EMBP)
    let addr = cfg.listen_addr;
    let shutdown_timeout = cfg.shutdown_timeout;
    let app: Router = routes::router(routes::AppState {
        reporter,
        shutdown: token.clone(),
        config: cfg,
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let server_token = token.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_token.cancelled_owned())
            .await
            .context("Failed to start server")
    });

    tracing::info!("Server started on {}", addr);

    tokio::select! {
        signal = shutdown::wait_for_signal() => {
            signal?;
        }
        result = &mut server => {
            result??;
            anyhow::bail!("Server stopped without a shutdown signal");
        }
    }

    match shutdown::drain(&token, server, shutdown_timeout).await {
        Ok(()) => {
            tracing::info!("Server shutdown successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to shutdown server: {:#}", e);
            Err(e)
        }
    }
}

// ---

/// Probes every instance carries.
///
/// `lifecycle` reads `running` until shutdown begins, then `draining`.
fn register_builtin_probes(reporter: &HealthReporter, token: &CancellationToken) {
    // ---
    let token = token.clone();
    reporter.register_probe("lifecycle", move || {
        if token.is_cancelled() {
            "draining".to_string()
        } else {
            "running".to_string()
        }
    });
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to AXUM_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},tower_http=debug,hyper=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_lifecycle_probe_follows_shutdown_token() {
        // ---
        let token = CancellationToken::new();
        let reporter = HealthReporter::new();
        register_builtin_probes(&reporter, &token);

        let ctx = CancellationToken::new();
        assert_eq!(reporter.report(&ctx).probe_results["lifecycle"], "running");

        token.cancel();
        assert_eq!(reporter.report(&ctx).probe_results["lifecycle"], "draining");
    }
}
