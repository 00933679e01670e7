//! Graceful shutdown handling.
//!
//! SIGTERM or SIGINT cancels the process-wide [`CancellationToken`]. The
//! HTTP server stops accepting connections when the token fires and drains
//! in-flight requests; `/health` hands child tokens of it to probes.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Wait for SIGTERM or SIGINT.
///
/// Returns the name of the signal that was received.
#[cfg(unix)]
pub async fn wait_for_signal() -> Result<&'static str> {
    // ---
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("Cannot register SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Cannot register SIGINT handler")?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    info!(signal = name, "Received shutdown signal");
    Ok(name)
}

/// Wait for Ctrl+C (non-unix targets).
#[cfg(not(unix))]
pub async fn wait_for_signal() -> Result<&'static str> {
    // ---
    tokio::signal::ctrl_c()
        .await
        .context("Cannot wait for Ctrl+C")?;
    info!(signal = "CTRL_C", "Received shutdown signal");
    Ok("CTRL_C")
}

/// Cancel `token` and give `server` at most `timeout` to finish draining.
///
/// Returns an error when the server failed or did not stop in time.
pub async fn drain(
    token: &CancellationToken,
    server: JoinHandle<Result<()>>,
    timeout: Duration,
) -> Result<()> {
    // ---
    info!("Shutting down server...");
    token.cancel();

    match tokio::time::timeout(timeout, server).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            error!(error = %join_err, "Server task aborted");
            Err(join_err.into())
        }
        Err(_) => {
            warn!(?timeout, "In-flight requests still running at shutdown deadline");
            anyhow::bail!("graceful shutdown timed out after {:?}", timeout)
        }
    }
}
