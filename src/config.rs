//! Configuration loader for the `fiber-health-poc` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Every setting is optional; a value that is present
//! but malformed is a startup error.
use std::{env, net::SocketAddr, time::Duration};

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional socket address environment variable with a default value.
macro_rules! parse_env_addr {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<SocketAddr>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or_else(|| SocketAddr::from($default))
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,

    /// Per-request deadline enforced by the timeout middleware.
    pub request_timeout: Duration,

    /// How long in-flight requests may drain after a shutdown signal.
    pub shutdown_timeout: Duration,

    /// Artificial delay of the `/timeout` demo route.
    pub slow_route_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        // ---
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            request_timeout: Duration::from_secs(3),
            shutdown_timeout: Duration::from_secs(5),
            slow_route_delay: Duration::from_secs(12),
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `LISTEN_ADDR` – bind address (default: `0.0.0.0:8081`)
/// - `REQUEST_TIMEOUT_SECS` – per-request timeout (default: 3)
/// - `SHUTDOWN_TIMEOUT_SECS` – graceful drain limit (default: 5)
/// - `SLOW_ROUTE_DELAY_SECS` – sleep of `GET /timeout` (default: 12)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let listen_addr = parse_env_addr!("LISTEN_ADDR", ([0, 0, 0, 0], 8081));
    let request_timeout = parse_env_u64!("REQUEST_TIMEOUT_SECS", 3);
    let shutdown_timeout = parse_env_u64!("SHUTDOWN_TIMEOUT_SECS", 5);
    let slow_route_delay = parse_env_u64!("SLOW_ROUTE_DELAY_SECS", 12);

    Ok(Config {
        listen_addr,
        request_timeout: Duration::from_secs(request_timeout),
        shutdown_timeout: Duration::from_secs(shutdown_timeout),
        slow_route_delay: Duration::from_secs(slow_route_delay),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  LISTEN_ADDR           : {}", self.listen_addr);
        tracing::info!("  REQUEST_TIMEOUT_SECS  : {}", self.request_timeout.as_secs());
        tracing::info!("  SHUTDOWN_TIMEOUT_SECS : {}", self.shutdown_timeout.as_secs());
        tracing::info!("  SLOW_ROUTE_DELAY_SECS : {}", self.slow_route_delay.as_secs());
    }
}
