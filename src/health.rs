//! Extensible health report for the service.
//!
//! A [`HealthReporter`] is created once at startup and shared with the
//! `/health` route. Each call to [`HealthReporter::report`] produces a fresh,
//! immutable [`HealthReport`] with uptime, allocator counters, environment
//! facts and the output of every registered probe.
//!
//! The status is always `"OK"`: probes return a descriptive string and have
//! no way to mark the process unhealthy.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::allocator;

/// Status reported by every health report.
pub const STATUS_OK: &str = "OK";

/// Result recorded for a probe that was skipped because the caller's
/// context was cancelled.
pub const PROBE_CANCELLED: &str = "cancelled";

/// A named diagnostic hook whose output is surfaced verbatim.
pub type Probe = Arc<dyn Fn() -> String + Send + Sync>;

type ProbeMap = HashMap<String, Probe>;

// ---

/// Allocator counters at report time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    // ---
    pub alloc: u64,
    pub total_alloc: u64,
    pub sys: u64,
    /// Always zero: there is no garbage collector.
    #[serde(rename = "numGC")]
    pub num_gc: u32,
}

/// Environment facts at report time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    // ---
    pub runtime_version: String,
    pub os: String,
    pub arch: String,
    #[serde(rename = "numCPU")]
    pub num_cpu: usize,
    pub num_concurrent_units: usize,
}

/// One snapshot of process health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    // ---
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime: String,
    pub memory: MemoryStats,
    pub system: SystemStats,
    #[serde(rename = "checks", skip_serializing_if = "HashMap::is_empty")]
    pub probe_results: HashMap<String, String>,
}

/// Builds [`HealthReport`]s and owns the probe registry.
///
/// The registry is copy-on-write: registration swaps in a new map, and a
/// report works on whichever map was current when it started. Probes run
/// outside the lock.
pub struct HealthReporter {
    // ---
    start_time: Instant,
    version: String,
    probes: RwLock<Arc<ProbeMap>>,
}

impl HealthReporter {
    // ---
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    fn started_at(start_time: Instant) -> Self {
        // ---
        Self {
            start_time,
            version: env!("CARGO_PKG_VERSION").to_string(),
            probes: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Time elapsed since the reporter was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Register `probe` under `name`, replacing any probe already there.
    pub fn register_probe<F>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        // ---
        let name = name.into();
        let mut guard = self.probes.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = ProbeMap::clone(&**guard);
        let replaced = next.insert(name.clone(), Arc::new(probe)).is_some();
        *guard = Arc::new(next);

        tracing::debug!(probe = %name, replaced, "Registered health probe");
    }

    fn registered_probes(&self) -> Arc<ProbeMap> {
        // ---
        let guard = self.probes.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Produce a health report.
    ///
    /// Never fails. Probes run synchronously in unspecified order; once `ctx`
    /// is cancelled the remaining probes are skipped and reported as
    /// [`PROBE_CANCELLED`].
    pub fn report(&self, ctx: &CancellationToken) -> HealthReport {
        // ---
        let counters = allocator::snapshot();
        let uptime = format_uptime(self.uptime());

        let probes = self.registered_probes();
        let mut probe_results = HashMap::with_capacity(probes.len());
        for (name, probe) in probes.iter() {
            let result = if ctx.is_cancelled() {
                PROBE_CANCELLED.to_string()
            } else {
                probe()
            };
            probe_results.insert(name.clone(), result);
        }

        HealthReport {
            status: STATUS_OK,
            timestamp: Utc::now(),
            version: self.version.clone(),
            uptime,
            memory: MemoryStats {
                alloc: counters.allocated,
                total_alloc: counters.total_allocated,
                sys: allocator::system_bytes(),
                num_gc: 0,
            },
            system: system_stats(),
            probe_results,
        }
    }
}

impl Default for HealthReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn system_stats() -> SystemStats {
    // ---
    let num_concurrent_units = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or(0);

    SystemStats {
        runtime_version: env!("RUSTC_VERSION").to_string(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        num_cpu: num_cpus::get(),
        num_concurrent_units,
    }
}

/// Render an uptime for humans.
///
/// Sub-second values are whole milliseconds (`"350ms"`); anything longer is
/// truncated to whole seconds and split into units with leading zero units
/// dropped (`"5s"`, `"1m5s"`, `"2h0m7s"`).
pub fn format_uptime(uptime: Duration) -> String {
    // ---
    let secs = uptime.as_secs();
    if secs == 0 {
        let millis = uptime.subsec_millis();
        return if millis == 0 {
            "0s".to_string()
        } else {
            format!("{millis}ms")
        };
    }

    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
