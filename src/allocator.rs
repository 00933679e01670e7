//! Allocation accounting for the health report.
//!
//! Rust has no collector to ask for heap statistics, so the process installs
//! [`CountingAllocator`] as its global allocator (see `main.rs`) and the
//! health report reads the counters kept here.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static TOTAL_ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

// ---

/// Thin wrapper over [`System`] that keeps running byte counters.
///
/// Must not allocate or log: it runs inside every allocation.
pub struct CountingAllocator;

#[inline]
fn record_alloc(size: usize) {
    // ---
    TOTAL_ALLOCATED.fetch_add(size, Ordering::Relaxed);
    let live = ALLOCATED.fetch_add(size, Ordering::Relaxed) + size;
    PEAK_ALLOCATED.fetch_max(live, Ordering::Relaxed);
}

#[inline]
fn record_dealloc(size: usize) {
    ALLOCATED.fetch_sub(size, Ordering::Relaxed);
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            let old_size = layout.size();
            if new_size > old_size {
                record_alloc(new_size - old_size);
            } else {
                record_dealloc(old_size - new_size);
            }
        }
        new_ptr
    }
}

/// Point-in-time copy of the allocation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocSnapshot {
    // ---
    /// Bytes currently live on the heap.
    pub allocated: u64,

    /// Bytes handed out since process start, never decreasing.
    pub total_allocated: u64,

    /// Highest value `allocated` has reached.
    pub peak_allocated: u64,
}

/// Read the allocation counters.
///
/// All zero if [`CountingAllocator`] is not the global allocator.
pub fn snapshot() -> AllocSnapshot {
    // ---
    AllocSnapshot {
        allocated: ALLOCATED.load(Ordering::Relaxed) as u64,
        total_allocated: TOTAL_ALLOCATED.load(Ordering::Relaxed) as u64,
        peak_allocated: PEAK_ALLOCATED.load(Ordering::Relaxed) as u64,
    }
}

/// Bytes of memory the process holds from the operating system.
///
/// Resident set size on Linux; the allocator high-water mark elsewhere or
/// when `/proc` cannot be read.
pub fn system_bytes() -> u64 {
    // ---
    resident_bytes().unwrap_or_else(|| snapshot().peak_allocated)
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> Option<u64> {
    // ---
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> Option<u64> {
    None
}

/// Extract `VmRSS` (reported in kB) from a `/proc/<pid>/status` body.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    // ---
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}
