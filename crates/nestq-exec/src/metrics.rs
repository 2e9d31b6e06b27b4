//! Per-request counters and tracing hooks.
//!
//! Counters are atomics because sibling branches update them from scoped
//! threads; `snapshot` turns them into a plain `ExecStats`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStats {
    pub fetches: u64,
    pub pushed_filters: u64,
    pub pushed_sorts: u64,
    pub pushed_slices: u64,
    pub native_counts: u64,
    pub fallback_counts: u64,
    pub native_aggregates: u64,
    pub fallback_aggregates: u64,
    pub flatten_rows: u64,
    pub output_rows: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub fetches: AtomicU64,
    pub pushed_filters: AtomicU64,
    pub pushed_sorts: AtomicU64,
    pub pushed_slices: AtomicU64,
    pub native_counts: AtomicU64,
    pub fallback_counts: AtomicU64,
    pub native_aggregates: AtomicU64,
    pub fallback_aggregates: AtomicU64,
    pub flatten_rows: AtomicU64,
}

impl Counters {
    pub fn bump(c: &AtomicU64) {
        c.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(c: &AtomicU64, n: usize) {
        c.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, output_rows: usize, elapsed_ms: u64) -> ExecStats {
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        ExecStats {
            fetches: load(&self.fetches),
            pushed_filters: load(&self.pushed_filters),
            pushed_sorts: load(&self.pushed_sorts),
            pushed_slices: load(&self.pushed_slices),
            native_counts: load(&self.native_counts),
            fallback_counts: load(&self.fallback_counts),
            native_aggregates: load(&self.native_aggregates),
            fallback_aggregates: load(&self.fallback_aggregates),
            flatten_rows: load(&self.flatten_rows),
            output_rows: output_rows as u64,
            elapsed_ms,
        }
    }
}

#[cfg(feature = "tracing")]
pub fn emit_stats(request: &str, stats: &ExecStats) {
    tracing::debug!(
        %request,
        fetches = stats.fetches,
        pushed_filters = stats.pushed_filters,
        pushed_sorts = stats.pushed_sorts,
        pushed_slices = stats.pushed_slices,
        native_counts = stats.native_counts,
        fallback_counts = stats.fallback_counts,
        native_aggregates = stats.native_aggregates,
        fallback_aggregates = stats.fallback_aggregates,
        flatten_rows = stats.flatten_rows,
        "request stats"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn emit_stats(_request: &str, _stats: &ExecStats) { /* no-op */
}
