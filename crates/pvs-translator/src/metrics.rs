//! Job metrics.
//!
//! Counts tool invocations, failures, timeouts and packaged files over the
//! lifetime of one job. Counters are atomics so the executor and the
//! pipeline can share one collector behind an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-job metrics collector.
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    /// External tool processes spawned.
    pub tools_invoked: AtomicU64,
    /// Tool runs that did not yield a usable result.
    pub tools_failed: AtomicU64,
    /// Tool runs that hit their timeout and were killed.
    pub tools_timed_out: AtomicU64,
    /// Cumulative wall time spent inside external tools.
    pub tool_time_ms: AtomicU64,
    /// Additional formats satisfied by a file already present.
    pub formats_reused: AtomicU64,
    /// Additional formats produced by invoking the translation tool.
    pub formats_generated: AtomicU64,
    /// Additional formats skipped because no tool can produce them.
    pub formats_skipped: AtomicU64,
    /// Archives written (per-extension zips and the additionals bundle).
    pub archives_created: AtomicU64,
    /// Files placed into archives.
    pub files_packaged: AtomicU64,
}

impl ConversionMetrics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished tool run.
    pub fn record_tool_run(&self, duration: Duration, success: bool, timed_out: bool) {
        self.tools_invoked.fetch_add(1, Ordering::Relaxed);
        self.tool_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        if timed_out {
            self.tools_timed_out.fetch_add(1, Ordering::Relaxed);
        }
        if !success {
            self.tools_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an additional format served from an existing file.
    pub fn record_format_reused(&self) {
        self.formats_reused.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an additional format produced by a tool run.
    pub fn record_format_generated(&self) {
        self.formats_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an additional format that was skipped.
    pub fn record_format_skipped(&self) {
        self.formats_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a written archive and the number of files it holds.
    pub fn record_archive(&self, files: usize) {
        self.archives_created.fetch_add(1, Ordering::Relaxed);
        self.files_packaged
            .fetch_add(files as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tools_invoked: self.tools_invoked.load(Ordering::Relaxed),
            tools_failed: self.tools_failed.load(Ordering::Relaxed),
            tools_timed_out: self.tools_timed_out.load(Ordering::Relaxed),
            tool_time_ms: self.tool_time_ms.load(Ordering::Relaxed),
            formats_reused: self.formats_reused.load(Ordering::Relaxed),
            formats_generated: self.formats_generated.load(Ordering::Relaxed),
            formats_skipped: self.formats_skipped.load(Ordering::Relaxed),
            archives_created: self.archives_created.load(Ordering::Relaxed),
            files_packaged: self.files_packaged.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of job metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// External tool processes spawned.
    pub tools_invoked: u64,
    /// Tool runs without a usable result.
    pub tools_failed: u64,
    /// Tool runs killed on timeout.
    pub tools_timed_out: u64,
    /// Cumulative tool wall time in milliseconds.
    pub tool_time_ms: u64,
    /// Additional formats reused.
    pub formats_reused: u64,
    /// Additional formats generated.
    pub formats_generated: u64,
    /// Additional formats skipped.
    pub formats_skipped: u64,
    /// Archives written.
    pub archives_created: u64,
    /// Files placed into archives.
    pub files_packaged: u64,
}
