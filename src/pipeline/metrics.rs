//! Pipeline counters
//!
//! Each counter is written by exactly one stage and read by the monitor and
//! the final run report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Atomic counter for thread-safe incrementing
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters shared by the pipeline stages
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Records emitted by the extractor (owned by the extractor)
    pub extracted: Counter,
    /// Records successfully transformed (owned by the worker pool)
    pub transformed: Counter,
    /// Records whose transform failed and were skipped
    pub transform_failed: Counter,
    /// Records dropped for being shorter than the configured minimum
    pub filtered_short: Counter,
    /// Rows newly persisted by the writer
    pub written: Counter,
    /// Upserts ignored because the key was already present
    pub duplicates: Counter,
}

impl PipelineCounters {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self, elapsed: Duration) -> PipelineStats {
        let mut stats = PipelineStats {
            extracted: self.extracted.get(),
            transformed: self.transformed.get(),
            transform_failed: self.transform_failed.get(),
            filtered_short: self.filtered_short.get(),
            written: self.written.get(),
            duplicates: self.duplicates.get(),
            elapsed_seconds: elapsed.as_secs_f64(),
            docs_per_second: 0.0,
        };
        stats.update_rate();
        stats
    }
}

/// Snapshot of the pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub extracted: u64,
    pub transformed: u64,
    pub transform_failed: u64,
    pub filtered_short: u64,
    pub written: u64,
    pub duplicates: u64,
    pub elapsed_seconds: f64,
    /// Extraction rate over the whole run
    pub docs_per_second: f64,
}

impl PipelineStats {
    /// Calculate documents per second
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.docs_per_second = self.extracted as f64 / self.elapsed_seconds;
        }
    }
}
