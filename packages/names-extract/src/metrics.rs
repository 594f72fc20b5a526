//! Run metrics for the extraction pipeline
//!
//! Lock-free counters shared between the scanning thread and the sort
//! stages of every sink. One instance per run, passed around as
//! `Arc<RunMetrics>`; `snapshot()` copies the counters into a plain struct
//! for logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Log a progress line every this many scanned entities.
pub const PROGRESS_INTERVAL: u64 = 1_000_000;

pub struct RunMetrics {
    // ========================================================================
    // Scan
    // ========================================================================
    /// Entities read from the source
    entities_scanned: AtomicU64,

    /// Entities that matched at least one category
    entities_matched: AtomicU64,

    /// Records handed to sinks
    records_accepted: AtomicU64,

    // ========================================================================
    // Sort
    // ========================================================================
    /// Partitions spilled to run-files, across all sinks
    spills: AtomicU64,

    /// Bytes written to run-files (spills and intermediate merges)
    bytes_spilled: AtomicU64,

    // ========================================================================
    // Output
    // ========================================================================
    /// Records written to output files
    records_written: AtomicU64,

    /// Outputs moved to their final path
    outputs_published: AtomicU64,

    started_at: Instant,
}

/// Point-in-time copy of [`RunMetrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub entities_scanned: u64,
    pub entities_matched: u64,
    pub records_accepted: u64,
    pub spills: u64,
    pub bytes_spilled: u64,
    pub records_written: u64,
    pub outputs_published: u64,
    pub elapsed_ms: u64,
    /// Scan throughput since the run started
    pub entities_per_sec: f64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            entities_scanned: AtomicU64::new(0),
            entities_matched: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            spills: AtomicU64::new(0),
            bytes_spilled: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            outputs_published: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Count one scanned entity. Returns the new total.
    pub fn record_entity(&self, matched: bool) -> u64 {
        if matched {
            self.entities_matched.fetch_add(1, Ordering::Relaxed);
        }
        self.entities_scanned.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_accepted(&self, records: u64) {
        self.records_accepted.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_spill(&self, bytes: u64) {
        self.spills.fetch_add(1, Ordering::Relaxed);
        self.bytes_spilled.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_merge_bytes(&self, bytes: u64) {
        self.bytes_spilled.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_written(&self, records: u64) {
        self.records_written.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.outputs_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started_at.elapsed();
        let entities_scanned = self.entities_scanned.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        let entities_per_sec = if secs > 0.0 {
            entities_scanned as f64 / secs
        } else {
            0.0
        };

        MetricsSnapshot {
            entities_scanned,
            entities_matched: self.entities_matched.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            spills: self.spills.load(Ordering::Relaxed),
            bytes_spilled: self.bytes_spilled.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            outputs_published: self.outputs_published.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
            entities_per_sec,
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_metrics_are_zero() {
        let snap = RunMetrics::new().snapshot();
        assert_eq!(snap.entities_scanned, 0);
        assert_eq!(snap.records_accepted, 0);
        assert_eq!(snap.spills, 0);
        assert_eq!(snap.outputs_published, 0);
    }

    #[test]
    fn test_record_entity_counts_matches() {
        let m = RunMetrics::new();
        assert_eq!(m.record_entity(false), 1);
        assert_eq!(m.record_entity(true), 2);
        assert_eq!(m.record_entity(true), 3);

        let snap = m.snapshot();
        assert_eq!(snap.entities_scanned, 3);
        assert_eq!(snap.entities_matched, 2);
    }

    #[test]
    fn test_spill_and_merge_bytes_accumulate() {
        let m = RunMetrics::new();
        m.record_spill(100);
        m.record_spill(50);
        m.record_merge_bytes(25);

        let snap = m.snapshot();
        assert_eq!(snap.spills, 2);
        assert_eq!(snap.bytes_spilled, 175);
    }

    #[test]
    fn test_thread_safety() {
        let m = Arc::new(RunMetrics::new());
        let mut handles = vec![];

        // Sort stages of several sinks report concurrently
        for _ in 0..8 {
            let m_clone = Arc::clone(&m);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m_clone.record_spill(10);
                    m_clone.record_written(3);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let snap = m.snapshot();
        assert_eq!(snap.spills, 800);
        assert_eq!(snap.bytes_spilled, 8000);
        assert_eq!(snap.records_written, 2400);
    }
}
