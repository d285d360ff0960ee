//! Generation statistics
//!
//! Two kinds of statistics are collected during a run:
//!
//! - **Table counts** ([`TableCounts`]): run-wide per-bucket entry totals,
//!   accumulated once per pass when the pass is handed to the disk queue
//! - **Pass timing** ([`GenerationStats`]): how long each pass took and how
//!   long workers stalled waiting for a staging slot to be written
//!
//! # Example
//!
//! ```
//! use f1plot::stats::TableCounts;
//!
//! let counts = TableCounts::new(4);
//! counts.add(&[1, 2, 3, 4]);
//! counts.add(&[4, 3, 2, 1]);
//!
//! assert_eq!(counts.snapshot(), vec![5, 5, 5, 5]);
//! assert_eq!(counts.total(), 20);
//! ```

pub mod histogram;

use histogram::{DurationHistogram, HistogramSummary};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Run-wide per-bucket entry totals
///
/// Updated by whichever worker leads the issuance of a pass, read by the
/// driver after the job has joined.
#[derive(Debug)]
pub struct TableCounts {
    buckets: Vec<AtomicU64>,
}

impl TableCounts {
    pub fn new(num_buckets: usize) -> Self {
        Self {
            buckets: (0..num_buckets).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Add one pass's per-bucket totals
    pub fn add(&self, pass_totals: &[u32]) {
        assert_eq!(pass_totals.len(), self.buckets.len(), "bucket count mismatch");
        for (bucket, &count) in self.buckets.iter().zip(pass_totals) {
            bucket.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn get(&self, bucket: usize) -> u64 {
        self.buckets[bucket].load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Sum over all buckets
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect()
    }
}

/// One slot acquisition, recorded after the wait completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotAcquire {
    pub pass: u32,
    /// Write fence value before waiting
    pub fence_before: u64,
    /// Write fence value once the slot was granted
    pub fence_after: u64,
}

/// Timing collected while a run progresses
#[derive(Debug, Clone, Default)]
pub struct GenerationStats {
    pass_times: DurationHistogram,
    slot_waits: DurationHistogram,
    issue_times: DurationHistogram,
    acquires: Vec<SlotAcquire>,
    /// Acquisitions that found the previous write still in flight
    stalls: u32,
}

impl GenerationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wall time of one whole pass (generation through issuance)
    pub fn record_pass(&mut self, elapsed: Duration) {
        self.pass_times.record(elapsed);
    }

    pub fn record_issue(&mut self, elapsed: Duration) {
        self.issue_times.record(elapsed);
    }

    /// Record a slot acquisition and the time spent waiting for it
    pub fn record_acquire(&mut self, acquire: SlotAcquire, waited: Duration) {
        if acquire.fence_before < (acquire.pass as u64).saturating_sub(1) {
            self.stalls += 1;
        }
        self.slot_waits.record(waited);
        self.acquires.push(acquire);
    }

    pub fn passes(&self) -> u64 {
        self.pass_times.len()
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn acquires(&self) -> &[SlotAcquire] {
        &self.acquires
    }

    pub fn pass_times(&self) -> &DurationHistogram {
        &self.pass_times
    }

    pub fn slot_waits(&self) -> &DurationHistogram {
        &self.slot_waits
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            passes: self.passes(),
            pass_time: self.pass_times.summary(),
            issue_time: self.issue_times.summary(),
            slot_wait: self.slot_waits.summary(),
            stalled_acquires: self.stalls,
        }
    }
}

/// Serializable statistics for reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSummary {
    pub passes: u64,
    pub pass_time: HistogramSummary,
    pub issue_time: HistogramSummary,
    pub slot_wait: HistogramSummary,
    pub stalled_acquires: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_table_counts_accumulate() {
        let counts = TableCounts::new(3);
        counts.add(&[1, 0, 2]);
        counts.add(&[u32::MAX, 1, 0]);

        assert_eq!(counts.get(0), u32::MAX as u64 + 1);
        assert_eq!(counts.get(1), 1);
        assert_eq!(counts.total(), u32::MAX as u64 + 4);
        assert_eq!(counts.len(), 3);
    }

    #[test]
    fn test_table_counts_concurrent_adds() {
        let counts = Arc::new(TableCounts::new(2));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counts = Arc::clone(&counts);
                thread::spawn(move || {
                    for _ in 0..100 {
                        counts.add(&[1, 2]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counts.snapshot(), vec![400, 800]);
    }

    #[test]
    #[should_panic(expected = "bucket count mismatch")]
    fn test_table_counts_rejects_wrong_width() {
        TableCounts::new(2).add(&[1]);
    }

    #[test]
    fn test_stall_detection() {
        let mut stats = GenerationStats::new();
        stats.record_acquire(
            SlotAcquire { pass: 2, fence_before: 1, fence_after: 1 },
            Duration::ZERO,
        );
        stats.record_acquire(
            SlotAcquire { pass: 3, fence_before: 1, fence_after: 2 },
            Duration::from_millis(3),
        );

        assert_eq!(stats.stalls(), 1);
        assert_eq!(stats.acquires().len(), 2);
        assert_eq!(stats.slot_waits().len(), 2);
    }

    #[test]
    fn test_summary_counts_passes() {
        let mut stats = GenerationStats::new();
        stats.record_pass(Duration::from_millis(5));
        stats.record_pass(Duration::from_millis(7));
        stats.record_issue(Duration::from_micros(20));

        let summary = stats.summary();
        assert_eq!(summary.passes, 2);
        assert_eq!(summary.issue_time.count, 1);
        assert_eq!(summary.stalled_acquires, 0);
    }
}
