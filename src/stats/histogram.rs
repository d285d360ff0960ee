//! Duration histogram using HdrHistogram
//!
//! Wraps the HdrHistogram library for tracking pass times and fence stalls
//! with high precision and constant-time recording.
//!
//! # Example
//!
//! ```
//! use f1plot::stats::histogram::DurationHistogram;
//! use std::time::Duration;
//!
//! let mut hist = DurationHistogram::new();
//!
//! hist.record(Duration::from_millis(100));
//! hist.record(Duration::from_millis(150));
//! hist.record(Duration::from_millis(200));
//!
//! let p50 = hist.percentile(50.0);
//! let max = hist.max();
//!
//! println!("p50: {:?}, max: {:?}", p50, max);
//! ```

use crate::Result;
use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::Duration;

/// Largest trackable value: 1 hour in nanoseconds
const MAX_TRACKABLE_NANOS: u64 = 3_600_000_000_000;

/// Duration histogram wrapper
///
/// Tracks durations from 1 nanosecond to 1 hour with 3 significant digits
/// of precision. Values outside the range are clamped.
#[derive(Debug, Clone)]
pub struct DurationHistogram {
    histogram: Histogram<u64>,
    total: Duration,
}

impl DurationHistogram {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKABLE_NANOS, 3)
            .expect("Failed to create histogram with valid bounds");

        Self {
            histogram,
            total: Duration::ZERO,
        }
    }

    /// Record one sample
    #[inline]
    pub fn record(&mut self, value: Duration) {
        let nanos = value.as_nanos().min(MAX_TRACKABLE_NANOS as u128) as u64;
        let _ = self.histogram.record(nanos.max(1));
        self.total += value;
    }

    /// Value at `percentile` (0.0 - 100.0), or None if empty
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.value_at_percentile(percentile)))
    }

    pub fn min(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.min()))
    }

    pub fn max(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.max()))
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.mean() as u64))
    }

    /// Exact sum of every recorded sample
    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.len() == 0
    }

    /// Merge another histogram into this one
    pub fn merge(&mut self, other: &DurationHistogram) -> Result<()> {
        self.histogram
            .add(&other.histogram)
            .map_err(|e| anyhow::anyhow!("Failed to merge histograms: {}", e))?;
        self.total += other.total;
        Ok(())
    }

    /// Serializable summary in microseconds
    pub fn summary(&self) -> HistogramSummary {
        let us = |d: Option<Duration>| d.map(|d| d.as_micros() as u64).unwrap_or(0);

        HistogramSummary {
            count: self.len(),
            total_us: self.total.as_micros() as u64,
            min_us: us(self.min()),
            mean_us: us(self.mean()),
            p50_us: us(self.percentile(50.0)),
            p99_us: us(self.percentile(99.0)),
            max_us: us(self.max()),
        }
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time histogram summary for reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub total_us: u64,
    pub min_us: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_histogram() {
        let hist = DurationHistogram::new();
        assert_eq!(hist.len(), 0);
        assert!(hist.is_empty());
        assert!(hist.percentile(50.0).is_none());
        assert_eq!(hist.total(), Duration::ZERO);
    }

    #[test]
    fn test_percentile() {
        let mut hist = DurationHistogram::new();
        for i in 1..=100 {
            hist.record(Duration::from_micros(i * 10));
        }

        let p50 = hist.percentile(50.0).unwrap();
        let p99 = hist.percentile(99.0).unwrap();

        assert!(p50.as_micros() >= 450 && p50.as_micros() <= 550);
        assert!(p99.as_micros() >= 940 && p99.as_micros() <= 1040);
    }

    #[test]
    fn test_min_max_total() {
        let mut hist = DurationHistogram::new();
        hist.record(Duration::from_micros(100));
        hist.record(Duration::from_micros(500));
        hist.record(Duration::from_micros(200));

        let min = hist.min().unwrap();
        let max = hist.max().unwrap();
        assert!(min.as_micros() >= 95 && min.as_micros() <= 105);
        assert!(max.as_micros() >= 495 && max.as_micros() <= 505);
        assert_eq!(hist.total(), Duration::from_micros(800));
    }

    #[test]
    fn test_zero_duration_is_recorded() {
        let mut hist = DurationHistogram::new();
        hist.record(Duration::ZERO);
        assert_eq!(hist.len(), 1);
    }

    #[test]
    fn test_merge() {
        let mut hist1 = DurationHistogram::new();
        hist1.record(Duration::from_micros(100));

        let mut hist2 = DurationHistogram::new();
        hist2.record(Duration::from_micros(300));

        hist1.merge(&hist2).unwrap();
        assert_eq!(hist1.len(), 2);
        assert_eq!(hist1.total(), Duration::from_micros(400));
    }

    #[test]
    fn test_summary() {
        let mut hist = DurationHistogram::new();
        hist.record(Duration::from_millis(2));
        hist.record(Duration::from_millis(4));

        let summary = hist.summary();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.total_us, 6000);
        assert!(summary.max_us >= 3990 && summary.max_us <= 4010);
        assert_eq!(DurationHistogram::new().summary(), HistogramSummary::default());
    }
}
