//! Read-back verification of a generated table
//!
//! Re-reads every bucket file pair and checks, against a freshly keyed
//! keystream:
//!
//! - every index `x < 2^k` appears exactly once across all buckets
//! - every entry sits in the bucket named by the top bits of its raw word
//! - every stored label equals the label recomputed from `(raw, x)`
//! - every bucket holds the number of entries the run reported
//!
//! Buckets are checked in parallel with rayon. Each entry costs one keystream
//! seek, so a full verification of a production table is slow; it is meant
//! for reduced `k` and spot checks.

use crate::engine::file::read_bucket;
use crate::engine::FileId;
use crate::f1::{F1Layout, LabelTransform};
use crate::keystream::{KeystreamGenerator, PlotId, TABLE1_DOMAIN};
use crate::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Verification outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub buckets_checked: u32,
    pub entries_checked: u64,
    /// Indices seen more than once
    pub duplicates: u64,
    /// Indices never seen
    pub missing: u64,
    /// Entries in a bucket their raw word does not select
    pub misrouted: u64,
    /// Entries whose label does not match the recomputed one
    pub bad_labels: u64,
    /// Buckets whose y and x files disagree in length
    pub torn_buckets: u32,
    /// `(bucket, expected, found)` for every bucket with an unexpected size
    pub count_mismatches: Vec<(u32, u64, u64)>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.duplicates == 0
            && self.missing == 0
            && self.misrouted == 0
            && self.bad_labels == 0
            && self.torn_buckets == 0
            && self.count_mismatches.is_empty()
    }
}

#[derive(Default)]
struct BucketResult {
    entries: u64,
    duplicates: u64,
    misrouted: u64,
    bad_labels: u64,
    torn: bool,
    count_mismatch: Option<(u32, u64, u64)>,
}

/// Verify the bucket files under `dir`
///
/// `expected_counts` is the per-bucket total reported by the run.
pub fn verify_table(
    dir: &Path,
    layout: &F1Layout,
    plot_id: &PlotId,
    expected_counts: &[u64],
) -> Result<VerificationReport> {
    if expected_counts.len() != layout.num_buckets as usize {
        anyhow::bail!(
            "expected {} bucket counts, got {}",
            layout.num_buckets,
            expected_counts.len()
        );
    }

    let transform = LabelTransform::from_layout(layout);
    let total = layout.total_entries();
    let seen: Vec<AtomicU64> = (0..total.div_ceil(64)).map(|_| AtomicU64::new(0)).collect();

    let results: Vec<BucketResult> = (0..layout.num_buckets)
        .into_par_iter()
        .map(|bucket| {
            verify_bucket(dir, bucket, &transform, plot_id, &seen, expected_counts[bucket as usize])
        })
        .collect::<Result<_>>()?;

    let mut report = VerificationReport {
        buckets_checked: layout.num_buckets,
        ..VerificationReport::default()
    };

    for result in results {
        report.entries_checked += result.entries;
        report.duplicates += result.duplicates;
        report.misrouted += result.misrouted;
        report.bad_labels += result.bad_labels;
        if result.torn {
            report.torn_buckets += 1;
        }
        if let Some(mismatch) = result.count_mismatch {
            report.count_mismatches.push(mismatch);
        }
    }

    let marked: u64 = seen.iter().map(|w| w.load(Ordering::Relaxed).count_ones() as u64).sum();
    report.missing = total - marked;

    if report.is_ok() {
        log::info!("verified {} entries in {} buckets", report.entries_checked, report.buckets_checked);
    } else {
        log::error!("verification failed: {:?}", report);
    }

    Ok(report)
}

fn verify_bucket(
    dir: &Path,
    bucket: u32,
    transform: &LabelTransform,
    plot_id: &PlotId,
    seen: &[AtomicU64],
    expected: u64,
) -> Result<BucketResult> {
    let ys = read_bucket(dir, FileId::Y, bucket)?;
    let xs = read_bucket(dir, FileId::X, bucket)?;
    let mut keystream = KeystreamGenerator::new(TABLE1_DOMAIN, plot_id);

    let mut result = BucketResult {
        entries: xs.len() as u64,
        torn: ys.len() != xs.len(),
        ..BucketResult::default()
    };

    if xs.len() as u64 != expected {
        result.count_mismatch = Some((bucket, expected, xs.len() as u64));
    }

    for (&y, &x) in ys.iter().zip(&xs) {
        let x = x as u64;
        let Some(word) = seen.get((x / 64) as usize) else {
            // Index outside the table can only come from corruption
            result.misrouted += 1;
            continue;
        };

        let bit = 1u64 << (x % 64);
        if word.fetch_or(bit, Ordering::Relaxed) & bit != 0 {
            result.duplicates += 1;
        }

        let raw = transform.narrow(keystream.word_at(x));
        if transform.bucket(raw) != bucket as usize {
            result.misrouted += 1;
        }
        if transform.label(raw, x) != y {
            result.bad_labels += 1;
        }
    }

    Ok(result)
}
