//! Human-readable text output

use crate::config::Config;
use crate::f1::{F1Layout, F1Report};
use crate::stats::histogram::HistogramSummary;
use crate::util::time::{calculate_rate, format_bytes, format_duration, format_rate, format_throughput};
use crate::util::verification::VerificationReport;
use std::time::Duration;

const RULE: &str = "═══════════════════════════════════════════════════════════";

fn print_header(title: &str) {
    println!("{}", RULE);
    println!("{:^59}", title);
    println!("{}", RULE);
    println!();
}

/// Print the effective configuration before a run
pub fn print_config(config: &Config) {
    print!("{}", config);
    println!();
}

/// Print the derived layout (used for dry runs and `--debug`)
pub fn print_plan(layout: &F1Layout) {
    print_header("GENERATION PLAN");

    println!("Table:");
    println!("  k:                 {}", layout.k);
    println!("  Entries:           {}", format_number(layout.total_entries()));
    println!("  Buckets:           {} ({} bits)", layout.num_buckets, layout.bucket_bits);
    println!("  Label width:       {} bits", layout.y_bits().min(32));
    println!();

    println!("Passes:");
    println!("  Count:             {}", layout.num_buckets);
    println!("  Entries per pass:  {}", format_number(layout.entries_per_pass));
    println!("  Blocks per pass:   {}", format_number(layout.blocks_per_pass));
    println!("  Workers:           {}", layout.thread_count);
    println!("  Blocks per worker: {} max", format_number(layout.max_thread_blocks));
    println!();

    println!("Staging:");
    println!("  Block size:        {}", format_bytes(layout.io_block_size as u64));
    println!("  Slice capacity:    {} entries", format_number(layout.slice_capacity));
    println!("  Slot capacity:     {} entries", format_number(layout.slot_capacity));
    println!("  Memory:            {}", format_bytes(layout.required_memory()));
    println!();
}

/// Print the outcome of a completed run
pub fn print_report(report: &F1Report) {
    print_header("TABLE 1 GENERATED");

    println!("Plot id: {}", report.plot_id);
    println!("Engine:  {}", report.engine);
    println!("Elapsed: {:.3}s", report.elapsed.as_secs_f64());
    println!();

    let rate = calculate_rate(report.total_entries, report.elapsed);
    let throughput = calculate_rate(report.bytes_written, report.elapsed);

    println!("Entries:");
    println!("  Total:   {} ({} entries/s)", format_number(report.total_entries), format_rate(rate));
    println!("  Written: {} ({})", format_bytes(report.bytes_written), format_throughput(throughput));
    print_bucket_spread(&report.bucket_counts);
    println!();

    let summary = report.stats.summary();
    println!("Passes: {}", summary.passes);
    print_timing("Pass time", &summary.pass_time);
    print_timing("Issue time", &summary.issue_time);
    print_timing("Slot wait", &summary.slot_wait);
    println!("  Stalled slot acquisitions: {}", summary.stalled_acquires);
    println!();
}

fn print_bucket_spread(counts: &[u64]) {
    let (Some(min), Some(max)) = (counts.iter().min(), counts.iter().max()) else {
        return;
    };
    let mean = counts.iter().sum::<u64>() as f64 / counts.len() as f64;
    let spread = if mean > 0.0 {
        (*max as f64 - *min as f64) / mean * 100.0
    } else {
        0.0
    };
    println!(
        "  Buckets: min {} / max {} ({:.2}% spread)",
        format_number(*min),
        format_number(*max),
        spread
    );
}

fn print_timing(label: &str, summary: &HistogramSummary) {
    if summary.count == 0 {
        return;
    }
    let us = |v: u64| format_duration(Duration::from_micros(v));
    println!(
        "  {:<11} mean {}  p50 {}  p99 {}  max {}",
        format!("{}:", label),
        us(summary.mean_us),
        us(summary.p50_us),
        us(summary.p99_us),
        us(summary.max_us)
    );
}

/// Print read-back verification results
pub fn print_verification(report: &VerificationReport) {
    println!("Verification:");
    println!("  Buckets checked: {}", report.buckets_checked);
    println!("  Entries checked: {}", format_number(report.entries_checked));

    if report.is_ok() {
        println!("  Result:          OK");
    } else {
        println!("  Result:          FAILED");
        println!("    Missing:       {}", report.missing);
        println!("    Duplicates:    {}", report.duplicates);
        println!("    Misrouted:     {}", report.misrouted);
        println!("    Bad labels:    {}", report.bad_labels);
        println!("    Torn buckets:  {}", report.torn_buckets);
        for (bucket, expected, found) in &report.count_mismatches {
            println!("    Bucket {}: expected {} entries, found {}", bucket, expected, found);
        }
    }
    println!();
}

/// Format number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
