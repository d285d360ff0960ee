//! JSON output formatting
//!
//! One document per run: the effective layout, per-bucket totals, per-pass
//! totals, timing summaries and, when requested, the verification result.

use crate::f1::{F1Layout, F1Report};
use crate::stats::StatsSummary;
use crate::util::time::{calculate_rate, format_duration, format_throughput};
use crate::util::verification::VerificationReport;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros() as u64,
            human: format_duration(d),
        }
    }
}

/// Complete run report
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub generated_at: DateTime<Utc>,
    pub plot_id: String,
    pub engine: String,
    pub layout: F1Layout,
    pub elapsed: JsonDuration,
    pub total_entries: u64,
    pub bytes_written: u64,
    pub entries_per_sec: f64,
    pub write_throughput: String,
    pub bucket_counts: Vec<u64>,
    pub pass_totals: Vec<u64>,
    pub stats: StatsSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
}

/// Layout-only document for dry runs
#[derive(Debug, Clone, Serialize)]
pub struct JsonPlan {
    pub generated_at: DateTime<Utc>,
    pub layout: F1Layout,
    pub y_bits: u32,
    pub required_memory: u64,
}

impl JsonPlan {
    pub fn new(layout: &F1Layout) -> Self {
        Self {
            generated_at: Utc::now(),
            layout: layout.clone(),
            y_bits: layout.y_bits(),
            required_memory: layout.required_memory(),
        }
    }
}

/// Build the JSON document for a completed run
pub fn build_report(report: &F1Report, verification: Option<&VerificationReport>) -> JsonReport {
    let throughput = calculate_rate(report.bytes_written, report.elapsed);

    JsonReport {
        generated_at: Utc::now(),
        plot_id: report.plot_id.to_hex(),
        engine: report.engine.to_string(),
        layout: report.layout.clone(),
        elapsed: JsonDuration::from_duration(report.elapsed),
        total_entries: report.total_entries,
        bytes_written: report.bytes_written,
        entries_per_sec: calculate_rate(report.total_entries, report.elapsed),
        write_throughput: format_throughput(throughput),
        bucket_counts: report.bucket_counts.clone(),
        pass_totals: report.pass_totals.clone(),
        stats: report.stats.summary(),
        verification: verification.cloned(),
    }
}

/// Print any serializable report to stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}

/// Write JSON output to file
pub fn write_json_output<T: Serialize>(output_path: &Path, value: &T, pretty: bool) -> Result<()> {
    let file = File::create(output_path)?;

    if pretty {
        serde_json::to_writer_pretty(file, value)?;
    } else {
        serde_json::to_writer(file, value)?;
    }

    Ok(())
}
