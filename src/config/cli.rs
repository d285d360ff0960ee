//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// f1plot - bounded first-table generation for proof-of-space plots
#[derive(Parser, Debug)]
#[command(name = "f1plot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory receiving the bucket files
    #[arg(value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    // === Generation Options ===
    /// Plot id (64 hex characters); random when omitted
    #[arg(long, env = "F1PLOT_PLOT_ID")]
    pub plot_id: Option<String>,

    /// Number of worker threads (default: number of CPUs)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Number of destination buckets (power of two, 2-1024)
    #[arg(short = 'b', long)]
    pub buckets: Option<u32>,

    /// Label width in bits (32 for real plots, down to 16 for testing)
    #[arg(short = 'k', long)]
    pub k: Option<u32>,

    /// Index bits mixed into each label
    #[arg(long)]
    pub extra_bits: Option<u32>,

    /// Headroom over the mean bucket size per pass
    #[arg(long)]
    pub slice_multiplier: Option<f64>,

    /// Storage block size (e.g., 4k, 64k); detected from the filesystem when omitted
    #[arg(long)]
    pub block_size: Option<String>,

    /// CPU cores to pin workers to (e.g., "0-7,16,18")
    #[arg(long)]
    pub cpu_list: Option<String>,

    // === Runtime Options ===
    /// Give up waiting for a staging buffer write after this long (e.g., 30s, 10m)
    #[arg(long)]
    pub table_wait: Option<String>,

    /// fsync bucket files before exiting
    #[arg(long)]
    pub sync: bool,

    /// Read the bucket files back and verify them after generation
    #[arg(long)]
    pub verify: bool,

    // === Output Options ===
    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    // === Configuration File ===
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Dry run - validate configuration and print the plan without generating
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary
    Text,
    /// JSON document
    Json,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.threads == Some(0) {
            anyhow::bail!("threads must be at least 1");
        }

        if let Some(buckets) = self.buckets {
            if !buckets.is_power_of_two() {
                anyhow::bail!("buckets must be a power of two, got {}", buckets);
            }
        }

        if let Some(multiplier) = self.slice_multiplier {
            if multiplier <= 0.0 {
                anyhow::bail!("slice_multiplier must be positive");
            }
        }

        Ok(())
    }
}
