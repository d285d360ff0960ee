//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! A configuration file mirrors the three sections below; every key is
//! optional and CLI flags override file values:
//!
//! ```toml
//! [generation]
//! k = 32
//! num_buckets = 256
//! threads = 16
//! plot_id = "0x00112233..."
//!
//! [output]
//! dir = "/mnt/plot/tmp"
//!
//! [runtime]
//! table_wait_secs = 600
//! verify = false
//! ```

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::f1::layout::{DEFAULT_EXTRA_BITS, DEFAULT_K, DEFAULT_SLICE_MULTIPLIER};
use crate::f1::F1Params;
use crate::keystream::PlotId;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// What to generate and with how many workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Plot id as 64 hex characters; random when absent
    pub plot_id: Option<String>,
    /// Label width (32 for real plots)
    #[serde(default = "default_k")]
    pub k: u32,
    /// Destination buckets (power of two)
    #[serde(default = "default_num_buckets")]
    pub num_buckets: u32,
    /// Index bits mixed into each label
    #[serde(default = "default_extra_bits")]
    pub extra_bits: u32,
    /// Worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Headroom over the mean bucket size per pass
    #[serde(default = "default_slice_multiplier")]
    pub slice_multiplier: f64,
    /// Storage block size override in bytes (detected when absent)
    pub block_size: Option<u64>,
    /// CPU cores to pin workers to (e.g. "0-7,16")
    pub cpu_list: Option<String>,
}

fn default_k() -> u32 {
    DEFAULT_K
}

fn default_num_buckets() -> u32 {
    256
}

fn default_extra_bits() -> u32 {
    DEFAULT_EXTRA_BITS
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_slice_multiplier() -> f64 {
    DEFAULT_SLICE_MULTIPLIER
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            plot_id: None,
            k: default_k(),
            num_buckets: default_num_buckets(),
            extra_bits: default_extra_bits(),
            threads: default_threads(),
            slice_multiplier: default_slice_multiplier(),
            block_size: None,
            cpu_list: None,
        }
    }
}

/// Report format on stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Where bucket files and reports go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving the bucket files
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Report format on stdout
    #[serde(default)]
    pub format: OutputFormat,
    /// Also write the JSON report to this file
    pub json_output: Option<PathBuf>,
    /// fsync bucket files before exiting
    #[serde(default)]
    pub sync: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: OutputFormat::default(),
            json_output: None,
            sync: false,
        }
    }
}

/// Runtime behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fail a slot-reuse wait after this many seconds (waits forever when absent)
    pub table_wait_secs: Option<u64>,
    /// Read the bucket files back and check them after generation
    #[serde(default)]
    pub verify: bool,
    /// Validate and print the plan without generating
    #[serde(default)]
    pub dry_run: bool,
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Layout parameters for the generator
    pub fn params(&self) -> F1Params {
        F1Params {
            k: self.generation.k,
            num_buckets: self.generation.num_buckets,
            extra_bits: self.generation.extra_bits,
            thread_count: self.generation.threads,
            slice_multiplier: self.generation.slice_multiplier,
        }
    }

    /// Diagnostic slot-reuse timeout
    pub fn fence_timeout(&self) -> Option<Duration> {
        self.runtime.table_wait_secs.map(Duration::from_secs)
    }

    /// Configured plot id, or a fresh random one
    pub fn plot_id(&self) -> Result<PlotId> {
        match &self.generation.plot_id {
            Some(hex) => PlotId::from_hex(hex),
            None => Ok(PlotId::random()),
        }
    }

    /// Parsed CPU list, if one is configured
    pub fn cpu_list(&self) -> Result<Option<Vec<usize>>> {
        self.generation
            .cpu_list
            .as_deref()
            .map(crate::worker::affinity::parse_cpu_list)
            .transpose()
    }
}

// Display trait implementations

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Configuration:")?;
        writeln!(f, "  Generation: {}", self.generation)?;
        writeln!(f, "  Output: {}", self.output)?;
        writeln!(f, "  Runtime: {}", self.runtime)?;
        Ok(())
    }
}

impl fmt::Display for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "k={}, buckets={}, extra_bits={}, threads={}, multiplier={}",
            self.k, self.num_buckets, self.extra_bits, self.threads, self.slice_multiplier
        )?;
        match self.block_size {
            Some(size) => write!(f, ", block_size={}", size)?,
            None => write!(f, ", block_size=auto")?,
        }
        if let Some(ref cores) = self.cpu_list {
            write!(f, ", cpus={}", cores)?;
        }
        Ok(())
    }
}

impl fmt::Display for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dir={}, format={}", self.dir.display(), self.format)?;
        if let Some(ref path) = self.json_output {
            write!(f, ", json={}", path.display())?;
        }
        if self.sync {
            write!(f, ", sync")?;
        }
        Ok(())
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_wait_secs {
            Some(secs) => write!(f, "table_wait={}s", secs)?,
            None => write!(f, "table_wait=unbounded")?,
        }
        if self.verify {
            write!(f, ", verify")?;
        }
        if self.dry_run {
            write!(f, ", dry_run")?;
        }
        Ok(())
    }
}
