//! CLI to Config conversion utilities

use crate::config::cli::{Cli, ReportFormat};
use crate::config::{Config, OutputFormat};
use anyhow::{Context, Result};

/// Parse a size string (e.g., "1G", "100M", "4k") to bytes
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("k") || s.ends_with("kb") {
        (s.trim_end_matches("kb").trim_end_matches("k"), 1024u64)
    } else if s.ends_with("m") || s.ends_with("mb") {
        (s.trim_end_matches("mb").trim_end_matches("m"), 1024 * 1024)
    } else if s.ends_with("g") || s.ends_with("gb") {
        (s.trim_end_matches("gb").trim_end_matches("g"), 1024 * 1024 * 1024)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str.parse()
        .with_context(|| format!("Invalid size format: {}", s))?;

    Ok(num * multiplier)
}

/// Parse a duration string (e.g., "60s", "5m", "1h") to seconds
pub fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("s") || s.ends_with("sec") {
        (s.trim_end_matches("sec").trim_end_matches("s"), 1u64)
    } else if s.ends_with("m") || s.ends_with("min") {
        (s.trim_end_matches("min").trim_end_matches("m"), 60)
    } else if s.ends_with("h") || s.ends_with("hr") {
        (s.trim_end_matches("hr").trim_end_matches("h"), 3600)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str.parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    Ok(num * multiplier)
}

/// Convert CLI ReportFormat to config OutputFormat
pub fn convert_report_format(format: ReportFormat) -> OutputFormat {
    match format {
        ReportFormat::Text => OutputFormat::Text,
        ReportFormat::Json => OutputFormat::Json,
    }
}

/// Apply every CLI flag that was given on top of `config`
pub fn apply_cli(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(ref dir) = cli.output_dir {
        config.output.dir = dir.clone();
    }

    // Generation
    if let Some(ref plot_id) = cli.plot_id {
        config.generation.plot_id = Some(plot_id.clone());
    }
    if let Some(threads) = cli.threads {
        config.generation.threads = threads;
    }
    if let Some(buckets) = cli.buckets {
        config.generation.num_buckets = buckets;
    }
    if let Some(k) = cli.k {
        config.generation.k = k;
    }
    if let Some(extra_bits) = cli.extra_bits {
        config.generation.extra_bits = extra_bits;
    }
    if let Some(multiplier) = cli.slice_multiplier {
        config.generation.slice_multiplier = multiplier;
    }
    if let Some(ref size) = cli.block_size {
        config.generation.block_size = Some(parse_size(size)?);
    }
    if let Some(ref cores) = cli.cpu_list {
        config.generation.cpu_list = Some(cores.clone());
    }

    // Runtime
    if let Some(ref wait) = cli.table_wait {
        config.runtime.table_wait_secs = Some(parse_duration(wait)?);
    }
    if cli.verify {
        config.runtime.verify = true;
    }
    if cli.dry_run {
        config.runtime.dry_run = true;
    }
    if cli.debug {
        config.runtime.debug = true;
    }

    // Output
    if cli.sync {
        config.output.sync = true;
    }
    if let Some(format) = cli.format {
        config.output.format = convert_report_format(format);
    }
    if let Some(ref path) = cli.json_output {
        config.output.json_output = Some(path.clone());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_parse_size_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
    }

    #[test]
    fn test_parse_size_kb() {
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("4kb").unwrap(), 4096);
        assert_eq!(parse_size("4KB").unwrap(), 4096);
    }

    #[test]
    fn test_parse_size_mb() {
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("16M").unwrap(), 16 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("four").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60").unwrap(), 60);
        assert_eq!(parse_duration("60s").unwrap(), 60);
        assert_eq!(parse_duration("5min").unwrap(), 300);
        assert_eq!(parse_duration("2h").unwrap(), 7200);
    }

    #[test]
    fn test_apply_cli_overrides_only_given_flags() {
        let mut base = Config::default();
        base.generation.num_buckets = 128;
        base.generation.k = 24;

        let cli = Cli::try_parse_from(["f1plot", "/data", "-k", "20", "--block-size", "8k", "--verify"]).unwrap();
        let config = apply_cli(&cli, base).unwrap();

        assert_eq!(config.output.dir, PathBuf::from("/data"));
        assert_eq!(config.generation.k, 20);
        assert_eq!(config.generation.num_buckets, 128);
        assert_eq!(config.generation.block_size, Some(8192));
        assert!(config.runtime.verify);
        assert!(!config.runtime.dry_run);
    }

    #[test]
    fn test_apply_cli_rejects_bad_sizes() {
        let cli = Cli::try_parse_from(["f1plot", "--block-size", "big"]).unwrap();
        assert!(apply_cli(&cli, Config::default()).is_err());

        let cli = Cli::try_parse_from(["f1plot", "--table-wait", "soon"]).unwrap();
        assert!(apply_cli(&cli, Config::default()).is_err());
    }
}
