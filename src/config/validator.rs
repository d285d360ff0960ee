//! Configuration validation
//!
//! Everything is checked before any allocation or file is touched. Layout
//! limits are checked by building the layout with the configured (or
//! default) block size; the detected block size is checked again once the
//! output directory has been opened.

use super::*;
use crate::engine::file::DEFAULT_BLOCK_SIZE;
use crate::f1::F1Layout;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_generation(&config.generation)?;
    validate_layout(config)?;
    validate_output(&config.output)?;
    validate_runtime(&config.runtime)?;

    Ok(())
}

/// Validate generation parameters
pub fn validate_generation(generation: &GenerationConfig) -> Result<()> {
    if generation.threads == 0 {
        anyhow::bail!("threads must be at least 1");
    }

    if let Some(ref hex) = generation.plot_id {
        PlotId::from_hex(hex)?;
    }

    if let Some(ref cores) = generation.cpu_list {
        let cores = crate::worker::affinity::parse_cpu_list(cores)?;
        if cores.is_empty() {
            anyhow::bail!("cpu_list selects no cores");
        }
    }

    crate::worker::affinity::warn_if_oversubscribed(generation.threads);

    Ok(())
}

/// Validate layout limits and staging capacity
pub fn validate_layout(config: &Config) -> Result<()> {
    let block_size = config
        .generation
        .block_size
        .map(|b| b as usize)
        .unwrap_or(DEFAULT_BLOCK_SIZE);

    let layout = F1Layout::new(&config.params(), block_size)?;

    if !layout.slot_holds_pass() {
        anyhow::bail!(
            "slice_multiplier {} reserves {} entries per staging slot but a pass produces {}",
            config.generation.slice_multiplier,
            layout.slot_capacity,
            layout.entries_per_pass
        );
    }

    if layout.y_bits() > 32 {
        log::warn!(
            "labels are {} bits wide and will be truncated to their low 32 bits",
            layout.y_bits()
        );
    }

    if config.generation.slice_multiplier < 1.0 {
        log::warn!(
            "slice_multiplier {} is below 1.0; bucket regions will likely overflow",
            config.generation.slice_multiplier
        );
    }

    Ok(())
}

/// Validate output configuration
pub fn validate_output(output: &OutputConfig) -> Result<()> {
    if output.dir.as_os_str().is_empty() {
        anyhow::bail!("output directory must not be empty");
    }

    if output.dir.exists() && !output.dir.is_dir() {
        anyhow::bail!("output path {} is not a directory", output.dir.display());
    }

    if let Some(ref path) = output.json_output {
        if path.is_dir() {
            anyhow::bail!("json_output {} is a directory", path.display());
        }
    }

    Ok(())
}

/// Validate runtime configuration
pub fn validate_runtime(runtime: &RuntimeConfig) -> Result<()> {
    if runtime.table_wait_secs == Some(0) {
        anyhow::bail!("table_wait_secs must be at least 1 when set");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    fn test_config(k: u32, buckets: u32) -> Config {
        let mut config = Config::default();
        config.generation.k = k;
        config.generation.num_buckets = buckets;
        config.generation.threads = 2;
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        let mut config = Config::default();
        config.generation.threads = 1;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_bucket_count_limits() {
        assert!(validate_config(&test_config(20, 2)).is_ok());
        assert!(validate_config(&test_config(20, 1024)).is_ok());
        assert!(validate_config(&test_config(20, 1)).is_err());
        assert!(validate_config(&test_config(20, 12)).is_err());
        assert!(validate_config(&test_config(20, 2048)).is_err());
    }

    #[test]
    fn test_k_limits() {
        assert!(validate_config(&test_config(16, 4)).is_ok());
        assert!(validate_config(&test_config(15, 4)).is_err());
        assert!(validate_config(&test_config(33, 4)).is_err());
    }

    #[test]
    fn test_block_size_limits() {
        let mut config = test_config(20, 16);
        config.generation.block_size = Some(3000);
        assert!(validate_config(&config).is_err());

        config.generation.block_size = Some(32 * 1024 * 1024);
        assert!(validate_config(&config).is_err());

        config.generation.block_size = Some(512);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_undersized_multiplier_is_rejected() {
        let mut config = test_config(20, 16);
        config.generation.slice_multiplier = 0.5;
        assert!(validate_config(&config).is_err());

        config.generation.slice_multiplier = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_extra_bits_and_threads() {
        let mut config = test_config(20, 16);
        config.generation.extra_bits = 21;
        assert!(validate_config(&config).is_err());

        let mut config = test_config(20, 16);
        config.generation.threads = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_plot_id_and_cpu_list() {
        let mut config = test_config(20, 16);
        config.generation.plot_id = Some("00".repeat(31));
        assert!(validate_config(&config).is_err());

        let mut config = test_config(20, 16);
        config.generation.cpu_list = Some("3-1".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_output_paths() {
        let file = NamedTempFile::new().unwrap();
        let mut config = test_config(20, 16);
        config.output.dir = file.path().to_path_buf();
        assert!(validate_config(&config).is_err());

        let dir = TempDir::new().unwrap();
        let mut config = test_config(20, 16);
        config.output.dir = dir.path().join("not-yet-created");
        assert!(validate_config(&config).is_ok());

        config.output.json_output = Some(dir.path().to_path_buf());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_table_wait_is_rejected() {
        let mut config = test_config(20, 16);
        config.runtime.table_wait_secs = Some(0);
        assert!(validate_config(&config).is_err());
    }
}
