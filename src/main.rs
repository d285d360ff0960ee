//! f1plot CLI entry point

use anyhow::{Context, Result};
use f1plot::config::{cli::Cli, toml::load_config, validator::validate_config, Config, OutputFormat};
use f1plot::engine::file::FileEngine;
use f1plot::engine::FileId;
use f1plot::f1::{F1Arena, F1Generator, F1Layout, F1Options, F1Report};
use f1plot::output::{json, text};
use f1plot::queue::DiskQueue;
use f1plot::util::verification::{verify_table, VerificationReport};
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    init_logging(cli.debug);

    let config = load_config(&cli)?;
    validate_config(&config).context("Configuration validation failed")?;

    if config.output.format == OutputFormat::Text {
        println!("f1plot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        text::print_config(&config);
    }

    run(&config)
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn run(config: &Config) -> Result<()> {
    let plot_id = config.plot_id()?;
    let params = config.params();

    if config.runtime.dry_run {
        let block_size = config
            .generation
            .block_size
            .map(|b| b as usize)
            .unwrap_or(f1plot::engine::file::DEFAULT_BLOCK_SIZE);
        let layout = F1Layout::new(&params, block_size)?;
        return print_plan(config, &layout);
    }

    let engine = FileEngine::new(&config.output.dir)
        .with_block_size(config.generation.block_size.map(|b| b as usize))
        .with_sync(config.output.sync);
    let queue = DiskQueue::new(Box::new(engine), params.num_buckets)?;

    let layout = F1Layout::new(&params, queue.block_size(FileId::Y))?;
    if !layout.slot_holds_pass() {
        anyhow::bail!(
            "staging slot of {} entries cannot hold a pass of {} entries at block size {}",
            layout.slot_capacity,
            layout.entries_per_pass,
            layout.io_block_size
        );
    }
    log::debug!("layout: {:?}", layout);
    log::info!(
        "generating 2^{} entries into {} buckets under {} (plot id {})",
        layout.k,
        layout.num_buckets,
        config.output.dir.display(),
        plot_id
    );

    let mut arena = F1Arena::new(&layout);
    let options = F1Options {
        fence_timeout: config.fence_timeout(),
        cpu_list: config.cpu_list()?,
    };

    let result = F1Generator::new(&layout, plot_id)
        .with_options(options)
        .run(&queue, &mut arena);
    // Release staging memory before the engine flushes
    drop(arena);

    let shutdown = queue.shutdown();
    let report = result?;
    shutdown.context("Failed to flush bucket files")?;

    let verification = if config.runtime.verify {
        let start = Instant::now();
        let verification = verify_table(&config.output.dir, &layout, &plot_id, &report.bucket_counts)?;
        log::info!("verification finished in {:.3}s", start.elapsed().as_secs_f64());
        Some(verification)
    } else {
        None
    };

    print_report(config, &report, verification.as_ref())?;

    if let Some(verification) = verification {
        if !verification.is_ok() {
            anyhow::bail!("table verification failed");
        }
    }

    Ok(())
}

fn print_plan(config: &Config, layout: &F1Layout) -> Result<()> {
    let plan = json::JsonPlan::new(layout);

    match config.output.format {
        OutputFormat::Text => {
            text::print_plan(layout);
            println!("Dry run mode - configuration validated successfully");
        }
        OutputFormat::Json => json::print_json(&plan)?,
    }

    if let Some(ref path) = config.output.json_output {
        json::write_json_output(path, &plan, true)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(())
}

fn print_report(config: &Config, report: &F1Report, verification: Option<&VerificationReport>) -> Result<()> {
    let document = json::build_report(report, verification);

    match config.output.format {
        OutputFormat::Text => {
            text::print_report(report);
            if let Some(verification) = verification {
                text::print_verification(verification);
            }
        }
        OutputFormat::Json => json::print_json(&document)?,
    }

    if let Some(ref path) = config.output.json_output {
        json::write_json_output(path, &document, true)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("JSON report written to {}", path.display());
    }

    Ok(())
}
