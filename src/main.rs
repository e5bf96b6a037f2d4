//! # Sync Benchmark Suite - Main Entry Point
//!
//! Launches a process group, runs the selected benchmark program on every
//! rank and prints the report produced by the reporting rank.
//!
//! ## Flow
//!
//! 1. **Parse arguments** and install logging (stderr, optional log file)
//! 2. **Validate configuration** before any rank starts, so every rank runs
//!    with the same settings
//! 3. **Run the group**: one `BenchmarkRunner::run` per rank
//! 4. **Report**: per-rank details at higher verbosity, the fixed-width
//!    report on stdout, and optionally a JSON results file
//!
//! ## Error Handling
//!
//! Any rank failure is fatal for the whole group; the root cause is logged
//! and returned, which makes the process exit non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use sync_bench::{
    benchmark::{BenchmarkConfig, BenchmarkRunner, RankOutput},
    cli::{Args, Verbosity},
    group::{LaunchOptions, ThreadGroup},
    logging::init_logging,
    results::{RankInfo, ReportFormatter, ResultsManager},
};
use tracing::{error, info};

fn main() -> Result<()> {
    let args = Args::parse();

    // Held until exit so the file appender flushes.
    let _log_guard = init_logging(args.quiet, args.log_file.as_deref())?;

    info!("Starting Sync Benchmark Suite");
    info!("Configuration: {:?}", args);

    let config = BenchmarkConfig::from_args(&args).context("Invalid benchmark configuration")?;
    info!("{}", config);

    let outputs = match run_group(&config) {
        Ok(outputs) => outputs,
        Err(e) => {
            error!("Benchmark failed: {:#}", e);
            return Err(e);
        }
    };

    print_outputs(&config, &outputs, args.output_file.as_deref())?;

    info!("Sync Benchmark Suite completed successfully");
    Ok(())
}

/// Run the configured program on every rank of a fresh group.
fn run_group(config: &BenchmarkConfig) -> Result<Vec<RankOutput>> {
    let runner = BenchmarkRunner::new(config.clone());
    let options = LaunchOptions {
        pin_cores: config.pin_cores,
    };
    ThreadGroup::launch(config.ranks, options, |member| Ok(runner.run(member)?))
}

/// Print verbose details and the report, then write the JSON results file.
fn print_outputs(
    config: &BenchmarkConfig,
    outputs: &[RankOutput],
    output_file: Option<&std::path::Path>,
) -> Result<()> {
    let report = outputs
        .iter()
        .find_map(|output| output.report.as_ref())
        .context("Reporting rank produced no report")?;
    let ranks: Vec<RankInfo> = outputs.iter().map(|output| output.info.clone()).collect();

    let stdout = std::io::stdout();
    let mut formatter = ReportFormatter::new(stdout.lock());

    if config.verbosity >= Verbosity::RankInfo {
        formatter.write_rank_info(&ranks)?;
    }
    if config.verbosity >= Verbosity::Samples {
        for output in outputs {
            if let Some(samples) = &output.samples {
                formatter.write_samples(output.info.rank, output.info.size, samples)?;
            }
        }
    }
    formatter.write_report(report)?;
    formatter.into_inner().flush()?;

    if let Some(path) = output_file {
        let metadata = ResultsManager::new(path).write(config, report, &ranks)?;
        info!("Run {} recorded in {:?}", metadata.run_id, path);
    }
    Ok(())
}
