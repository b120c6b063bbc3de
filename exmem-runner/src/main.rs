//! `exmem-runner [CONFIG] [--runs N] [--seed S] ...` — run the batches
//! described by a TOML file (default `exmem.toml`).

use std::process::ExitCode;

use clap::Parser;
use exmem_runner::{Cli, RunPlan, execute, init_tracing, load_config};
use tracing::{error, info};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    cli.apply(&mut config)?;
    init_tracing(&config.general)?;

    let plan = RunPlan::from_config(config)?;
    let reports = execute(&plan)?;

    let mut failures = 0;
    for report in &reports {
        for (spec, reason) in &report.failed {
            error!(run = spec.index, seed = spec.seed, suffix = %report.suffix, %reason, "run failed");
        }
        failures += report.failed.len();
        info!(suffix = %report.suffix, summary = %report.counters.summary(), "batch done");
    }

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
