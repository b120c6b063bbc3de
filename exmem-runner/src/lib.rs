//! # exmem-runner — Batch Runner for exmem
//!
//! Loads a TOML run plan, reads the initial corpus it names, and fans the
//! requested number of independent simulations out across threads.
//!
//! ```text
//! exmem.toml ──▶ ExmemConfig ──┐
//!                              ├──▶ run_batch ──▶ runs/final_data_run{n}{suffix}.json
//! initial_data.json ─▶ Corpus ─┘                  runs/averages_run{n}{suffix}.csv
//!                                                 runs/manifest_run{n}{suffix}.json
//! ```
//!
//! Relative `corpus` and `output_dir` paths in the config file are resolved
//! against the directory containing it. Command-line overrides are taken
//! as given. A non-empty `decay_sweep` runs one batch per lifetime.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use exmem_core::batch::{self, BatchReport};
use exmem_core::config::GeneralConfig;
use exmem_core::{Corpus, ExmemConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG: &str = "exmem.toml";

/// Command line of `exmem-runner`.
#[derive(Debug, Clone, Parser)]
#[command(name = "exmem-runner", version, about = "Run a batch of exemplar-memory simulations")]
pub struct Cli {
    /// TOML run plan.
    #[arg(env = "EXMEM_CONFIG", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
    /// Override `batch.runs`.
    #[arg(long)]
    pub runs: Option<usize>,
    /// Override `batch.threads` (0 = one per core).
    #[arg(long)]
    pub threads: Option<usize>,
    /// Override `batch.base_seed`.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Override `batch.output_dir`.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Override `batch.output_suffix`.
    #[arg(long)]
    pub suffix: Option<String>,
    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// Apply the overrides to a loaded config and re-validate it.
    ///
    /// # Errors
    /// Returns an error if an override makes the config invalid.
    pub fn apply(&self, config: &mut ExmemConfig) -> anyhow::Result<()> {
        let batch = &mut config.batch;
        if let Some(runs) = self.runs {
            batch.runs = runs;
        }
        if let Some(threads) = self.threads {
            batch.threads = threads;
        }
        if let Some(seed) = self.seed {
            batch.base_seed = seed;
        }
        if let Some(dir) = &self.output_dir {
            batch.output_dir.clone_from(dir);
        }
        if let Some(suffix) = &self.suffix {
            batch.output_suffix.clone_from(suffix);
        }
        if self.json_logs {
            config.general.json_logs = true;
        }
        config.validate().context("applying command-line overrides")?;
        Ok(())
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Installing twice
/// is an error.
///
/// # Errors
/// Returns an error if a global subscriber is already set.
pub fn init_tracing(general: &GeneralConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&general.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if general.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install tracing subscriber: {e}"))
}

/// A parsed run plan with paths resolved.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Full configuration.
    pub config: ExmemConfig,
    /// Loaded initial corpus.
    pub corpus: Corpus,
}

impl RunPlan {
    /// Load the corpus a config names.
    ///
    /// # Errors
    /// Returns an error if the corpus is missing, malformed, or empty.
    pub fn from_config(config: ExmemConfig) -> anyhow::Result<Self> {
        let path = &config.batch.corpus;
        let corpus = Corpus::from_file(path)
            .with_context(|| format!("loading corpus {}", path.display()))?;
        if corpus.is_empty() {
            bail!("corpus {} contains no words", path.display());
        }
        info!(corpus = %path.display(), words = corpus.len(), "corpus loaded");
        Ok(Self { config, corpus })
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Read and validate the config file, resolving its relative paths.
///
/// # Errors
/// Returns an error if the file is missing, malformed, or invalid.
pub fn load_config(config_path: &Path) -> anyhow::Result<ExmemConfig> {
    let mut config = ExmemConfig::from_file(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    config.batch.corpus = resolve(base, &config.batch.corpus);
    config.batch.output_dir = resolve(base, &config.batch.output_dir);
    Ok(config)
}

/// Read the config file and the corpus it names.
///
/// # Errors
/// Returns an error if either file is missing, malformed, or invalid.
pub fn load_plan(config_path: &Path) -> anyhow::Result<RunPlan> {
    RunPlan::from_config(load_config(config_path)?)
}

/// Execute every batch of a plan: one, or one per swept lifetime.
///
/// # Errors
/// Returns an error if a batch cannot start; individual run failures are
/// reported in the returned [`BatchReport`]s.
pub fn execute(plan: &RunPlan) -> anyhow::Result<Vec<BatchReport>> {
    let batch_cfg = &plan.config.batch;
    let simulation = &plan.config.simulation;
    info!(
        corpus = %batch_cfg.corpus.display(),
        output = %batch_cfg.output_dir.display(),
        model = %simulation.model,
        words = plan.corpus.len(),
        runs = batch_cfg.runs,
        sweep = batch_cfg.decay_sweep.len(),
        "starting"
    );

    if batch_cfg.decay_sweep.is_empty() {
        let report = batch::run_batch(&plan.corpus, simulation, batch_cfg)
            .context("running batch")?;
        return Ok(vec![report]);
    }
    let reports = batch::run_sweep(&plan.corpus, simulation, batch_cfg)
        .context("running decay sweep")?;
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}
