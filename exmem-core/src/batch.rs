//! Independent runs in parallel.
//!
//! Runs share nothing mutable: each owns its population, RNG and tracker,
//! and only reads the common corpus. Within a run execution is strictly
//! sequential (every step depends on the state the previous one left), so
//! parallelism exists only across runs. A failed run writes nothing and
//! does not stop the others.
//!
//! A decay sweep repeats the whole batch once per lifetime, tagging each
//! batch's artifacts with `_decay_{lifetime}`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::config::{BatchConfig, SimulationConfig};
use crate::corpus::Corpus;
use crate::decay::DecaySchedule;
use crate::error::{ExmemError, Result};
use crate::metrics::{BatchCounters, BatchSnapshot, spans};
use crate::output::{ArtifactPaths, RunManifest, time_series_csv, write_artifacts};
use crate::simulation::{RunOutput, Simulation};

/// One run of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSpec {
    /// Position within the batch; names the artifacts.
    pub index: usize,
    /// RNG seed.
    pub seed: u64,
}

/// Expand a batch into run specs: run `n` is seeded `base_seed + n`.
#[must_use]
pub fn plan_runs(batch: &BatchConfig) -> Vec<RunSpec> {
    (0..batch.runs)
        .map(|index| RunSpec {
            index,
            seed: batch.base_seed.wrapping_add(index as u64),
        })
        .collect()
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The run.
    pub spec: RunSpec,
    /// Where its artifacts went.
    pub paths: ArtifactPaths,
    /// Wall-clock seconds spent.
    pub elapsed_secs: f64,
}

/// Outcome of a whole batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Suffix carried by this batch's artifact names.
    pub suffix: String,
    /// Runs that finished and wrote artifacts.
    pub completed: Vec<RunSummary>,
    /// Runs that failed, with the reason.
    pub failed: Vec<(RunSpec, String)>,
    /// Aggregate counters.
    pub counters: BatchSnapshot,
}

impl BatchReport {
    /// Whether every run succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run, then persist, a single simulation. Artifact names carry `suffix`.
///
/// # Errors
/// Returns the first simulation or I/O error; nothing is written unless
/// the simulation finished, and a failed write leaves no artifact behind.
pub fn run_one(
    corpus: &Corpus,
    corpus_path: &Path,
    simulation: &SimulationConfig,
    spec: RunSpec,
    output_dir: &Path,
    suffix: &str,
) -> Result<(RunOutput, RunManifest)> {
    let _span = info_span!(spans::RUN, run = spec.index, seed = spec.seed).entered();
    let started_at = Utc::now();

    let mut sim = Simulation::load(corpus, simulation.clone(), spec.seed)?;
    let decay_rate = sim.decay_rate();
    sim.execute()?;
    let output = sim.finish()?;

    let manifest = RunManifest {
        run_id: Uuid::new_v4(),
        run_index: spec.index,
        seed: spec.seed,
        corpus: corpus_path.to_path_buf(),
        simulation: simulation.clone(),
        decay_rate,
        started_at,
        finished_at: Utc::now(),
        metrics: output.metrics,
    };

    let final_json = output.final_corpus.to_json_string()?;
    let csv = time_series_csv(simulation.bin_scheme, &output.time_series)?;
    let manifest_json = serde_json::to_string_pretty(&manifest)?;

    let _persist = info_span!(spans::PERSIST).entered();
    let paths = ArtifactPaths::for_run(output_dir, spec.index, suffix);
    write_artifacts(&[
        (paths.final_data.as_path(), final_json.as_str()),
        (paths.averages.as_path(), csv.as_str()),
        (paths.manifest.as_path(), manifest_json.as_str()),
    ])?;

    Ok((output, manifest))
}

/// Execute every run of a batch in parallel.
///
/// `threads = 0` uses rayon's global pool; otherwise a dedicated pool of
/// that size is built.
///
/// # Errors
/// Returns an error only if the output directory or the thread pool cannot
/// be created. Individual run failures are reported in [`BatchReport`].
pub fn run_batch(
    corpus: &Corpus,
    simulation: &SimulationConfig,
    batch: &BatchConfig,
) -> Result<BatchReport> {
    simulation.validate()?;
    batch.validate()?;
    std::fs::create_dir_all(&batch.output_dir)?;

    let specs = plan_runs(batch);
    let counters = BatchCounters::new();
    let corpus_path: PathBuf = batch.corpus.clone();
    let suffix = batch.output_suffix.as_str();
    let _span = info_span!(
        spans::BATCH,
        runs = specs.len(),
        threads = batch.threads,
        suffix
    )
    .entered();

    let execute = || -> Vec<(RunSpec, Result<RunSummary>)> {
        specs
            .par_iter()
            .map(|&spec| {
                let started = Instant::now();
                let result =
                    run_one(corpus, &corpus_path, simulation, spec, &batch.output_dir, suffix)
                        .map(|(output, _)| {
                            counters.record_run(&output.metrics);
                            RunSummary {
                                spec,
                                paths: ArtifactPaths::for_run(&batch.output_dir, spec.index, suffix),
                                elapsed_secs: started.elapsed().as_secs_f64(),
                            }
                        });
                match &result {
                    Ok(summary) => info!(
                        run = spec.index,
                        secs = summary.elapsed_secs,
                        "run complete"
                    ),
                    Err(e) => {
                        counters.record_failure();
                        error!(run = spec.index, error = %e, "run failed");
                    }
                }
                (spec, result)
            })
            .collect()
    };

    let results = if batch.threads == 0 {
        execute()
    } else {
        rayon::ThreadPoolBuilder::new()
            .num_threads(batch.threads)
            .build()
            .map_err(|e| ExmemError::Config(format!("cannot build thread pool: {e}")))?
            .install(execute)
    };

    let mut report = BatchReport {
        suffix: batch.output_suffix.clone(),
        ..BatchReport::default()
    };
    for (spec, result) in results {
        match result {
            Ok(summary) => report.completed.push(summary),
            Err(e) => report.failed.push((spec, e.to_string())),
        }
    }
    report.counters = counters.snapshot();
    info!(summary = %report.counters.summary(), "batch complete");
    Ok(report)
}

/// Run the batch once per lifetime in `batch.decay_sweep`, in order.
///
/// Batch `k` uses `DecaySchedule::Lifetime { steps: sweep[k] }` and the
/// suffix `{output_suffix}_decay_{steps}`. An empty sweep runs nothing.
///
/// # Errors
/// Returns the first error that stops a whole batch.
pub fn run_sweep(
    corpus: &Corpus,
    simulation: &SimulationConfig,
    batch: &BatchConfig,
) -> Result<Vec<(f64, BatchReport)>> {
    if !batch.decay_sweep.is_empty() && !simulation.model.decays() {
        return Err(ExmemError::Config(format!(
            "a decay sweep needs the decay model, not {}",
            simulation.model
        )));
    }
    batch
        .decay_sweep
        .iter()
        .map(|&steps| {
            let swept = SimulationConfig {
                decay: DecaySchedule::Lifetime { steps },
                ..simulation.clone()
            };
            let single = BatchConfig {
                output_suffix: format!("{}_decay_{steps}", batch.output_suffix),
                decay_sweep: Vec::new(),
                ..batch.clone()
            };
            info!(lifetime = steps, suffix = %single.output_suffix, "sweep point");
            run_batch(corpus, &swept, &single).map(|report| (steps, report))
        })
        .collect()
}
