//! Simulation driver — burn-in, the recorded step loop, checkpoints.
//!
//! ```text
//! ┌─────────┐  burn_in()  ┌────────────┐        ┌─────────┐  run()  ┌──────┐
//! │ Loading │────────────▶│ BurningIn  │───────▶│ Running │────────▶│ Done │
//! └─────────┘             └────────────┘        └─────────┘         └──────┘
//!      │                     (optional)              ▲
//!      └─────────────────────────────────────────────┘
//! ```
//!
//! Group statistics are seeded by a full recomputation the moment the
//! driver enters `Running`. Checkpoint 0 is that seeded state; afterwards a
//! checkpoint is recorded after step index `i` (0-based) whenever
//! `i % save_every == 0`.
//!
//! Under the decay model the mass a step prunes is forgotten by the tracker
//! before the step's update. The overwrite model never decays or prunes; its
//! burn-in is empty and each step swaps one value at a fixed count.
//!
//! With [`VarianceBaseline::Initial`] every recorded variance is reported
//! relative to the seeded checkpoint.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, info_span, warn};

use crate::config::SimulationConfig;
use crate::corpus::Corpus;
use crate::decay;
use crate::error::{ExmemError, Result};
use crate::metrics::{RunMetrics, spans};
use crate::population::Population;
use crate::sampler::{ModelKind, PopulationSampler, StepReport};
use crate::stats::{GroupSnapshot, GroupTracker, VarianceBaseline};
use crate::types::StepOutcome;

/// Lifecycle phase of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Population built, nothing executed yet.
    Loading,
    /// Unrecorded steps to reach a steady age distribution.
    BurningIn,
    /// Recorded steps with incremental statistics.
    Running,
    /// Iterations exhausted.
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading"),
            Self::BurningIn => write!(f, "BurningIn"),
            Self::Running => write!(f, "Running"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// One recorded row of the time series.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    /// Recorded steps completed when the row was taken.
    pub step: u64,
    /// Per-group statistics.
    pub groups: Vec<GroupSnapshot>,
}

/// Everything a finished run hands to persistence.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Recorded checkpoints in order.
    pub time_series: Vec<Checkpoint>,
    /// Final stores, in corpus form.
    pub final_corpus: Corpus,
    /// Counters collected during the run.
    pub metrics: RunMetrics,
}

/// A single deterministic run.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    decay_rate: f64,
    population: Population,
    sampler: PopulationSampler,
    tracker: Option<GroupTracker>,
    baseline: Vec<f64>,
    phase: Phase,
    rng: StdRng,
    completed: u64,
    time_series: Vec<Checkpoint>,
    metrics: RunMetrics,
}

impl Simulation {
    /// Build the population and sampler from a corpus.
    ///
    /// # Errors
    /// Returns an error if the configuration or corpus is invalid.
    pub fn load(corpus: &Corpus, config: SimulationConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        let decay_rate = config.decay_rate()?;
        let population = Population::from_corpus(corpus, config.bin_scheme)?;
        if config.model == ModelKind::Overwrite {
            if let Some(word) = population.first_weighted_store() {
                return Err(ExmemError::MalformedCorpus {
                    word: word.to_string(),
                    reason: "the overwrite model needs every strength to be 1".into(),
                });
            }
        }
        let sampler = PopulationSampler::new(&population)?;

        info!(
            model = %config.model,
            words = population.len(),
            decay_rate,
            scheme = %config.bin_scheme,
            form = %config.variance_form,
            seed,
            "simulation loaded"
        );

        Ok(Self {
            config,
            decay_rate,
            population,
            sampler,
            tracker: None,
            baseline: Vec::new(),
            phase: Phase::Loading,
            rng: StdRng::seed_from_u64(seed),
            completed: 0,
            time_series: Vec::new(),
            metrics: RunMetrics::default(),
        })
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Resolved per-step decay factor.
    #[must_use]
    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    /// The live population.
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// The incremental tracker, once seeded.
    #[must_use]
    pub fn tracker(&self) -> Option<&GroupTracker> {
        self.tracker.as_ref()
    }

    /// Checkpoints recorded so far.
    #[must_use]
    pub fn time_series(&self) -> &[Checkpoint] {
        &self.time_series
    }

    /// Counters so far.
    #[must_use]
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Recorded steps completed.
    #[must_use]
    pub fn completed_steps(&self) -> u64 {
        self.completed
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ExmemError::InvalidPhase {
                expected: expected.to_string(),
                actual: self.phase.to_string(),
            })
        }
    }

    fn raw_step(&mut self) -> Result<StepReport> {
        match self.config.model {
            ModelKind::Decay => self.sampler.step(
                &mut self.population,
                &mut self.rng,
                self.decay_rate,
                self.config.advancement,
            ),
            ModelKind::Overwrite => self.sampler.step_overwrite(
                &mut self.population,
                &mut self.rng,
                self.config.advancement,
            ),
        }
    }

    /// Run the unrecorded burn-in (`Loading → BurningIn`). Burn-in steps
    /// resample without advancement. The overwrite model has no strengths
    /// to age, so its burn-in is empty.
    ///
    /// # Errors
    /// Returns [`ExmemError::InvalidPhase`] outside `Loading`, or a step error.
    pub fn burn_in(&mut self) -> Result<u64> {
        self.expect_phase(Phase::Loading)?;
        if !self.config.model.decays() {
            self.phase = Phase::BurningIn;
            debug!("burn-in skipped for the overwrite model");
            return Ok(0);
        }
        let iterations = decay::burn_in_iterations(self.decay_rate)?;
        let _span = info_span!(spans::BURN_IN, iterations).entered();

        self.phase = Phase::BurningIn;
        info!(iterations, "burn-in started");
        for _ in 0..iterations {
            let report = self
                .sampler
                .step(&mut self.population, &mut self.rng, self.decay_rate, 0.0)?;
            self.metrics.record_step(&report, true);
        }
        info!(
            entries = self.population.entry_count(),
            "burn-in complete"
        );
        Ok(iterations)
    }

    /// Seed statistics and enter `Running`, from `Loading` (no burn-in)
    /// or `BurningIn`.
    ///
    /// # Errors
    /// Returns [`ExmemError::InvalidPhase`] from any other phase.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.phase, Phase::Loading | Phase::BurningIn) {
            return Err(ExmemError::InvalidPhase {
                expected: "Loading or BurningIn".into(),
                actual: self.phase.to_string(),
            });
        }
        if let Some(word) = self.population.first_empty_store() {
            return Err(ExmemError::EmptyStore {
                word: word.to_string(),
            });
        }

        let tracker = GroupTracker::recompute(&self.population, self.config.variance_form);
        let seeded = tracker.snapshot();
        if self.config.variance_baseline == VarianceBaseline::Initial {
            self.baseline = seeded.iter().map(|g| g.variance).collect();
        }
        self.time_series.push(Checkpoint {
            step: 0,
            groups: relative_to(seeded, &self.baseline),
        });
        self.metrics.checkpoints += 1;
        self.tracker = Some(tracker);
        self.phase = Phase::Running;
        info!("recording started");
        Ok(())
    }

    /// Execute one recorded step and update statistics.
    ///
    /// # Errors
    /// Returns [`ExmemError::InvalidPhase`] outside `Running`, or a step or
    /// tracker error.
    pub fn step(&mut self) -> Result<StepOutcome> {
        self.expect_phase(Phase::Running)?;
        let report = self.raw_step()?;
        let outcome = report.outcome;
        self.metrics.record_step(&report, false);

        let tracker = self.tracker.as_mut().ok_or_else(|| ExmemError::InvalidPhase {
            expected: "seeded tracker".into(),
            actual: self.phase.to_string(),
        })?;
        match report.replaced {
            Some(old) => tracker.replace(outcome.group, old, outcome.value)?,
            None => {
                tracker.forget(outcome.group, report.prune.mass)?;
                tracker.update(outcome.group, outcome.value, self.decay_rate)?;
            }
        }

        let index = self.completed;
        self.completed += 1;

        if index % self.config.save_every == 0 {
            self.time_series.push(Checkpoint {
                step: self.completed,
                groups: relative_to(tracker.snapshot(), &self.baseline),
            });
            self.metrics.checkpoints += 1;
            debug!(step = self.completed, "checkpoint");
        }

        if self.config.audit_every > 0 && self.completed % self.config.audit_every == 0 {
            self.audit();
        }

        if self.completed >= self.config.iterations {
            self.phase = Phase::Done;
        }
        Ok(outcome)
    }

    /// Compare the incremental tracker with a full recomputation. Logs a
    /// warning above tolerance; never modifies the tracker.
    pub fn audit(&mut self) -> Option<f64> {
        let tracker = self.tracker.as_ref()?;
        let reference = GroupTracker::recompute(&self.population, tracker.form());
        let divergence = tracker.divergence(&reference);
        self.metrics
            .record_audit(&divergence, self.config.audit_tolerance);
        if divergence.max() > self.config.audit_tolerance {
            warn!(
                step = self.completed,
                group = divergence.worst_group,
                mean_error = divergence.mean,
                variance_error = divergence.variance,
                "incremental statistics diverged from recomputation"
            );
        }
        Some(divergence.max())
    }

    /// Execute the remaining recorded steps (`Running → Done`).
    ///
    /// # Errors
    /// Returns [`ExmemError::InvalidPhase`] unless `Running` (or `Done`
    /// with nothing left), or the first step error.
    pub fn run(&mut self) -> Result<()> {
        if self.phase == Phase::Running && self.completed >= self.config.iterations {
            self.phase = Phase::Done;
        }
        if self.phase == Phase::Done {
            return Ok(());
        }
        self.expect_phase(Phase::Running)?;
        let _span = info_span!(spans::RECORD, iterations = self.config.iterations).entered();
        while self.phase == Phase::Running {
            self.step()?;
        }
        info!(
            steps = self.completed,
            checkpoints = self.time_series.len(),
            "recording complete"
        );
        Ok(())
    }

    /// Drive every phase: optional burn-in, seeding, all iterations.
    ///
    /// # Errors
    /// Returns the first error of any phase.
    pub fn execute(&mut self) -> Result<()> {
        if self.config.burn_in {
            self.burn_in()?;
        }
        self.start()?;
        self.run()
    }

    /// Consume a finished run.
    ///
    /// # Errors
    /// Returns [`ExmemError::InvalidPhase`] unless `Done`.
    pub fn finish(self) -> Result<RunOutput> {
        self.expect_phase(Phase::Done)?;
        Ok(RunOutput {
            final_corpus: self.population.to_corpus(),
            time_series: self.time_series,
            metrics: self.metrics,
        })
    }
}

/// Subtract per-group baseline variances; an empty baseline reports
/// absolute values.
fn relative_to(mut groups: Vec<GroupSnapshot>, baseline: &[f64]) -> Vec<GroupSnapshot> {
    for (group, base) in groups.iter_mut().zip(baseline) {
        group.variance -= base;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decay::DecaySchedule;

    fn two_words() -> Corpus {
        Corpus::from_json_str(
            r#"{"a": {"frequency": 1, "exemplars": {"1.0": [1.0]}},
                "b": {"frequency": 7, "exemplars": {"2.0": [1.0]}}}"#,
        )
        .expect("valid corpus")
    }

    fn config(iterations: u64, save_every: u64, burn_in: bool) -> SimulationConfig {
        SimulationConfig {
            decay: DecaySchedule::Rate { rate: 0.9 },
            advancement: 0.0,
            iterations,
            save_every,
            burn_in,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let mut sim = Simulation::load(&two_words(), config(3, 1, true), 1).expect("loads");
        assert_eq!(sim.phase(), Phase::Loading);
        assert!(sim.step().is_err());

        let n = sim.burn_in().expect("burn-in");
        assert_eq!(n, 132);
        assert_eq!(sim.phase(), Phase::BurningIn);
        assert!(sim.burn_in().is_err());

        sim.start().expect("start");
        assert_eq!(sim.phase(), Phase::Running);
        sim.run().expect("run");
        assert_eq!(sim.phase(), Phase::Done);
        assert_eq!(sim.metrics().burn_in_steps, 132);
        assert_eq!(sim.metrics().steps, 3);
    }

    #[test]
    fn finish_requires_done() {
        let sim = Simulation::load(&two_words(), config(3, 1, false), 1).expect("loads");
        assert!(matches!(sim.finish(), Err(ExmemError::InvalidPhase { .. })));
    }

    #[test]
    fn checkpoint_schedule() {
        let mut sim = Simulation::load(&two_words(), config(10, 4, false), 2).expect("loads");
        sim.execute().expect("runs");
        let steps: Vec<u64> = sim.time_series().iter().map(|c| c.step).collect();
        // Seed row, then after step indices 0, 4, 8.
        assert_eq!(steps, vec![0, 1, 5, 9]);
        assert_eq!(sim.metrics().checkpoints, 4);
    }

    #[test]
    fn zero_iterations_records_only_seed() {
        let mut sim = Simulation::load(&two_words(), config(0, 1, false), 2).expect("loads");
        sim.execute().expect("runs");
        assert_eq!(sim.phase(), Phase::Done);
        let out = sim.finish().expect("done");
        assert_eq!(out.time_series.len(), 1);
        assert_eq!(out.final_corpus, two_words());
    }

    #[test]
    fn identical_seeds_reproduce() {
        let run = |seed| {
            let mut sim =
                Simulation::load(&two_words(), config(200, 10, true), seed).expect("loads");
            sim.execute().expect("runs");
            sim.finish().expect("done")
        };
        let a = run(7);
        let b = run(7);
        assert_eq!(a.time_series, b.time_series);
        assert_eq!(a.final_corpus, b.final_corpus);
    }

    #[test]
    fn initial_baseline_zeroes_first_row() {
        let corpus = Corpus::from_json_str(
            r#"{"a": {"frequency": 1, "exemplars": [1.0, 2.0, 4.0]},
                "b": {"frequency": 7, "exemplars": [2.0, 6.0]}}"#,
        )
        .expect("valid corpus");
        let run = |baseline| {
            let mut cfg = config(40, 5, false);
            cfg.advancement = 0.3;
            cfg.variance_baseline = baseline;
            let mut sim = Simulation::load(&corpus, cfg, 9).expect("loads");
            sim.execute().expect("runs");
            sim.finish().expect("done").time_series
        };
        let absolute = run(VarianceBaseline::Absolute);
        let relative = run(VarianceBaseline::Initial);

        assert!(relative[0].groups.iter().all(|g| g.variance == 0.0));
        let seeded = &absolute[0].groups;
        for (abs, rel) in absolute.iter().zip(&relative) {
            for ((a, r), s) in abs.groups.iter().zip(&rel.groups).zip(seeded) {
                assert_eq!(a.mean, r.mean);
                assert!((a.variance - s.variance - r.variance).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn overwrite_model_keeps_counts_fixed() {
        let corpus = Corpus::from_json_str(
            r#"{"a": {"frequency": 2, "exemplars": [1.0, 2.0, 4.0]},
                "b": {"frequency": 9, "exemplars": [2.0, 6.0]}}"#,
        )
        .expect("valid corpus");
        let cfg = SimulationConfig {
            model: ModelKind::Overwrite,
            advancement: 0.1,
            audit_every: 10,
            ..config(100, 10, true)
        };
        let mut sim = Simulation::load(&corpus, cfg, 4).expect("loads");
        assert_eq!(sim.decay_rate(), 1.0);
        assert_eq!(sim.burn_in().expect("empty burn-in"), 0);
        sim.start().expect("start");
        sim.run().expect("run");

        assert_eq!(sim.population().entry_count(), 5);
        assert_eq!(sim.metrics().audit_warnings, 0);
        let last = sim.time_series().last().expect("rows");
        assert_eq!(last.groups[0].total_strength, 3.0);
        assert_eq!(last.groups[1].total_strength, 2.0);
    }

    #[test]
    fn overwrite_model_rejects_weighted_corpus() {
        let cfg = SimulationConfig {
            model: ModelKind::Overwrite,
            ..config(10, 1, false)
        };
        let corpus = Corpus::from_json_str(
            r#"{"a": {"frequency": 1, "exemplars": {"1.0": [0.5]}}}"#,
        )
        .expect("valid corpus");
        assert!(matches!(
            Simulation::load(&corpus, cfg, 1),
            Err(ExmemError::MalformedCorpus { ref word, .. }) if word == "a"
        ));
    }

    #[test]
    fn pruning_steps_keep_audit_quiet() {
        let mut cfg = config(2_000, 100, true);
        cfg.advancement = 0.1;
        cfg.audit_every = 100;
        let mut sim = Simulation::load(&two_words(), cfg, 11).expect("loads");
        sim.execute().expect("runs");
        assert!(sim.metrics().pruned_entries > 0);
        assert_eq!(sim.metrics().audits, 20);
        assert_eq!(sim.metrics().audit_warnings, 0);
    }

    #[test]
    fn audit_counts_and_stays_quiet_without_pruning() {
        let mut cfg = config(50, 10, false);
        cfg.audit_every = 10;
        let mut sim = Simulation::load(&two_words(), cfg, 3).expect("loads");
        sim.execute().expect("runs");
        assert_eq!(sim.metrics().audits, 5);
        assert_eq!(sim.metrics().audit_warnings, 0);
    }
}
