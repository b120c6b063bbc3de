//! Configuration for exmem runs.
//!
//! Maps directly to `exmem.toml`:
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [simulation]
//! model = "decay"
//! decay = { kind = "lifetime", steps = 492.0 }
//! advancement = 0.1
//! iterations = 20000
//! save_every = 100
//! burn_in = true
//! bin_scheme = "two_way"
//! variance_form = "recentered"
//! variance_baseline = "absolute"
//!
//! [batch]
//! corpus = "initial_data.json"
//! output_dir = "runs"
//! runs = 10
//! threads = 6
//! base_seed = 0
//! output_suffix = ""
//! decay_sweep = []
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::bins::BinScheme;
use crate::decay::{self, DecaySchedule};
use crate::error::{ExmemError, Result};
use crate::sampler::ModelKind;
use crate::stats::{VarianceBaseline, VarianceForm};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExmemConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Parameters of every simulation run.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Fan-out of independent runs.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl ExmemConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ExmemError::Config` if the TOML is invalid or fails validation.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ExmemError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check every section.
    ///
    /// # Errors
    /// Returns `ExmemError::Config` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate()?;
        self.batch.validate()?;
        if !self.batch.decay_sweep.is_empty() && !self.simulation.model.decays() {
            return Err(ExmemError::Config(
                "batch.decay_sweep needs the decay model".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// Parameters of a single simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Memory model driving each step.
    #[serde(default)]
    pub model: ModelKind,
    /// Per-step decay factor.
    #[serde(default)]
    pub decay: DecaySchedule,
    /// Additive drift applied to a sampled value before reinsertion.
    #[serde(default = "default_advancement")]
    pub advancement: f64,
    /// Recorded steps after burn-in.
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Checkpoint cadence in steps.
    #[serde(default = "default_save_every")]
    pub save_every: u64,
    /// Run burn-in before recording.
    #[serde(default = "default_true")]
    pub burn_in: bool,
    /// Word partition for statistics.
    #[serde(default)]
    pub bin_scheme: BinScheme,
    /// Variance recursion.
    #[serde(default)]
    pub variance_form: VarianceForm,
    /// Report variances as-is or relative to the seeded state.
    #[serde(default)]
    pub variance_baseline: VarianceBaseline,
    /// Compare the tracker with a full recomputation every N steps (0 = never).
    #[serde(default)]
    pub audit_every: u64,
    /// Divergence above which an audit logs a warning.
    #[serde(default = "default_audit_tolerance")]
    pub audit_tolerance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            decay: DecaySchedule::default(),
            advancement: default_advancement(),
            iterations: default_iterations(),
            save_every: default_save_every(),
            burn_in: true,
            bin_scheme: BinScheme::default(),
            variance_form: VarianceForm::default(),
            variance_baseline: VarianceBaseline::default(),
            audit_every: 0,
            audit_tolerance: default_audit_tolerance(),
        }
    }
}

impl SimulationConfig {
    /// Resolved per-step decay factor. The overwrite model never decays.
    ///
    /// # Errors
    /// Returns `ExmemError::Config` if the schedule is invalid.
    pub fn decay_rate(&self) -> Result<f64> {
        if self.model.decays() {
            self.decay.rate()
        } else {
            Ok(1.0)
        }
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    /// Returns `ExmemError::Config` describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        let rate = self.decay_rate()?;
        if self.burn_in && self.model.decays() {
            decay::burn_in_iterations(rate)?;
        }
        if !self.advancement.is_finite() {
            return Err(ExmemError::Config(format!(
                "advancement must be finite, got {}",
                self.advancement
            )));
        }
        if self.save_every == 0 {
            return Err(ExmemError::Config("save_every must be at least 1".into()));
        }
        if !(self.audit_tolerance.is_finite() && self.audit_tolerance >= 0.0) {
            return Err(ExmemError::Config(format!(
                "audit_tolerance must be a non-negative number, got {}",
                self.audit_tolerance
            )));
        }
        Ok(())
    }
}

/// Fan-out of independent runs over one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Initial corpus (JSON).
    #[serde(default = "default_corpus")]
    pub corpus: PathBuf,
    /// Directory receiving per-run artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Number of independent runs.
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Worker threads (0 = one per core).
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Seed of run 0; run `n` uses `base_seed + n`.
    #[serde(default)]
    pub base_seed: u64,
    /// Appended to every artifact name, e.g. `averages_run3{suffix}.csv`.
    #[serde(default)]
    pub output_suffix: String,
    /// Lifetimes to sweep. Each runs the whole batch with that lifetime and
    /// `_decay_{steps}` added to the suffix. Empty = one batch as configured.
    #[serde(default)]
    pub decay_sweep: Vec<f64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            corpus: default_corpus(),
            output_dir: default_output_dir(),
            runs: default_runs(),
            threads: default_threads(),
            base_seed: 0,
            output_suffix: String::new(),
            decay_sweep: Vec::new(),
        }
    }
}

impl BatchConfig {
    /// Check batch settings.
    ///
    /// # Errors
    /// Returns `ExmemError::Config` if no runs are requested, the suffix
    /// would leave the output directory, or a swept lifetime is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.runs == 0 {
            return Err(ExmemError::Config("batch.runs must be at least 1".into()));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(ExmemError::Config(format!(
                "batch.output_suffix must not contain path separators, got {:?}",
                self.output_suffix
            )));
        }
        for &steps in &self.decay_sweep {
            DecaySchedule::Lifetime { steps }.rate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_advancement() -> f64 { 0.1 }
fn default_iterations() -> u64 { 20_000 }
fn default_save_every() -> u64 { 100 }
fn default_audit_tolerance() -> f64 { 1e-6 }
fn default_corpus() -> PathBuf { PathBuf::from("initial_data.json") }
fn default_output_dir() -> PathBuf { PathBuf::from("runs") }
fn default_runs() -> usize { 10 }
fn default_threads() -> usize { 6 }
