//! Run metrics and instrumentation.
//!
//! Each run owns a plain [`RunMetrics`] (a run is strictly sequential).
//! A batch folds finished runs into [`BatchCounters`], whose `AtomicU64`
//! fields are shared by reference across worker threads.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::sampler::StepReport;
use crate::stats::Divergence;

// ---------------------------------------------------------------------------
// Per-run metrics
// ---------------------------------------------------------------------------

/// Counters collected by one simulation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Steps executed during burn-in.
    pub burn_in_steps: u64,
    /// Steps executed while recording.
    pub steps: u64,
    /// Strength entries removed by pruning.
    pub pruned_entries: u64,
    /// Prunes that had to keep a word's strongest sub-threshold entry.
    pub resurrections: u64,
    /// Checkpoints written to the time series.
    pub checkpoints: u64,
    /// Full-recompute audits performed.
    pub audits: u64,
    /// Audits whose divergence exceeded tolerance.
    pub audit_warnings: u64,
    /// Largest divergence any audit observed.
    pub max_divergence: f64,
}

impl RunMetrics {
    /// Fold one step's prune side effects in.
    pub fn record_step(&mut self, report: &StepReport, burning_in: bool) {
        if burning_in {
            self.burn_in_steps += 1;
        } else {
            self.steps += 1;
        }
        self.pruned_entries += report.prune.removed as u64;
        if report.prune.resurrected {
            self.resurrections += 1;
        }
    }

    /// Fold one audit result in.
    pub fn record_audit(&mut self, divergence: &Divergence, tolerance: f64) {
        self.audits += 1;
        self.max_divergence = self.max_divergence.max(divergence.max());
        if divergence.max() > tolerance {
            self.audit_warnings += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Batch counters (lock-free)
// ---------------------------------------------------------------------------

/// Aggregate counters for a batch of runs, updated from worker threads.
pub struct BatchCounters {
    /// Runs that completed and wrote artifacts.
    pub runs_completed: AtomicU64,
    /// Runs that failed.
    pub runs_failed: AtomicU64,
    /// Steps across all runs, burn-in included.
    pub steps: AtomicU64,
    /// Entries pruned across all runs.
    pub pruned_entries: AtomicU64,
    /// Resurrections across all runs.
    pub resurrections: AtomicU64,
    /// Audit warnings across all runs.
    pub audit_warnings: AtomicU64,
}

impl BatchCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            steps: AtomicU64::new(0),
            pruned_entries: AtomicU64::new(0),
            resurrections: AtomicU64::new(0),
            audit_warnings: AtomicU64::new(0),
        }
    }

    /// Fold a successful run in.
    pub fn record_run(&self, metrics: &RunMetrics) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.steps
            .fetch_add(metrics.burn_in_steps + metrics.steps, Ordering::Relaxed);
        self.pruned_entries
            .fetch_add(metrics.pruned_entries, Ordering::Relaxed);
        self.resurrections
            .fetch_add(metrics.resurrections, Ordering::Relaxed);
        self.audit_warnings
            .fetch_add(metrics.audit_warnings, Ordering::Relaxed);
    }

    /// Count a failed run.
    pub fn record_failure(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
            pruned_entries: self.pruned_entries.load(Ordering::Relaxed),
            resurrections: self.resurrections.load(Ordering::Relaxed),
            audit_warnings: self.audit_warnings.load(Ordering::Relaxed),
        }
    }
}

impl Default for BatchCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    /// Completed runs.
    pub runs_completed: u64,
    /// Failed runs.
    pub runs_failed: u64,
    /// Total steps.
    pub steps: u64,
    /// Total pruned entries.
    pub pruned_entries: u64,
    /// Total resurrections.
    pub resurrections: u64,
    /// Total audit warnings.
    pub audit_warnings: u64,
}

impl BatchSnapshot {
    /// One-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "runs={}/{} steps={} pruned={} resurrections={} audit_warnings={}",
            self.runs_completed,
            self.runs_completed + self.runs_failed,
            self.steps,
            self.pruned_entries,
            self.resurrections,
            self.audit_warnings,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracing span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing` spans.
pub mod spans {
    /// One complete run.
    pub const RUN: &str = "exmem::run";
    /// Burn-in phase.
    pub const BURN_IN: &str = "exmem::burn_in";
    /// Recording phase.
    pub const RECORD: &str = "exmem::record";
    /// Artifact writing.
    pub const PERSIST: &str = "exmem::persist";
    /// Whole batch.
    pub const BATCH: &str = "exmem::batch";
}
