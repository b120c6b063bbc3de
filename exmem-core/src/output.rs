//! Run artifacts — time-series CSV, final snapshot, manifest.
//!
//! Files are rendered fully in memory first. A run's artifacts are then
//! committed together: every file is staged as a sibling temp file, and
//! only when all are staged are they renamed into place. If any write or
//! rename fails, the staged files and the already-renamed artifacts are
//! removed, so a run leaves either its full set or nothing.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bins::BinScheme;
use crate::config::SimulationConfig;
use crate::error::{ExmemError, Result};
use crate::metrics::RunMetrics;
use crate::simulation::Checkpoint;

/// Render checkpoints as CSV: `step,mean_<g>,var_<g>,...`.
///
/// # Errors
/// Returns [`ExmemError::Serialization`] if the CSV writer fails.
pub fn time_series_csv(scheme: BinScheme, series: &[Checkpoint]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut header = vec!["step".to_string()];
    for label in scheme.labels() {
        header.push(format!("mean_{label}"));
        header.push(format!("var_{label}"));
    }
    writer.write_record(&header)?;

    let mut record = Vec::with_capacity(header.len());
    for row in series {
        record.clear();
        record.push(row.step.to_string());
        for g in &row.groups {
            record.push(g.mean.to_string());
            record.push(g.variance.to_string());
        }
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExmemError::Serialization(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExmemError::Serialization(e.to_string()))
}

/// Metadata describing one finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// Index within its batch.
    pub run_index: usize,
    /// RNG seed.
    pub seed: u64,
    /// Corpus the run started from.
    pub corpus: PathBuf,
    /// Parameters used.
    pub simulation: SimulationConfig,
    /// Resolved per-step decay factor.
    pub decay_rate: f64,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock finish.
    pub finished_at: DateTime<Utc>,
    /// Counters collected.
    pub metrics: RunMetrics,
}

/// Paths of the artifacts of run `index` inside `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Final store snapshot.
    pub final_data: PathBuf,
    /// Time series.
    pub averages: PathBuf,
    /// Manifest.
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    /// Conventional names: `final_data_run{n}{suffix}.json`,
    /// `averages_run{n}{suffix}.csv`, `manifest_run{n}{suffix}.json`.
    #[must_use]
    pub fn for_run(dir: &Path, index: usize, suffix: &str) -> Self {
        Self {
            final_data: dir.join(format!("final_data_run{index}{suffix}.json")),
            averages: dir.join(format!("averages_run{index}{suffix}.csv")),
            manifest: dir.join(format!("manifest_run{index}{suffix}.json")),
        }
    }
}

fn staging_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ExmemError::Config(format!("not a file path: {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    Ok(path.with_file_name(tmp_name))
}

fn discard<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) {
    for path in paths {
        let path = path.as_ref();
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cannot remove partial artifact");
            }
        }
    }
}

/// Write every `(path, contents)` pair, all or nothing.
///
/// # Errors
/// Returns [`ExmemError::Io`] on the first filesystem failure, after
/// removing every file this call created.
pub fn write_artifacts(files: &[(&Path, &str)]) -> Result<()> {
    let staged = files
        .iter()
        .map(|(path, _)| staging_path(path))
        .collect::<Result<Vec<_>>>()?;

    for (written, ((_, contents), tmp)) in files.iter().zip(&staged).enumerate() {
        if let Err(e) = std::fs::write(tmp, contents) {
            discard(&staged[..=written]);
            return Err(e.into());
        }
    }

    for (committed, ((path, contents), tmp)) in files.iter().zip(&staged).enumerate() {
        if let Err(e) = std::fs::rename(tmp, path) {
            discard(&staged[committed..]);
            discard(files[..committed].iter().map(|(done, _)| *done));
            return Err(e.into());
        }
        debug!(path = %path.display(), bytes = contents.len(), "artifact written");
    }
    Ok(())
}
