//! Error types for the exmem core library.

use thiserror::Error;

/// Top-level error type for all exmem operations.
#[derive(Error, Debug)]
pub enum ExmemError {
    /// The initial corpus is missing data or contains values the engine
    /// cannot simulate (empty exemplar set, zero frequency, bad strengths).
    #[error("Malformed corpus entry for word '{word}': {reason}")]
    MalformedCorpus {
        /// Word whose entry was rejected.
        word: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A word's exemplar store has no values left to sample from.
    #[error("Exemplar store for word '{word}' is empty")]
    EmptyStore {
        /// Word whose store is empty.
        word: String,
    },

    /// A group's running total left the valid range.
    #[error("Degenerate statistics for group {group}: total strength {total}")]
    Degenerate {
        /// Group index.
        group: usize,
        /// Offending total strength.
        total: f64,
    },

    /// A driver operation was called in the wrong lifecycle phase.
    #[error("Invalid simulation phase: expected {expected}, found {actual}")]
    InvalidPhase {
        /// Phase the operation requires.
        expected: String,
        /// Phase the driver is actually in.
        actual: String,
    },

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration or run-parameter error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ExmemError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for ExmemError {
    fn from(err: csv::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, ExmemError>;
