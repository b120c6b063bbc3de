//! Core type definitions shared by the store, sampler, tracker and driver.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Strengths at or below this value are considered forgotten.
pub const STRENGTH_THRESHOLD: f64 = 1e-6;

/// Strength assigned to a freshly inserted exemplar.
pub const FRESH_STRENGTH: f64 = 1.0;

// ---------------------------------------------------------------------------
// Values & identities
// ---------------------------------------------------------------------------

/// A remembered numeric observation, totally ordered so it can key a map.
pub type ExemplarValue = OrderedFloat<f64>;

/// Index of a frequency group (bin).
pub type GroupId = usize;

/// Index of a word inside a [`crate::population::Population`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WordIndex(pub usize);

impl fmt::Display for WordIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Round to one decimal place, halves away from zero.
#[must_use]
pub fn round_to_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Step result
// ---------------------------------------------------------------------------

/// What a single simulation step produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    /// Word that was sampled and reinforced.
    pub word: WordIndex,
    /// Value of the freshly inserted exemplar.
    pub value: f64,
    /// Group of the reinforced word.
    pub group: GroupId,
}
