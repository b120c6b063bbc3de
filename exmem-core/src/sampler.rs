//! Population sampler — frequency-weighted word choice and the step kernel.
//!
//! One step is, in this exact order:
//!
//! 1. draw a word proportionally to its static frequency
//! 2. prune that word's forgotten exemplars (lazy: only the chosen word)
//! 3. draw one of its values proportionally to summed strength
//! 4. `new = round(value + advancement, 1)`
//! 5. decay the whole population
//! 6. insert `new` at strength 1.0 on the chosen word
//!
//! Decaying before inserting means the fresh exemplar enters the next step
//! at full strength.
//!
//! The overwrite model ([`ModelKind::Overwrite`]) keeps every store at a
//! fixed size instead: steps 2 and 5 are skipped and step 6 overwrites one
//! uniformly chosen existing occurrence of the word.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{ExmemError, Result};
use crate::population::Population;
use crate::store::PruneReport;
use crate::types::{StepOutcome, WordIndex, round_to_tenth};

/// Result of a single step, with the prune side effects for metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// What was inserted and where.
    pub outcome: StepOutcome,
    /// Pruning performed on the chosen word.
    pub prune: PruneReport,
    /// Value overwritten by the overwrite model.
    pub replaced: Option<f64>,
}

/// How a step stores the new exemplar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Append at full strength; everything decays and weak entries are pruned.
    #[default]
    Decay,
    /// Overwrite a random existing occurrence; no decay, fixed store sizes.
    Overwrite,
}

impl ModelKind {
    /// Whether strengths decay under this model.
    #[must_use]
    pub fn decays(self) -> bool {
        matches!(self, Self::Decay)
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decay => write!(f, "decay"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Frequency-weighted sampler, built once per run.
#[derive(Debug, Clone)]
pub struct PopulationSampler {
    words: WeightedIndex<u32>,
}

impl PopulationSampler {
    /// Build the word distribution from the population's frequencies.
    ///
    /// # Errors
    /// Returns [`ExmemError::Config`] if the population is empty or every
    /// frequency is zero.
    pub fn new(population: &Population) -> Result<Self> {
        let weights = population.words().iter().map(|w| w.frequency);
        let words = WeightedIndex::new(weights)
            .map_err(|e| ExmemError::Config(format!("cannot weight words by frequency: {e}")))?;
        Ok(Self { words })
    }

    /// Draw a word with probability proportional to its frequency.
    pub fn sample_word<R: Rng + ?Sized>(&self, rng: &mut R) -> WordIndex {
        WordIndex(self.words.sample(rng))
    }

    /// Draw one exemplar value from a word's store.
    ///
    /// # Errors
    /// Returns [`ExmemError::EmptyStore`] if the word has nothing to sample.
    pub fn sample_exemplar<R: Rng + ?Sized>(
        &self,
        population: &Population,
        word: WordIndex,
        rng: &mut R,
    ) -> Result<f64> {
        let word = population.word(word);
        word.store
            .weighted_sample(rng)
            .ok_or_else(|| ExmemError::EmptyStore {
                word: word.id.clone(),
            })
    }

    /// Execute one simulation step.
    ///
    /// # Errors
    /// Returns [`ExmemError::EmptyStore`] if the chosen word has no
    /// exemplars, which the prune policy makes unreachable for loaded
    /// populations.
    pub fn step<R: Rng + ?Sized>(
        &self,
        population: &mut Population,
        rng: &mut R,
        decay_rate: f64,
        advancement: f64,
    ) -> Result<StepReport> {
        let index = self.sample_word(rng);

        let prune = population.word_mut(index).store.prune_weak();
        if prune.resurrected {
            warn!(
                word = %population.word(index).id,
                "all exemplars below threshold, kept strongest"
            );
        }

        let sampled = self.sample_exemplar(population, index, rng)?;
        let value = round_to_tenth(sampled + advancement);

        population.decay(decay_rate);

        let word = population.word_mut(index);
        word.store.insert_fresh(value);
        let group = word.group;

        trace!(word = %word.id, sampled, value, group, "step");

        Ok(StepReport {
            outcome: StepOutcome {
                word: index,
                value,
                group,
            },
            prune,
            replaced: None,
        })
    }

    /// Execute one overwrite-model step: sample word, sample exemplar,
    /// round(value + advancement), overwrite a random occurrence.
    ///
    /// # Errors
    /// Returns [`ExmemError::EmptyStore`] if the chosen word has no
    /// exemplars.
    pub fn step_overwrite<R: Rng + ?Sized>(
        &self,
        population: &mut Population,
        rng: &mut R,
        advancement: f64,
    ) -> Result<StepReport> {
        let index = self.sample_word(rng);
        let sampled = self.sample_exemplar(population, index, rng)?;
        let value = round_to_tenth(sampled + advancement);

        let word = population.word_mut(index);
        let replaced = word
            .store
            .replace_random(rng, value)
            .ok_or_else(|| ExmemError::EmptyStore {
                word: word.id.clone(),
            })?;
        let group = word.group;

        trace!(word = %word.id, sampled, value, replaced, group, "overwrite");

        Ok(StepReport {
            outcome: StepOutcome {
                word: index,
                value,
                group,
            },
            prune: PruneReport::default(),
            replaced: Some(replaced),
        })
    }
}
