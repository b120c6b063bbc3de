//! Per-word exemplar store — decaying strength traces keyed by value.
//!
//! Every value a word has produced maps to the list of strengths of its
//! individual occurrences. New occurrences are appended at
//! [`FRESH_STRENGTH`] and every strength is decayed uniformly, so each list
//! stays sorted ascending (oldest and weakest first). Pruning exploits that
//! ordering: forgotten entries always form a prefix and are removed with a
//! single boundary search per value.
//!
//! ```text
//!   value 1.2 → [3.1e-7, 0.004, 0.61, 1.0]
//!                └─ pruned ─┘
//! ```

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::types::{ExemplarValue, FRESH_STRENGTH, STRENGTH_THRESHOLD};

/// Strength-weighted moments of a set of removed entries: `Σs`, `Σs·v`,
/// `Σs·v²`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RemovedMass {
    /// Summed strength.
    pub strength: f64,
    /// Summed `strength · value`.
    pub weighted: f64,
    /// Summed `strength · value²`.
    pub squared: f64,
}

impl RemovedMass {
    fn add(&mut self, value: f64, strength: f64) {
        self.strength += strength;
        self.weighted += strength * value;
        self.squared += strength * value * value;
    }

    fn sub(&mut self, value: f64, strength: f64) {
        self.strength -= strength;
        self.weighted -= strength * value;
        self.squared -= strength * value * value;
    }

    /// Whether nothing was removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strength == 0.0
    }
}

/// Outcome of a [`ExemplarStore::prune_weak`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PruneReport {
    /// Strength entries removed.
    pub removed: usize,
    /// Whether every entry fell below threshold and the strongest one was kept.
    pub resurrected: bool,
    /// Moments of what left the store, for statistics downdates.
    pub mass: RemovedMass,
}

/// Strength traces of one word, keyed by exemplar value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExemplarStore {
    traces: BTreeMap<ExemplarValue, Vec<f64>>,
}

impl ExemplarStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// Whether the store holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Total number of strength entries across all values.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.traces.values().map(Vec::len).sum()
    }

    /// Strength list for one value, if present.
    #[must_use]
    pub fn strengths(&self, value: f64) -> Option<&[f64]> {
        self.traces.get(&OrderedFloat(value)).map(Vec::as_slice)
    }

    /// Iterate over `(value, strength list)` pairs in ascending value order.
    pub fn traces(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.traces.iter().map(|(v, s)| (v.0, s.as_slice()))
    }

    /// Iterate over `(value, summed strength)` pairs.
    pub fn value_strengths(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.traces.iter().map(|(v, s)| (v.0, s.iter().sum()))
    }

    /// Sum of every strength entry in the store.
    #[must_use]
    pub fn total_strength(&self) -> f64 {
        self.traces.values().flatten().sum()
    }

    /// The single strongest entry as `(value, strength)`.
    ///
    /// Since lists are ascending, only the last element of each is inspected.
    #[must_use]
    pub fn strongest(&self) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;
        for (value, list) in &self.traces {
            if let Some(&top) = list.last() {
                if best.is_none_or(|(_, s)| top > s) {
                    best = Some((value.0, top));
                }
            }
        }
        best
    }

    /// Multiply every strength by `rate`.
    pub fn decay(&mut self, rate: f64) {
        for list in self.traces.values_mut() {
            for strength in list.iter_mut() {
                *strength *= rate;
            }
        }
    }

    /// Append a strength for `value`, creating the value if absent.
    pub fn insert(&mut self, value: f64, strength: f64) {
        self.traces.entry(OrderedFloat(value)).or_default().push(strength);
    }

    /// Append a fresh occurrence of `value`.
    pub fn insert_fresh(&mut self, value: f64) {
        self.insert(value, FRESH_STRENGTH);
    }

    /// Insert a whole strength list for `value`, sorted ascending.
    ///
    /// Used when rebuilding a store from serialized input whose lists may be
    /// in arbitrary order. Appends to any existing list for the value.
    pub fn insert_trace(&mut self, value: f64, strengths: &[f64]) {
        let list = self.traces.entry(OrderedFloat(value)).or_default();
        list.extend_from_slice(strengths);
        list.sort_by(f64::total_cmp);
    }

    /// Drop every entry at or below [`STRENGTH_THRESHOLD`].
    ///
    /// Values whose lists empty out are removed. If that would remove every
    /// value, the single strongest entry survives on its own so the word is
    /// never left without exemplars.
    pub fn prune_weak(&mut self) -> PruneReport {
        let strongest = self.strongest();
        let mut removed = 0;
        let mut mass = RemovedMass::default();

        self.traces.retain(|value, list| {
            let boundary = list.partition_point(|&s| s <= STRENGTH_THRESHOLD);
            removed += boundary;
            for s in list.drain(..boundary) {
                mass.add(value.0, s);
            }
            !list.is_empty()
        });

        let mut resurrected = false;
        if self.traces.is_empty() {
            if let Some((value, strength)) = strongest {
                self.traces.insert(OrderedFloat(value), vec![strength]);
                removed -= 1;
                mass.sub(value, strength);
                resurrected = true;
            }
        }

        PruneReport {
            removed,
            resurrected,
            mass,
        }
    }

    /// Remove the `n`-th strength entry, counting across values in
    /// ascending value order. Returns the entry's value.
    pub fn remove_nth(&mut self, mut n: usize) -> Option<f64> {
        let mut hit = None;
        for (value, list) in &mut self.traces {
            if n < list.len() {
                list.remove(n);
                hit = Some((*value, list.is_empty()));
                break;
            }
            n -= list.len();
        }
        let (value, emptied) = hit?;
        if emptied {
            self.traces.remove(&value);
        }
        Some(value.0)
    }

    /// Overwrite one uniformly chosen entry with a fresh occurrence of
    /// `value`. Returns the value that was overwritten.
    pub fn replace_random<R: Rng + ?Sized>(&mut self, rng: &mut R, value: f64) -> Option<f64> {
        let count = self.entry_count();
        if count == 0 {
            return None;
        }
        let old = self.remove_nth(rng.gen_range(0..count))?;
        self.insert_fresh(value);
        Some(old)
    }

    /// Draw one value with probability proportional to its summed strength.
    ///
    /// Returns `None` if the store is empty or holds no positive strength.
    pub fn weighted_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<f64> {
        let (values, weights): (Vec<f64>, Vec<f64>) = self.value_strengths().unzip();
        let dist = WeightedIndex::new(&weights).ok()?;
        Some(values[dist.sample(rng)])
    }
}
