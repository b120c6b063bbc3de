//! Group statistics — strength-weighted mean and variance per frequency group.
//!
//! Statistics are seeded once by a full recomputation over the population
//! and then maintained incrementally in O(1) per step. With `d` the decay
//! rate, `S` a group's total strength before the step, `m` its mean and
//! `x` the freshly inserted value, the receiving group updates as
//!
//! ```text
//!   S' = d·S + 1
//!   m' = (m·(S' − 1) + x) / S'
//! ```
//!
//! and every other group only decays its total (`S' = d·S`); its mean and
//! variance are ratios whose numerator and denominator shrink together.
//!
//! Two variance recursions are available ([`VarianceForm`]):
//!
//! - **Recentered** — a decaying Welford step. With `δ = m' − m` (the mean
//!   shift in delta form, `m' = m + (x − m)/S'`):
//!   `V' = V + δ² − (V + δ²)/S' + (x − m')²/S'`.
//! - **Raw moment** — track the weighted mean of squares `Q` exactly like
//!   the mean (`Q' = (Q·(S' − 1) + x²)/S'`) and report `Q − m²`.
//!
//! Both equal the recomputed variance in exact arithmetic. In floating
//! point the raw-moment form suffers cancellation when `m²` dwarfs the
//! variance, so the two drift apart over long runs. They are deliberately
//! kept separate; a run uses exactly one.
//!
//! Pruning removes strength from the stores. The driver hands the removed
//! moments (`Σs`, `Σs·v`, `Σs·v²`) to [`GroupTracker::forget`] before the
//! step's update, so the tracker describes exactly the live entries:
//!
//! ```text
//!   S_r = S − Σs
//!   m_r = (m·S − Σs·v) / S_r
//!   V_r = (V·S − Σs·(v − m)² − S_r·(m_r − m)²) / S_r
//! ```
//!
//! The overwrite model keeps each group's exemplar count `N` fixed and
//! swaps one value `old → new` per step ([`GroupTracker::replace`]):
//!
//! ```text
//!   m' = m + (new − old)/N
//!   V' = V − (m' − m)² + ((new − m)² − (old − m)²)/N
//!   Q' = Q + (new² − old²)/N
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ExmemError, Result};
use crate::population::Population;
use crate::store::RemovedMass;
use crate::types::GroupId;

/// Which variance recursion the tracker maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceForm {
    /// Decaying Welford update, re-centred on the shifted mean every step.
    #[default]
    Recentered,
    /// Running second moment, variance reported as `E[X²] − E[X]²`.
    RawMoment,
}

impl std::fmt::Display for VarianceForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recentered => write!(f, "recentered"),
            Self::RawMoment => write!(f, "raw-moment"),
        }
    }
}

/// What the variance columns of a checkpoint are measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceBaseline {
    /// Report the variance itself.
    #[default]
    Absolute,
    /// Report the change since recording started (the seeded variance is
    /// subtracted, so the first row is zero).
    Initial,
}

impl std::fmt::Display for VarianceBaseline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Initial => write!(f, "initial"),
        }
    }
}

/// Running statistics of one group.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroupStats {
    /// Decaying denominator: summed strength of the group's exemplars.
    pub total_strength: f64,
    /// Strength-weighted mean value.
    pub mean: f64,
    /// Strength-weighted population variance (recentered form).
    pub variance: f64,
    /// Strength-weighted mean of squared values (raw-moment form).
    pub second_moment: f64,
}

/// Reported statistics of one group at a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    /// Summed strength.
    pub total_strength: f64,
    /// Strength-weighted mean.
    pub mean: f64,
    /// Strength-weighted variance.
    pub variance: f64,
}

/// Largest disagreement between two trackers over all groups.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Divergence {
    /// Max `|Δmean| / max(1, |mean|)`.
    pub mean: f64,
    /// Max `|Δvariance| / max(1, |variance|)`.
    pub variance: f64,
    /// Group where the larger of the two was observed.
    pub worst_group: GroupId,
}

impl Divergence {
    /// The larger of the mean and variance errors.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.mean.max(self.variance)
    }
}

/// Per-group statistics for a whole population.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTracker {
    groups: Vec<GroupStats>,
    form: VarianceForm,
}

impl GroupTracker {
    /// Full recomputation from the current stores.
    ///
    /// Groups without member words get zero total, mean and variance.
    #[must_use]
    pub fn recompute(population: &Population, form: VarianceForm) -> Self {
        let count = population.scheme().group_count();
        let mut totals = vec![0.0_f64; count];
        let mut weighted = vec![0.0_f64; count];

        for word in population.words() {
            for (value, strength) in word.store.value_strengths() {
                totals[word.group] += strength;
                weighted[word.group] += value * strength;
            }
        }

        let means: Vec<f64> = totals
            .iter()
            .zip(&weighted)
            .map(|(&t, &w)| if t > 0.0 { w / t } else { 0.0 })
            .collect();

        let mut squared = vec![0.0_f64; count];
        for word in population.words() {
            let mean = means[word.group];
            for (value, strength) in word.store.value_strengths() {
                let dev = value - mean;
                squared[word.group] += strength * dev * dev;
            }
        }

        let groups = (0..count)
            .map(|g| {
                let total = totals[g];
                let variance = if total > 0.0 {
                    (squared[g] / total).max(0.0)
                } else {
                    0.0
                };
                GroupStats {
                    total_strength: total,
                    mean: means[g],
                    variance,
                    second_moment: variance + means[g] * means[g],
                }
            })
            .collect();

        Self { groups, form }
    }

    /// Variance recursion in use.
    #[must_use]
    pub fn form(&self) -> VarianceForm {
        self.form
    }

    /// Raw per-group state.
    #[must_use]
    pub fn groups(&self) -> &[GroupStats] {
        &self.groups
    }

    /// Apply one step: `group` received `new_value`, everything decayed by
    /// `decay_rate`.
    ///
    /// # Errors
    /// Returns [`ExmemError::Degenerate`] if the receiving group's total is
    /// negative or non-finite before the update, or not strictly positive
    /// after it.
    pub fn update(&mut self, group: GroupId, new_value: f64, decay_rate: f64) -> Result<()> {
        let form = self.form;
        let stats = self.group_mut(group)?;

        let prior_total = stats.total_strength;
        if !(prior_total.is_finite() && prior_total >= 0.0) {
            return Err(ExmemError::Degenerate {
                group,
                total: prior_total,
            });
        }

        let total = decay_rate * prior_total + 1.0;
        let kept = total - 1.0;
        let mean = stats.mean;

        match form {
            VarianceForm::Recentered => {
                let shifted = mean + (new_value - mean) / total;
                let shift = shifted - mean;
                let carried = stats.variance + shift * shift;
                let fresh = new_value - shifted;
                stats.variance = carried - carried / total + fresh * fresh / total;
            }
            VarianceForm::RawMoment => {
                stats.second_moment =
                    (stats.second_moment * kept + new_value * new_value) / total;
            }
        }
        stats.mean = (mean * kept + new_value) / total;
        stats.total_strength = total;

        if !(total.is_finite() && total > 0.0) {
            return Err(ExmemError::Degenerate { group, total });
        }

        for (g, other) in self.groups.iter_mut().enumerate() {
            if g != group {
                other.total_strength *= decay_rate;
            }
        }
        Ok(())
    }

    /// Remove pruned entries from `group` before the step that pruned them
    /// is applied.
    ///
    /// # Errors
    /// Returns [`ExmemError::Degenerate`] if no strength would remain.
    pub fn forget(&mut self, group: GroupId, removed: RemovedMass) -> Result<()> {
        if removed.is_empty() {
            return Ok(());
        }
        let form = self.form;
        let stats = self.group_mut(group)?;

        let total = stats.total_strength;
        let remaining = total - removed.strength;
        if !(remaining.is_finite() && remaining > 0.0) {
            return Err(ExmemError::Degenerate {
                group,
                total: remaining,
            });
        }

        let mean = stats.mean;
        let shifted = (mean * total - removed.weighted) / remaining;
        match form {
            VarianceForm::Recentered => {
                let removed_spread = removed.squared - 2.0 * mean * removed.weighted
                    + mean * mean * removed.strength;
                let shift = shifted - mean;
                let spread = stats.variance * total - removed_spread - remaining * shift * shift;
                stats.variance = (spread / remaining).max(0.0);
            }
            VarianceForm::RawMoment => {
                stats.second_moment = (stats.second_moment * total - removed.squared) / remaining;
            }
        }
        stats.mean = shifted;
        stats.total_strength = remaining;
        Ok(())
    }

    /// Apply one overwrite-model step: in `group`, `old` became `new`.
    /// Totals are exemplar counts and never change.
    ///
    /// # Errors
    /// Returns [`ExmemError::Degenerate`] if the group holds no exemplars.
    pub fn replace(&mut self, group: GroupId, old: f64, new: f64) -> Result<()> {
        let form = self.form;
        let stats = self.group_mut(group)?;

        let count = stats.total_strength;
        if !(count.is_finite() && count > 0.0) {
            return Err(ExmemError::Degenerate {
                group,
                total: count,
            });
        }

        let mean = stats.mean;
        let shifted = mean + (new - old) / count;
        match form {
            VarianceForm::Recentered => {
                let shift = shifted - mean;
                let swapped = ((new - mean).powi(2) - (old - mean).powi(2)) / count;
                stats.variance = (stats.variance - shift * shift + swapped).max(0.0);
            }
            VarianceForm::RawMoment => {
                stats.second_moment += (new * new - old * old) / count;
            }
        }
        stats.mean = shifted;
        Ok(())
    }

    fn group_mut(&mut self, group: GroupId) -> Result<&mut GroupStats> {
        let count = self.groups.len();
        self.groups.get_mut(group).ok_or_else(|| {
            ExmemError::Config(format!("group {group} out of range for {count} groups"))
        })
    }

    /// Current `(total, mean, variance)` per group. Does not mutate.
    #[must_use]
    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        self.groups
            .iter()
            .map(|g| GroupSnapshot {
                total_strength: g.total_strength,
                mean: g.mean,
                variance: match self.form {
                    VarianceForm::Recentered => g.variance,
                    VarianceForm::RawMoment => (g.second_moment - g.mean * g.mean).max(0.0),
                },
            })
            .collect()
    }

    /// Compare against a reference (typically a fresh recomputation).
    #[must_use]
    pub fn divergence(&self, reference: &Self) -> Divergence {
        let mut out = Divergence::default();
        let mut worst = 0.0;
        for (g, (ours, theirs)) in self.snapshot().iter().zip(reference.snapshot()).enumerate() {
            let mean_err = relative_error(ours.mean, theirs.mean);
            let var_err = relative_error(ours.variance, theirs.variance);
            out.mean = out.mean.max(mean_err);
            out.variance = out.variance.max(var_err);
            if mean_err.max(var_err) > worst {
                worst = mean_err.max(var_err);
                out.worst_group = g;
            }
        }
        out
    }
}

fn relative_error(value: f64, reference: f64) -> f64 {
    (value - reference).abs() / reference.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinScheme;
    use crate::corpus::Corpus;

    fn population(json: &str) -> Population {
        let corpus = Corpus::from_json_str(json).expect("valid corpus");
        Population::from_corpus(&corpus, BinScheme::TwoWay).expect("valid population")
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1.0)
    }

    #[test]
    fn recompute_weighted_mean_and_variance() {
        // Group 0: values 1 (strength 1) and 3 (strength 3) → mean 2.5,
        // variance (1·2.25 + 3·0.25)/4 = 0.75.
        let pop = population(
            r#"{"a": {"frequency": 1, "exemplars": {"1.0": [1.0], "3.0": [1.0, 2.0]}}}"#,
        );
        let tracker = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        let snap = tracker.snapshot();
        assert!(close(snap[0].total_strength, 4.0, 1e-12));
        assert!(close(snap[0].mean, 2.5, 1e-12));
        assert!(close(snap[0].variance, 0.75, 1e-12));
        // Empty high-frequency group.
        assert_eq!(snap[1].total_strength, 0.0);
        assert_eq!(snap[1].mean, 0.0);
        assert_eq!(snap[1].variance, 0.0);
    }

    #[test]
    fn raw_moment_seed_reports_same_variance() {
        let pop = population(
            r#"{"a": {"frequency": 1, "exemplars": {"1.0": [1.0], "3.0": [1.0, 2.0]}}}"#,
        );
        let a = GroupTracker::recompute(&pop, VarianceForm::Recentered).snapshot();
        let b = GroupTracker::recompute(&pop, VarianceForm::RawMoment).snapshot();
        assert!(close(a[0].variance, b[0].variance, 1e-12));
    }

    #[test]
    fn update_matches_closed_form() {
        let pop = population(
            r#"{"a": {"frequency": 1, "exemplars": {"1.0": [1.0]}},
                "b": {"frequency": 7, "exemplars": {"2.0": [1.0]}}}"#,
        );
        for form in [VarianceForm::Recentered, VarianceForm::RawMoment] {
            let mut tracker = GroupTracker::recompute(&pop, form);
            tracker.update(0, 2.0, 0.99).expect("valid update");
            let snap = tracker.snapshot();

            // S' = 1·0.99 + 1; m' = (1·0.99 + 2)/1.99.
            assert!(close(snap[0].total_strength, 1.99, 1e-12));
            assert!(close(snap[0].mean, (0.99 + 2.0) / 1.99, 1e-12));
            // Weighted variance of {1: 0.99, 2: 1}.
            let m: f64 = (0.99 + 2.0) / 1.99;
            let var = (0.99 * (1.0 - m).powi(2) + (2.0 - m).powi(2)) / 1.99;
            assert!(close(snap[0].variance, var, 1e-12), "{form}");

            assert!(close(snap[1].total_strength, 0.99, 1e-12));
            assert!(close(snap[1].mean, 2.0, 1e-12));
            assert!(close(snap[1].variance, 0.0, 1e-12));
        }
    }

    #[test]
    fn delta_form_mean_agrees_with_ratio_form() {
        let mut tracker = GroupTracker {
            groups: vec![GroupStats {
                total_strength: 37.25,
                mean: 4.1,
                variance: 0.6,
                second_moment: 0.6 + 4.1 * 4.1,
            }],
            form: VarianceForm::Recentered,
        };
        let (s, m, x, d) = (37.25, 4.1, 5.3, 0.997);
        tracker.update(0, x, d).expect("valid update");
        let delta_form = m + (x - m) / (d * s + 1.0);
        assert!(close(tracker.groups()[0].mean, delta_form, 1e-14));
    }

    #[test]
    fn update_into_empty_group_starts_from_new_value() {
        let pop = population(r#"{"a": {"frequency": 1, "exemplars": {"1.0": [1.0]}}}"#);
        let mut tracker = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        tracker.update(1, 5.0, 0.9).expect("valid update");
        let snap = tracker.snapshot();
        assert!(close(snap[1].total_strength, 1.0, 1e-12));
        assert!(close(snap[1].mean, 5.0, 1e-12));
        assert!(close(snap[1].variance, 0.0, 1e-12));
    }

    #[test]
    fn degenerate_total_is_rejected() {
        let mut tracker = GroupTracker {
            groups: vec![GroupStats {
                total_strength: f64::NAN,
                ..GroupStats::default()
            }],
            form: VarianceForm::Recentered,
        };
        assert!(matches!(
            tracker.update(0, 1.0, 0.9),
            Err(ExmemError::Degenerate { group: 0, .. })
        ));
    }

    #[test]
    fn out_of_range_group_is_rejected() {
        let pop = population(r#"{"a": {"frequency": 1, "exemplars": [1.0]}}"#);
        let mut tracker = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        assert!(tracker.update(5, 1.0, 0.9).is_err());
    }

    #[test]
    fn raw_moment_variance_never_negative() {
        let tracker = GroupTracker {
            groups: vec![GroupStats {
                total_strength: 3.0,
                mean: 2.0,
                variance: 0.0,
                second_moment: 4.0 - 1e-15,
            }],
            form: VarianceForm::RawMoment,
        };
        assert_eq!(tracker.snapshot()[0].variance, 0.0);
    }

    #[test]
    fn forget_matches_recompute_after_prune() {
        let json = r#"{"a": {"frequency": 1, "exemplars": {"1.0": [1e-7, 1.0], "4.0": [5e-7, 0.6]}},
                       "b": {"frequency": 2, "exemplars": {"2.5": [9e-7], "3.0": [0.8]}}}"#;
        for form in [VarianceForm::Recentered, VarianceForm::RawMoment] {
            let mut pop = population(json);
            let mut tracker = GroupTracker::recompute(&pop, form);

            let mut removed = RemovedMass::default();
            for index in [crate::types::WordIndex(0), crate::types::WordIndex(1)] {
                let report = pop.word_mut(index).store.prune_weak();
                removed.strength += report.mass.strength;
                removed.weighted += report.mass.weighted;
                removed.squared += report.mass.squared;
            }
            tracker.forget(0, removed).expect("mass remains");

            let reference = GroupTracker::recompute(&pop, form);
            let (ours, theirs) = (tracker.snapshot(), reference.snapshot());
            assert!(close(ours[0].total_strength, theirs[0].total_strength, 1e-14), "{form}");
            assert!(close(ours[0].mean, theirs[0].mean, 1e-12), "{form}");
            assert!(close(ours[0].variance, theirs[0].variance, 1e-12), "{form}");
        }
    }

    #[test]
    fn forget_nothing_is_a_no_op() {
        let pop = population(r#"{"a": {"frequency": 1, "exemplars": [1.0, 2.0]}}"#);
        let mut tracker = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        let before = tracker.clone();
        tracker.forget(0, RemovedMass::default()).expect("no-op");
        assert_eq!(tracker, before);
    }

    #[test]
    fn forget_everything_is_degenerate() {
        let pop = population(r#"{"a": {"frequency": 1, "exemplars": {"1.0": [0.5]}}}"#);
        let mut tracker = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        let all = RemovedMass {
            strength: 0.5,
            weighted: 0.5,
            squared: 0.5,
        };
        assert!(matches!(
            tracker.forget(0, all),
            Err(ExmemError::Degenerate { group: 0, .. })
        ));
    }

    #[test]
    fn replace_matches_recompute() {
        // Group 0 holds {1, 2, 4}; overwrite 2 with 7 → {1, 4, 7}.
        let before = population(r#"{"a": {"frequency": 3, "exemplars": [1.0, 2.0, 4.0]}}"#);
        let after = population(r#"{"a": {"frequency": 3, "exemplars": [1.0, 4.0, 7.0]}}"#);
        for form in [VarianceForm::Recentered, VarianceForm::RawMoment] {
            let mut tracker = GroupTracker::recompute(&before, form);
            tracker.replace(0, 2.0, 7.0).expect("non-empty group");
            let reference = GroupTracker::recompute(&after, form).snapshot();
            let snap = tracker.snapshot();
            assert!(close(snap[0].total_strength, 3.0, 1e-15));
            assert!(close(snap[0].mean, 4.0, 1e-12), "{form}");
            assert!(close(snap[0].variance, reference[0].variance, 1e-12), "{form}");
            assert!(close(snap[0].variance, 6.0, 1e-12), "{form}");
        }
    }

    #[test]
    fn replace_into_empty_group_is_degenerate() {
        let pop = population(r#"{"a": {"frequency": 1, "exemplars": [1.0]}}"#);
        let mut tracker = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        assert!(tracker.replace(1, 1.0, 2.0).is_err());
    }

    #[test]
    fn divergence_of_identical_trackers_is_zero() {
        let pop = population(r#"{"a": {"frequency": 1, "exemplars": [1.0, 4.0]}}"#);
        let a = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        let d = a.divergence(&a.clone());
        assert_eq!(d.max(), 0.0);
    }

    #[test]
    fn divergence_reports_worst_group() {
        let pop = population(
            r#"{"a": {"frequency": 1, "exemplars": [1.0]},
                "b": {"frequency": 8, "exemplars": [2.0]}}"#,
        );
        let reference = GroupTracker::recompute(&pop, VarianceForm::Recentered);
        let mut drifted = reference.clone();
        drifted.groups[1].mean += 0.5;
        let d = drifted.divergence(&reference);
        assert_eq!(d.worst_group, 1);
        assert!(close(d.mean, 0.25, 1e-12));
    }
}
