//! Exponential forgetting — per-step decay schedules and burn-in length.
//!
//! Every simulation step multiplies every stored strength by a constant
//! factor `r`, so an exemplar inserted at strength 1.0 has strength
//!   s(t) = r^t
//! after `t` further steps. Two equivalent ways of stating `r` are
//! accepted:
//!   - directly, as a rate in (0, 1]
//!   - as a mean lifetime of `n` steps, giving r = 1 − 1/n
//!
//! Burn-in runs exactly as many steps as it takes `r^t` to fall to
//! [`STRENGTH_THRESHOLD`], so nothing present before burn-in carries
//! measurable weight once recording starts.

use serde::{Deserialize, Serialize};

use crate::error::{ExmemError, Result};
use crate::types::STRENGTH_THRESHOLD;

/// How the per-step decay factor is specified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecaySchedule {
    /// Explicit per-step multiplicative factor.
    Rate {
        /// Factor in (0, 1].
        rate: f64,
    },
    /// Mean exemplar lifetime in steps; the rate is `1 - 1/steps`.
    Lifetime {
        /// Lifetime in steps, at least 1.
        steps: f64,
    },
}

impl Default for DecaySchedule {
    fn default() -> Self {
        Self::Lifetime { steps: 492.0 }
    }
}

impl DecaySchedule {
    /// Resolve and validate the per-step decay factor.
    ///
    /// # Errors
    /// Returns [`ExmemError::Config`] if the resulting rate is not in (0, 1].
    pub fn rate(&self) -> Result<f64> {
        let rate = match *self {
            Self::Rate { rate } => rate,
            Self::Lifetime { steps } => {
                if !(steps.is_finite() && steps >= 1.0) {
                    return Err(ExmemError::Config(format!(
                        "decay lifetime must be a finite number of steps >= 1, got {steps}"
                    )));
                }
                1.0 - 1.0 / steps
            }
        };
        validate_rate(rate)?;
        Ok(rate)
    }
}

/// Check that a decay rate lies in (0, 1].
///
/// # Errors
/// Returns [`ExmemError::Config`] for non-positive, non-finite or > 1 rates.
pub fn validate_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 && rate <= 1.0 {
        Ok(())
    } else {
        Err(ExmemError::Config(format!(
            "decay rate must be in (0, 1], got {rate}"
        )))
    }
}

/// Number of burn-in steps: `ceil(ln(threshold) / ln(rate))`.
///
/// # Errors
/// Returns [`ExmemError::Config`] unless `0 < rate < 1`; with no decay the
/// population never reaches a steady age distribution.
pub fn burn_in_iterations(rate: f64) -> Result<u64> {
    validate_rate(rate)?;
    if rate >= 1.0 {
        return Err(ExmemError::Config(
            "burn-in requires a decay rate strictly below 1".into(),
        ));
    }
    let steps = (STRENGTH_THRESHOLD.ln() / rate.ln()).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(steps as u64)
}

/// Strength left of a unit exemplar after `steps` decays.
#[must_use]
pub fn residual_strength(rate: f64, steps: u64) -> f64 {
    let exp = i32::try_from(steps).unwrap_or(i32::MAX);
    rate.powi(exp)
}
