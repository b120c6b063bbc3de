//! Frequency bin schemes — how words are partitioned into statistics groups.

use serde::{Deserialize, Serialize};

use crate::error::{ExmemError, Result};
use crate::types::GroupId;

/// Frequency at which the two-way scheme starts its upper bin.
pub const TWO_WAY_SPLIT: u32 = 7;

/// Highest frequency the twelve-way scheme accepts.
pub const TWELVE_WAY_MAX: u32 = 12;

/// Partition of words into frequency groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinScheme {
    /// Low (1–6) versus high (7 and above) frequency words.
    #[default]
    TwoWay,
    /// One group per frequency from 1 to 12.
    TwelveWay,
}

impl BinScheme {
    /// Number of groups this scheme produces.
    #[must_use]
    pub fn group_count(self) -> usize {
        match self {
            Self::TwoWay => 2,
            Self::TwelveWay => TWELVE_WAY_MAX as usize,
        }
    }

    /// Group a word of the given frequency belongs to.
    ///
    /// # Errors
    /// Returns [`ExmemError::Config`] if the frequency is zero, or outside
    /// 1–12 under the twelve-way scheme.
    pub fn group_of(self, frequency: u32) -> Result<GroupId> {
        if frequency == 0 {
            return Err(ExmemError::Config("word frequency must be at least 1".into()));
        }
        match self {
            Self::TwoWay => Ok(usize::from(frequency >= TWO_WAY_SPLIT)),
            Self::TwelveWay if frequency <= TWELVE_WAY_MAX => Ok(frequency as usize - 1),
            Self::TwelveWay => Err(ExmemError::Config(format!(
                "frequency {frequency} outside the twelve-way range 1..={TWELVE_WAY_MAX}"
            ))),
        }
    }

    /// Column label for a group, used in time-series output.
    #[must_use]
    pub fn label(self, group: GroupId) -> String {
        match self {
            Self::TwoWay if group == 0 => format!("1_to_{}", TWO_WAY_SPLIT - 1),
            Self::TwoWay => format!("{TWO_WAY_SPLIT}_to_{TWELVE_WAY_MAX}"),
            Self::TwelveWay => format!("freq_{}", group + 1),
        }
    }

    /// Labels for every group in order.
    #[must_use]
    pub fn labels(self) -> Vec<String> {
        (0..self.group_count()).map(|g| self.label(g)).collect()
    }
}

impl std::fmt::Display for BinScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TwoWay => write!(f, "two-way"),
            Self::TwelveWay => write!(f, "twelve-way"),
        }
    }
}
