//! Experience thresholds that map accumulated experience onto levels.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Level;

/// Reasons a threshold table may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ThresholdError {
    /// The table contains no thresholds, so no level can be derived.
    #[error("level threshold table is empty")]
    Empty,
    /// A threshold does not exceed its predecessor.
    #[error("threshold {value} at index {index} does not exceed previous threshold {previous}")]
    NotIncreasing {
        /// Position of the offending threshold.
        index: usize,
        /// Threshold preceding the offending entry.
        previous: u32,
        /// Offending threshold.
        value: u32,
    },
}

/// Strictly increasing experience thresholds; entry `i` unlocks level `i + 1`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct LevelThresholds {
    values: Vec<u32>,
}

impl LevelThresholds {
    /// Validates and wraps the provided thresholds.
    pub fn new(values: Vec<u32>) -> Result<Self, ThresholdError> {
        if values.is_empty() {
            return Err(ThresholdError::Empty);
        }

        for (offset, pair) in values.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(ThresholdError::NotIncreasing {
                    index: offset + 1,
                    previous: pair[0],
                    value: pair[1],
                });
            }
        }

        Ok(Self { values })
    }

    /// Highest level reachable with this table.
    #[must_use]
    pub fn max_level(&self) -> Level {
        Level::new(u32::try_from(self.values.len()).unwrap_or(u32::MAX))
    }

    /// Experience required to reach `level`, if the level exists.
    #[must_use]
    pub fn threshold(&self, level: Level) -> Option<u32> {
        let index = usize::try_from(level.get().checked_sub(1)?).ok()?;
        self.values.get(index).copied()
    }

    /// Derives the level held with `experience`.
    ///
    /// Experience below the first threshold still maps onto the first level.
    #[must_use]
    pub fn level_for_experience(&self, experience: u32) -> Level {
        let reached = self
            .values
            .partition_point(|threshold| *threshold <= experience);
        Level::new(u32::try_from(reached.max(1)).unwrap_or(u32::MAX))
    }

    /// Fraction of the way from the current level toward the next one.
    ///
    /// Returns `1.0` once the maximum level is held.
    #[must_use]
    pub fn level_progress(&self, experience: u32) -> f32 {
        let level = self.level_for_experience(experience);
        if level >= self.max_level() {
            return 1.0;
        }

        let (Some(lower), Some(upper)) = (self.threshold(level), self.threshold(level.next()))
        else {
            return 1.0;
        };

        if experience <= lower {
            return 0.0;
        }

        let gained = (experience - lower) as f32;
        let span = (upper - lower) as f32;
        (gained / span).clamp(0.0, 1.0)
    }
}

impl TryFrom<Vec<u32>> for LevelThresholds {
    type Error = ThresholdError;

    fn try_from(values: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<LevelThresholds> for Vec<u32> {
    fn from(thresholds: LevelThresholds) -> Self {
        thresholds.values
    }
}
