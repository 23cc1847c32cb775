//! Flags the updates of a round whose magnitude stands out from the rest of the round.

use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP_THRESHOLD: f64 = 3.5;
/// Fewer updates than this aren't compared against each other.
pub const MIN_GROUP_SIZE: usize = 3;

/// Scales the median absolute deviation to a standard deviation under normality.
const MAD_SCALE: f64 = 0.6745;
const MIN_MAD: f64 = 1e-9;

fn default_threshold() -> f64 {
    DEFAULT_GROUP_THRESHOLD
}

/// Compares the L2 norms of a whole round's updates by their modified z-score.
///
/// Only updates larger than the round's median can be flagged. Rounds with fewer than
/// `MIN_GROUP_SIZE` updates, or whose norms are practically identical, flag nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupOutlierCheck {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for GroupOutlierCheck {
    fn default() -> Self {
        Self::new(DEFAULT_GROUP_THRESHOLD)
    }
}

impl GroupOutlierCheck {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The modified z-score of every norm, `None` when the round can't be judged.
    pub fn scores(&self, norms: &[f64]) -> Option<Vec<f64>> {
        if norms.len() < MIN_GROUP_SIZE {
            return None;
        }

        let center = median(norms.to_vec());
        let mad = median(norms.iter().map(|n| (n - center).abs()).collect());

        if mad < MIN_MAD {
            return None;
        }

        Some(norms.iter().map(|n| MAD_SCALE * (n - center) / mad).collect())
    }

    /// Judges every norm of a round.
    ///
    /// # Returns
    /// One verdict per norm, in the same order.
    pub fn outliers(&self, norms: &[f64]) -> Vec<bool> {
        match self.scores(norms) {
            Some(scores) => scores.into_iter().map(|z| z > self.threshold).collect(),
            None => vec![false; norms.len()],
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;

    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.
    } else {
        values[mid]
    }
}
