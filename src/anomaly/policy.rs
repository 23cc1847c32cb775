use serde::{Deserialize, Serialize};

/// What happens to a flagged update once the round aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionPolicy {
    /// The verdict is only logged, the update is aggregated like any other.
    #[default]
    ObserveOnly,
    /// Flagged updates still satisfy the barrier but are left out of the average.
    ExcludeFlagged,
    /// Flagged updates have their weight multiplied by `factor`.
    DownWeightFlagged { factor: f32 },
}

impl ExclusionPolicy {
    /// Applies the policy to an update's base weight.
    ///
    /// # Returns
    /// The final weight, or `None` if the update must not take part in the average.
    pub fn apply(&self, weight: f32, flagged: bool) -> Option<f32> {
        match (self, flagged) {
            (_, false) | (Self::ObserveOnly, true) => Some(weight),
            (Self::ExcludeFlagged, true) => None,
            (Self::DownWeightFlagged { factor }, true) => Some(weight * factor),
        }
    }
}
