use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    aggregation::Weighting,
    anomaly::{ExclusionPolicy, GroupOutlierCheck},
};

/// What to do with a round that outlives its deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Discard the buffered updates and collect the round again.
    #[default]
    Abort,
    /// Close the round over whoever submitted, given at least `min_updates` of them.
    AggregatePartial { min_updates: usize },
}

/// The knobs of the round coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub total_rounds: u64,
    /// The barrier never opens with fewer registered participants than this.
    pub min_participants: usize,
    /// Enter the finished phase once `total_rounds` rounds closed.
    pub stop_at_total_rounds: bool,
    pub round_timeout: Option<Duration>,
    pub timeout_policy: TimeoutPolicy,
    /// Upper bound for writing a broadcast to a single participant.
    pub broadcast_timeout: Option<Duration>,
    pub weighting: Weighting,
    pub exclusion: ExclusionPolicy,
    /// Flags the outliers among a round's updates right before aggregating them.
    pub group_check: Option<GroupOutlierCheck>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            total_rounds: 1,
            min_participants: 1,
            stop_at_total_rounds: false,
            round_timeout: None,
            timeout_policy: TimeoutPolicy::default(),
            broadcast_timeout: None,
            weighting: Weighting::default(),
            exclusion: ExclusionPolicy::default(),
            group_check: None,
        }
    }
}
