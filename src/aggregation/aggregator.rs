use comms::ParameterSet;

use super::Result;

/// A single participant's contribution to a round, paired with its aggregation weight.
#[derive(Debug, Clone, Copy)]
pub struct WeightedUpdate<'a> {
    pub params: &'a ParameterSet,
    pub weight: f32,
}

impl<'a> WeightedUpdate<'a> {
    /// Creates a new `WeightedUpdate`.
    ///
    /// # Arguments
    /// * `params` - The submitted parameters.
    /// * `weight` - The non negative weight of this contribution.
    pub fn new(params: &'a ParameterSet, weight: f32) -> Self {
        Self { params, weight }
    }

    /// An update that weighs the same as every other uniform update.
    pub fn uniform(params: &'a ParameterSet) -> Self {
        Self::new(params, 1.)
    }
}

/// Combines the updates of a round into the next global parameter set.
pub trait Aggregator: Send + Sync {
    /// Aggregates `updates` into a single parameter set with the same shape as each of them.
    ///
    /// # Arguments
    /// * `updates` - The weighted updates of the round, at least one.
    ///
    /// # Returns
    /// The aggregated parameters or an `AggregationErr` if the input can't be combined.
    fn aggregate(&self, updates: &[WeightedUpdate<'_>]) -> Result<ParameterSet>;
}
