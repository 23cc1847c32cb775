use comms::ParameterSet;
use serde::Serialize;

use super::Result;

/// The outcome of evaluating a model over held out data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// The global model whose parameters the coordinator owns.
///
/// The coordinator is the only writer of the parameters, it installs each round's aggregate through
/// `set_parameters` and copies them out for every broadcast.
pub trait Model: Send {
    /// The held out data this model can be evaluated on.
    type Dataset: Send + Sync;

    /// The current parameters.
    fn parameters(&self) -> &ParameterSet;

    /// Replaces the current parameters.
    ///
    /// # Arguments
    /// * `params` - The new parameters, they must have the same shape as the current ones.
    ///
    /// # Returns
    /// An error if the shape differs, in which case the model is left untouched.
    fn set_parameters(&mut self, params: ParameterSet) -> Result<()>;

    /// Evaluates the current parameters.
    ///
    /// # Arguments
    /// * `data` - The evaluation dataset.
    ///
    /// # Returns
    /// The loss and accuracy over `data` or an error if the evaluation couldn't be run.
    fn evaluate(&self, data: &Self::Dataset) -> Result<Evaluation>;
}
