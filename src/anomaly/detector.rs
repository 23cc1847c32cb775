use comms::ParameterSet;

use crate::coordinator::ParticipantId;

/// Inspects submitted updates and reports which of them look anomalous.
///
/// The coordinator calls `observe` once per accepted submission and `poll` right after, both
/// while holding the round lock, so implementations don't need their own synchronization.
pub trait AnomalyDetector: Send {
    /// Feeds a freshly submitted update to the detector.
    ///
    /// # Arguments
    /// * `participant` - The submitter.
    /// * `params` - The submitted parameters.
    fn observe(&mut self, participant: ParticipantId, params: &ParameterSet);

    /// Whether the last update observed for `participant` was judged anomalous.
    fn poll(&mut self, participant: ParticipantId) -> bool;

    /// Drops anything learned about `participant`, called once it leaves the cohort.
    fn forget(&mut self, _participant: ParticipantId) {}
}
