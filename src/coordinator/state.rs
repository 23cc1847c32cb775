use tokio::time::Instant;

use super::{Phase, Registry, RoundStatus, UpdateBuffer};
use crate::anomaly::AnomalyDetector;

/// Everything the round lock protects.
pub(super) struct RoundState<M> {
    pub round: u64,
    pub phase: Phase,
    pub started_at: Instant,
    pub registry: Registry,
    pub buffer: UpdateBuffer,
    pub model: M,
    pub detector: Box<dyn AnomalyDetector>,
    pub anomalies_flagged: u64,
    pub last_accuracy: Option<f32>,
}

impl<M> RoundState<M> {
    pub fn new(model: M, detector: Box<dyn AnomalyDetector>) -> Self {
        Self {
            round: 0,
            phase: Phase::Collecting,
            started_at: Instant::now(),
            registry: Registry::new(),
            buffer: UpdateBuffer::new(),
            model,
            detector,
            anomalies_flagged: 0,
            last_accuracy: None,
        }
    }

    /// Whether every registered participant, and at least `min_participants` of them, submitted.
    pub fn barrier_reached(&self, min_participants: usize) -> bool {
        !self.buffer.is_empty()
            && self.registry.len() >= min_participants
            && self.registry.ids().all(|id| self.buffer.contains(id))
    }

    pub fn status(&self, total_rounds: u64) -> RoundStatus {
        RoundStatus {
            round: self.round,
            total_rounds,
            phase: self.phase,
            participants: self.registry.len(),
            updates_received: self.buffer.len(),
            anomalies_flagged: self.anomalies_flagged,
            last_accuracy: self.last_accuracy,
        }
    }
}
