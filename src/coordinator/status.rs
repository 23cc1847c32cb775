use serde::Serialize;

/// Where the coordinator is within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Collecting,
    Aggregating,
    Finished,
}

/// A snapshot of the coordinator published after every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundStatus {
    pub round: u64,
    pub total_rounds: u64,
    pub phase: Phase,
    pub participants: usize,
    pub updates_received: usize,
    pub anomalies_flagged: u64,
    pub last_accuracy: Option<f32>,
}
