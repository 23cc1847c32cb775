use std::collections::BTreeMap;

use comms::ParameterSet;

use super::ParticipantId;

/// An update waiting for its round to close.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedUpdate {
    pub params: ParameterSet,
    pub samples: u64,
    /// Whether the anomaly detector flagged it on submission.
    pub flagged: bool,
}

/// The updates submitted during the round in progress, at most one per participant.
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    entries: BTreeMap<ParticipantId, BufferedUpdate>,
}

impl UpdateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `update` for `id`, replacing its earlier update of this round.
    ///
    /// # Returns
    /// The replaced update, if any.
    pub fn insert(&mut self, id: ParticipantId, update: BufferedUpdate) -> Option<BufferedUpdate> {
        self.entries.insert(id, update)
    }

    pub fn remove(&mut self, id: ParticipantId) -> Option<BufferedUpdate> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&BufferedUpdate> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, &BufferedUpdate)> {
        self.entries.iter().map(|(&id, update)| (id, update))
    }
}
