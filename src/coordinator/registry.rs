use std::{collections::BTreeMap, net::SocketAddr};

use super::{Participant, ParticipantId, ParticipantSink};

/// The set of participants the barrier waits on.
#[derive(Default)]
pub struct Registry {
    participants: BTreeMap<ParticipantId, Participant>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh id and enrolls the participant under it.
    ///
    /// # Arguments
    /// * `addr` - The remote address of the participant, if any.
    /// * `sink` - The sending half of its connection, if any.
    ///
    /// # Returns
    /// The new id, never handed out before.
    pub fn register(
        &mut self,
        addr: Option<SocketAddr>,
        sink: Option<Box<dyn ParticipantSink>>,
    ) -> ParticipantId {
        let id = ParticipantId::new(self.next_id);
        self.next_id += 1;
        self.participants.insert(id, Participant::new(id, addr, sink));
        id
    }

    /// Enrolls `id` without a connection if it was issued before but isn't registered anymore.
    ///
    /// # Returns
    /// Whether `id` was newly enrolled. Ids this registry never issued are never enrolled.
    pub fn enroll(&mut self, id: ParticipantId) -> bool {
        if !self.issued(id) || self.participants.contains_key(&id) {
            return false;
        }

        self.participants.insert(id, Participant::new(id, None, None));
        true
    }

    /// Whether `id` was ever handed out by `register`.
    pub fn issued(&self, id: ParticipantId) -> bool {
        id.get() < self.next_id
    }

    /// Attaches `sink` as the connection of an already registered participant.
    ///
    /// # Returns
    /// Whether `id` is registered.
    pub fn attach(&mut self, id: ParticipantId, sink: Box<dyn ParticipantSink>) -> bool {
        match self.participants.get_mut(&id) {
            Some(participant) => {
                participant.attach(sink);
                true
            }
            None => false,
        }
    }

    pub fn deregister(&mut self, id: ParticipantId) -> Option<Participant> {
        self.participants.remove(&id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.keys().copied()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.participants.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let mut registry = Registry::new();
        let a = registry.register(None, None);
        let b = registry.register(None, None);
        registry.deregister(a);
        let c = registry.register(None, None);

        assert_ne!(a, b);
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn enroll_departed() {
        let mut registry = Registry::new();
        let a = registry.register(None, None);
        let b = registry.register(None, None);
        registry.deregister(b);

        assert!(!registry.enroll(a));
        assert!(registry.enroll(b));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(registry.register(None, None), ParticipantId::new(2));
    }

    #[test]
    fn never_issued_ids_are_not_enrolled() {
        let mut registry = Registry::new();
        let a = registry.register(None, None);

        for id in [ParticipantId::new(10), ParticipantId::new(u64::MAX)] {
            assert!(!registry.issued(id));
            assert!(!registry.enroll(id));
        }
        assert_eq!(registry.len(), 1);

        let b = registry.register(None, None);
        assert_eq!(b, ParticipantId::new(1));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![a, b]);
    }
}
