//! Presence queue: the deterministic participant ordering every peer
//! derives independently from the relay's membership set.
//!
//! The queue head is the leader. Nobody is elected; leadership is just
//! `queue[0]` recomputed whenever membership changes.

use std::collections::HashMap;

use campproto::{Participant, ParticipantId};

use crate::relay::PresenceEvent;

/// Order members by `(joined_at, id)`.
///
/// Duplicate ids collapse to one entry, keeping the last-reported metadata.
/// Because the sort key is total, any two peers observing the same
/// membership set compute the same queue.
pub fn compute_queue(members: &[Participant]) -> Vec<Participant> {
    let mut latest: HashMap<&ParticipantId, &Participant> = HashMap::with_capacity(members.len());
    for member in members {
        latest.insert(&member.id, member);
    }

    let mut queue: Vec<Participant> = latest.into_values().cloned().collect();
    queue.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
    queue
}

pub fn queue_head(queue: &[Participant]) -> Option<&Participant> {
    queue.first()
}

pub fn position_of(queue: &[Participant], id: &ParticipantId) -> Option<usize> {
    queue.iter().position(|p| &p.id == id)
}

pub fn is_leader(queue: &[Participant], id: &ParticipantId) -> bool {
    queue_head(queue).is_some_and(|head| &head.id == id)
}

pub fn contains(queue: &[Participant], id: &ParticipantId) -> bool {
    position_of(queue, id).is_some()
}

/// Last presence snapshot plus the deltas seen since.
///
/// Snapshots come from `Relay::members`; events arrive on the
/// subscription in between. Either source alone is enough to converge.
#[derive(Debug, Default, Clone)]
pub struct PresenceRoster {
    members: HashMap<ParticipantId, Participant>,
    queue: Vec<Participant>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a fresh snapshot. Returns true if the queue changed.
    pub fn replace(&mut self, members: Vec<Participant>) -> bool {
        self.members = members.into_iter().map(|p| (p.id.clone(), p)).collect();
        self.recompute()
    }

    /// Apply one presence event. Returns true if the queue changed.
    pub fn apply(&mut self, event: &PresenceEvent) -> bool {
        match event {
            PresenceEvent::Enter(p) | PresenceEvent::Update(p) => {
                self.members.insert(p.id.clone(), p.clone());
            }
            PresenceEvent::Leave(p) => {
                self.members.remove(&p.id);
            }
        }
        self.recompute()
    }

    pub fn queue(&self) -> &[Participant] {
        &self.queue
    }

    fn recompute(&mut self) -> bool {
        let members: Vec<Participant> = self.members.values().cloned().collect();
        let queue = compute_queue(&members);
        if queue == self.queue {
            return false;
        }
        self.queue = queue;
        true
    }
}
