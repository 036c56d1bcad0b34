//! The local copy of the shared session state and its merge rule.
//!
//! Every incoming state replaces the local one whole when its version is at
//! least the local version. Local mutations are stamped with a fresh,
//! strictly larger version and adopted before they reach the relay.

use campconf::SessionSeedConfig;
use campproto::{Participant, ParticipantId, SessionState};
use tracing::{debug, info};

use crate::presence;

/// What [`StateReconciler::apply`] did with an incoming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Incoming replaced the local state.
    Adopted,
    /// Identical to what is already held.
    Replayed,
    /// Older than the local state; dropped.
    Stale,
}

impl ApplyOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, ApplyOutcome::Adopted)
    }
}

#[derive(Debug, Default)]
pub struct StateReconciler {
    local: Option<SessionState>,
    last_stamp: u64,
}

impl StateReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&SessionState> {
        self.local.as_ref()
    }

    pub fn version(&self) -> Option<u64> {
        self.local.as_ref().map(|s| s.version)
    }

    /// Merge an incoming state under last-writer-wins-by-version.
    ///
    /// An equal version with a different payload is adopted: the last one
    /// delivered wins on this peer.
    pub fn apply(&mut self, incoming: SessionState) -> ApplyOutcome {
        let outcome = match &self.local {
            None => ApplyOutcome::Adopted,
            Some(local) if incoming.version < local.version => ApplyOutcome::Stale,
            Some(local) if incoming == *local => ApplyOutcome::Replayed,
            Some(_) => ApplyOutcome::Adopted,
        };

        match outcome {
            ApplyOutcome::Adopted => {
                debug!(version = incoming.version, "adopting session state");
                self.local = Some(incoming);
            }
            ApplyOutcome::Replayed => {
                debug!(version = incoming.version, "ignoring replayed state");
            }
            ApplyOutcome::Stale => {
                debug!(
                    version = incoming.version,
                    local = self.version().unwrap_or_default(),
                    "dropping stale state"
                );
            }
        }
        outcome
    }

    /// Stamp `next` with a version above anything this peer has held or
    /// issued, adopt it locally, and return it for publishing.
    ///
    /// Wall-clock millis keep versions from different peers roughly
    /// comparable; the `+ 1` floors keep them strictly increasing even when
    /// the clock stalls or steps backwards.
    pub fn stamp(&mut self, mut next: SessionState, now_ms: i64) -> SessionState {
        let floor = self
            .version()
            .unwrap_or_default()
            .max(self.last_stamp)
            .saturating_add(1);
        let wall = u64::try_from(now_ms).unwrap_or_default();
        next.version = wall.max(floor);
        self.last_stamp = next.version;
        self.local = Some(next.clone());
        next
    }

    /// True iff nothing has been observed yet and `self_id` currently heads
    /// the queue. Must be asked at decision time; the head can change.
    pub fn should_bootstrap(&self, queue: &[Participant], self_id: &ParticipantId) -> bool {
        self.local.is_none() && presence::is_leader(queue, self_id)
    }

    /// Build and stamp the first state of a session.
    pub fn genesis(
        &mut self,
        self_id: &ParticipantId,
        seed: &SessionSeedConfig,
        now_ms: i64,
    ) -> SessionState {
        let playback = seed.autoplay.then_some(now_ms);
        let state = SessionState::genesis(self_id.clone(), seed.bpm, seed.window_cycles, playback);
        let stamped = self.stamp(state, now_ms);
        info!(version = stamped.version, bpm = stamped.bpm, "session genesis");
        stamped
    }
}
