//! campproto - Session state and wire types for Campfire
//!
//! Every peer in a Campfire session holds a copy of one aggregate,
//! [`SessionState`], and replaces it whole whenever a fresher version
//! arrives over the relay. This crate defines that aggregate, the parts
//! it is built from (participants, turns, loops, notes), the fixed
//! musical limits all peers must agree on, and the [`Envelope`] that
//! carries a state across the relay.
//!
//! Nothing here talks to the network; see the `campfire` crate for the
//! engine that produces and merges these values.

pub mod domain;
pub mod limits;
pub mod music;
pub mod state;

pub use domain::{LoopId, NoteId, ParticipantId};
pub use limits::{
    clamp_bpm, clamp_window_cycles, composition_window_ms, loop_duration_secs, BPM_MAX, BPM_MIN,
    DEFAULT_BPM, DEFAULT_WINDOW_CYCLES, DRUM_LOOP_CAP, MELODIC_LOOP_CAP, MIN_TURN_BUFFER_MS,
    STEP_COUNT, VALID_WINDOW_CYCLES,
};
pub use music::{DrumVoice, Instrument, Note, Pitch, Scale};
pub use state::{Loop, Participant, SessionState, Turn};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Relay topic that carries session state replacements.
pub const STATE_TOPIC: &str = "session-state";

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Wire encoding failures.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),
}

/// What an envelope carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// A complete replacement for the session state.
    State(SessionState),
}

/// Envelope wraps every relay message with identity and send time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique message id; duplicates from at-least-once delivery share it.
    pub id: Uuid,
    pub topic: String,
    pub sender: ParticipantId,
    pub sent_at_ms: i64,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, sender: ParticipantId, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            sender,
            sent_at_ms: now_ms(),
            payload,
        }
    }

    /// Wrap a full state replacement on [`STATE_TOPIC`].
    pub fn state(sender: ParticipantId, state: SessionState) -> Self {
        Self::new(STATE_TOPIC, sender, Payload::State(state))
    }

    pub fn as_state(&self) -> Option<&SessionState> {
        match &self.payload {
            Payload::State(state) => Some(state),
        }
    }

    pub fn into_state(self) -> Option<SessionState> {
        match self.payload {
            Payload::State(state) => Some(state),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtoError> {
        serde_json::to_vec(self).map_err(ProtoError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtoError> {
        serde_json::from_slice(bytes).map_err(ProtoError::Decode)
    }
}
