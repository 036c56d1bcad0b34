//! Error taxonomy for the engine.
//!
//! - [`Rejection`]: a caller asked for something the session rules forbid.
//!   Reported synchronously, nothing is published.
//! - [`RelayError`](crate::relay::RelayError): the transport failed. Never
//!   fatal; local state keeps the last merged value.
//! - Stale writes are not errors at all; see
//!   [`ApplyOutcome::Stale`](crate::reconciler::ApplyOutcome).
//! - Out-of-range tempo and cycle inputs are clamped, not rejected.

use campproto::{DrumVoice, Instrument, LoopId, ParticipantId, Pitch, STEP_COUNT};
use thiserror::Error;

use crate::relay::RelayError;

/// A validation failure. The session state is untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no session state has been observed yet")]
    NoSession,

    #[error("{0} does not hold the active turn")]
    NotYourTurn(ParticipantId),

    #[error("the active turn has already expired")]
    TurnExpired,

    #[error("draft has no notes")]
    EmptyDraft,

    #[error("loop {target} cannot be replaced by a {instrument} loop")]
    InvalidReplaceTarget {
        target: LoopId,
        instrument: Instrument,
    },

    #[error("drum voices already owned by another loop: {}", format_voices(.voices))]
    SoundConflict { voices: Vec<DrumVoice> },

    #[error("step {0} is outside 0..{max}", max = STEP_COUNT)]
    StepOutOfRange(u8),

    #[error("{pitch} cannot be played by {instrument}")]
    PitchMismatch { pitch: Pitch, instrument: Instrument },

    #[error("no loop with id {0}")]
    UnknownLoop(LoopId),

    #[error("no note at {pitch} step {step}")]
    UnknownNote { pitch: Pitch, step: u8 },

    #[error("{0} is not allowed to {1}")]
    NotAdmin(ParticipantId, &'static str),

    #[error("{0} is not present in the session")]
    NotPresent(ParticipantId),
}

fn format_voices(voices: &[DrumVoice]) -> String {
    voices
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced through a [`PeerHandle`](crate::peer::PeerHandle).
#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("relay failure: {0}")]
    Relay(#[from] RelayError),

    #[error("peer has left the session")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sound_conflict_lists_voices() {
        let err = Rejection::SoundConflict {
            voices: vec![DrumVoice::Kick, DrumVoice::Clap],
        };
        assert_eq!(
            err.to_string(),
            "drum voices already owned by another loop: kick, clap"
        );
    }

    #[test]
    fn test_step_message_names_bound() {
        assert_eq!(
            Rejection::StepOutOfRange(20).to_string(),
            "step 20 is outside 0..16"
        );
    }
}
