//! Folding a finished draft into the shared loop set.
//!
//! A commit produces the complete next state in one value: the new loop,
//! the loop it displaced, and the next turn. The caller stamps and
//! publishes it as a single replacement so no observer sees the new loop
//! with the old turn.

use std::collections::BTreeSet;

use campproto::{
    DrumVoice, Instrument, Loop, LoopId, Note, Participant, ParticipantId, Pitch, Scale,
    SessionState, Turn,
};
use tracing::debug;

use crate::arbiter::{RotationReason, TurnArbiter};
use crate::draft::Draft;
use crate::error::Rejection;

/// The unstamped result of a successful commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub next: SessionState,
    pub loop_id: LoopId,
    pub replaced: Option<LoopId>,
    pub next_turn: Turn,
}

/// The active turn, if `id` holds it and it has not run out.
pub fn require_turn<'a>(
    state: &'a SessionState,
    id: &ParticipantId,
    now: i64,
) -> Result<&'a Turn, Rejection> {
    let turn = state
        .active_turn
        .as_ref()
        .filter(|t| &t.user_id == id)
        .ok_or_else(|| Rejection::NotYourTurn(id.clone()))?;
    if turn.is_expired(now) {
        return Err(Rejection::TurnExpired);
    }
    Ok(turn)
}

/// Which committed loop a draft would displace.
///
/// An explicit target must exist and share the draft's instrument. Without
/// one, the oldest loop of the instrument is displaced once it is at
/// capacity.
pub fn resolve_replacement<'a>(
    state: &'a SessionState,
    draft: &Draft,
) -> Result<Option<&'a Loop>, Rejection> {
    let instrument = draft.instrument();
    if let Some(target) = draft.replace_target() {
        let found = state
            .find_loop(target)
            .ok_or_else(|| Rejection::UnknownLoop(target.clone()))?;
        if found.instrument != instrument {
            return Err(Rejection::InvalidReplaceTarget {
                target: target.clone(),
                instrument,
            });
        }
        return Ok(Some(found));
    }

    if state.loop_count(instrument) >= instrument.capacity() {
        return Ok(state.oldest_loop(instrument));
    }
    Ok(None)
}

/// Voices from `voices` that some other drum loop already plays.
pub fn conflicting_voices(
    state: &SessionState,
    voices: &BTreeSet<DrumVoice>,
    excluding: Option<&LoopId>,
) -> Vec<DrumVoice> {
    let owned: BTreeSet<DrumVoice> = state
        .loops_for(Instrument::Drums)
        .filter(|l| Some(&l.id) != excluding)
        .flat_map(|l| l.drum_voices())
        .collect();
    voices.intersection(&owned).copied().collect()
}

/// Pull melodic notes onto `scale`.
///
/// Out-of-scale pitches become the scale root. Notes that then collide on
/// the same pitch and step collapse to the first one.
pub fn clamp_to_scale(notes: &[Note], scale: Scale, instrument: Instrument) -> Vec<Note> {
    let Some(root) = scale.root(instrument) else {
        return notes.to_vec();
    };

    let mut seen: BTreeSet<(Pitch, u8)> = BTreeSet::new();
    let mut clamped = Vec::with_capacity(notes.len());
    for note in notes {
        let mut note = note.clone();
        let in_scale = match &note.pitch {
            Pitch::Tone(name) => scale.contains(instrument, name),
            Pitch::Drum(_) => false,
        };
        if !in_scale {
            note.pitch = Pitch::tone(root.clone());
        }
        if seen.insert((note.pitch.clone(), note.step)) {
            clamped.push(note);
        }
    }
    clamped
}

/// Validate `draft` against `state` and build the next session state.
///
/// Nothing is mutated on failure.
pub fn prepare_commit(
    state: &SessionState,
    queue: &[Participant],
    author: &Participant,
    draft: &Draft,
    arbiter: &TurnArbiter,
    now: i64,
) -> Result<CommitOutcome, Rejection> {
    let turn = require_turn(state, &author.id, now)?;
    if draft.is_empty() {
        return Err(Rejection::EmptyDraft);
    }

    let instrument = draft.instrument();
    let replaced = resolve_replacement(state, draft)?.map(|l| l.id.clone());

    if instrument.is_drums() {
        let voices = conflicting_voices(state, &draft.drum_voices(), replaced.as_ref());
        if !voices.is_empty() {
            return Err(Rejection::SoundConflict { voices });
        }
    }

    let notes = if instrument.is_drums() {
        draft.notes().to_vec()
    } else {
        clamp_to_scale(draft.notes(), draft.scale(), instrument)
    };

    let next_turn = arbiter
        .rotate(
            turn,
            queue,
            RotationReason::Committed,
            state.composition_window_ms(),
            now,
        )
        .map(|decision| decision.turn().clone())
        .ok_or_else(|| Rejection::NotPresent(author.id.clone()))?;

    let new_loop = Loop::new(author, instrument, notes, now);
    let loop_id = new_loop.id.clone();

    let mut next = state.clone();
    if let Some(old) = &replaced {
        next.loops.retain(|l| &l.id != old);
    }
    next.loops.push(new_loop);
    next.active_turn = Some(next_turn.clone());

    debug!(
        loop_id = %loop_id,
        instrument = %instrument,
        replaced = ?replaced,
        next = %next_turn.user_id,
        "commit prepared"
    );

    Ok(CommitOutcome {
        next,
        loop_id,
        replaced,
        next_turn,
    })
}
