//! The replicated session aggregate and its parts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{LoopId, ParticipantId};
use crate::limits::{clamp_bpm, clamp_window_cycles, composition_window_ms};
use crate::music::{DrumVoice, Instrument, Note, Pitch};

/// A present peer, as carried in presence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub color: String,
    /// Local wall-clock epoch millis at presence-enter time.
    pub joined_at: i64,
}

impl Participant {
    pub fn new(name: impl Into<String>, color: impl Into<String>, joined_at: i64) -> Self {
        Self {
            id: ParticipantId::new(),
            name: name.into(),
            color: color.into(),
            joined_at,
        }
    }

    pub fn with_id(mut self, id: impl Into<ParticipantId>) -> Self {
        self.id = id.into();
        self
    }
}

/// The time-boxed right of one participant to compose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub user_id: ParticipantId,
    pub started_at: i64,
    pub ends_at: i64,
}

impl Turn {
    pub fn new(user_id: ParticipantId, started_at: i64, window_ms: i64) -> Self {
        Self {
            user_id,
            started_at,
            ends_at: started_at + window_ms,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.ends_at
    }

    pub fn remaining_ms(&self, now: i64) -> i64 {
        (self.ends_at - now).max(0)
    }
}

/// A committed, immutable sequence of notes for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loop {
    pub id: LoopId,
    pub user_id: ParticipantId,
    pub user_name: String,
    pub user_color: String,
    pub instrument: Instrument,
    pub notes: Vec<Note>,
    pub created_at: i64,
}

impl Loop {
    pub fn new(author: &Participant, instrument: Instrument, notes: Vec<Note>, now: i64) -> Self {
        Self {
            id: LoopId::new(),
            user_id: author.id.clone(),
            user_name: author.name.clone(),
            user_color: author.color.clone(),
            instrument,
            notes,
            created_at: now,
        }
    }

    /// Does any note in this loop sound `pitch` starting at `step`?
    pub fn is_active(&self, pitch: &Pitch, step: u8) -> bool {
        self.notes.iter().any(|n| n.step == step && &n.pitch == pitch)
    }

    /// Drum rows used by this loop. Empty for melodic loops.
    pub fn drum_voices(&self) -> BTreeSet<DrumVoice> {
        self.notes.iter().filter_map(|n| n.pitch.drum_voice()).collect()
    }
}

/// The single shared aggregate, replicated whole through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub bpm: f64,
    pub loops: Vec<Loop>,
    pub active_turn: Option<Turn>,
    pub version: u64,
    pub creator_id: ParticipantId,
    pub window_cycles: u32,
    /// Epoch millis when loop position was zero; `None` while paused.
    pub playback_started_at: Option<i64>,
}

impl SessionState {
    /// The first state of a session. Inputs are clamped; version is left at
    /// zero for the publisher to stamp.
    pub fn genesis(
        creator_id: ParticipantId,
        bpm: f64,
        window_cycles: u32,
        playback_started_at: Option<i64>,
    ) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            loops: Vec::new(),
            active_turn: None,
            version: 0,
            creator_id,
            window_cycles: clamp_window_cycles(window_cycles),
            playback_started_at,
        }
    }

    pub fn composition_window_ms(&self) -> i64 {
        composition_window_ms(self.bpm, self.window_cycles)
    }

    pub fn turn_holder(&self) -> Option<&ParticipantId> {
        self.active_turn.as_ref().map(|t| &t.user_id)
    }

    pub fn is_playing(&self) -> bool {
        self.playback_started_at.is_some()
    }

    pub fn loops_for(&self, instrument: Instrument) -> impl Iterator<Item = &Loop> + '_ {
        self.loops.iter().filter(move |l| l.instrument == instrument)
    }

    pub fn loop_count(&self, instrument: Instrument) -> usize {
        self.loops_for(instrument).count()
    }

    pub fn find_loop(&self, id: &LoopId) -> Option<&Loop> {
        self.loops.iter().find(|l| &l.id == id)
    }

    /// Oldest loop of `instrument` by `createdAt`, id breaking ties.
    pub fn oldest_loop(&self, instrument: Instrument) -> Option<&Loop> {
        self.loops_for(instrument)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
    }
}
