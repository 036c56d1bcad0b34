//! The composer's local, unpublished draft.
//!
//! A draft is edited freely during a turn and only becomes shared state
//! through a commit. Edits are validated as they happen so a draft never
//! holds an off-grid step or a pitch the instrument cannot play.

use std::collections::BTreeSet;

use campproto::{DrumVoice, Instrument, LoopId, Note, Pitch, Scale, SessionState, STEP_COUNT};

use crate::commit;
use crate::error::Rejection;

#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    instrument: Instrument,
    scale: Scale,
    notes: Vec<Note>,
    replace_target: Option<LoopId>,
}

impl Default for Draft {
    fn default() -> Self {
        Self::new(Instrument::Drums)
    }
}

impl Draft {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            scale: Scale::default(),
            notes: Vec::new(),
            replace_target: None,
        }
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn replace_target(&self) -> Option<&LoopId> {
        self.replace_target.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_active(&self, pitch: &Pitch, step: u8) -> bool {
        self.find(pitch, step).is_some()
    }

    /// Flip a grid cell. Returns whether the cell is now on.
    pub fn toggle(&mut self, pitch: Pitch, step: u8) -> Result<bool, Rejection> {
        self.check(&pitch, step)?;
        if let Some(index) = self.find(&pitch, step) {
            self.notes.remove(index);
            return Ok(false);
        }
        self.notes.push(Note::new(pitch, step));
        Ok(true)
    }

    pub fn set_velocity(&mut self, pitch: &Pitch, step: u8, velocity: f32) -> Result<(), Rejection> {
        let index = self.find(pitch, step).ok_or_else(|| Rejection::UnknownNote {
            pitch: pitch.clone(),
            step,
        })?;
        let note = self.notes.remove(index).with_velocity(velocity);
        self.notes.insert(index, note);
        Ok(())
    }

    /// Switch instrument. Notes and replace target belong to the old
    /// instrument and are dropped.
    pub fn set_instrument(&mut self, instrument: Instrument) {
        if instrument != self.instrument {
            self.instrument = instrument;
            self.notes.clear();
            self.replace_target = None;
        }
    }

    /// Change scale. Existing notes are left alone and clamped at commit.
    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    pub fn set_replace_target(&mut self, target: Option<LoopId>) {
        self.replace_target = target;
    }

    pub fn clear(&mut self) {
        self.notes.clear();
        self.replace_target = None;
    }

    pub fn drum_voices(&self) -> BTreeSet<DrumVoice> {
        self.notes.iter().filter_map(|n| n.pitch.drum_voice()).collect()
    }

    /// Drum voices in this draft already owned by another committed loop.
    ///
    /// The loop this draft would replace does not count. Empty for melodic
    /// drafts and whenever the commit could not proceed anyway.
    pub fn conflicting_voices(&self, state: &SessionState) -> Vec<DrumVoice> {
        if !self.instrument.is_drums() {
            return Vec::new();
        }
        let Ok(replaced) = commit::resolve_replacement(state, self) else {
            return Vec::new();
        };
        commit::conflicting_voices(state, &self.drum_voices(), replaced.map(|l| &l.id))
    }

    fn find(&self, pitch: &Pitch, step: u8) -> Option<usize> {
        self.notes
            .iter()
            .position(|n| n.step == step && &n.pitch == pitch)
    }

    fn check(&self, pitch: &Pitch, step: u8) -> Result<(), Rejection> {
        if step >= STEP_COUNT {
            return Err(Rejection::StepOutOfRange(step));
        }
        if !pitch.fits(self.instrument) {
            return Err(Rejection::PitchMismatch {
                pitch: pitch.clone(),
                instrument: self.instrument,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campproto::{Loop, Participant, ParticipantId};

    const KICK: Pitch = Pitch::Drum(DrumVoice::Kick);

    #[test]
    fn test_toggle_on_and_off() {
        let mut draft = Draft::new(Instrument::Drums);
        assert_eq!(draft.toggle(KICK, 0), Ok(true));
        assert!(draft.is_active(&KICK, 0));
        assert_eq!(draft.toggle(KICK, 0), Ok(false));
        assert!(draft.is_empty());
    }

    #[test]
    fn test_rejects_off_grid_and_wrong_family() {
        let mut draft = Draft::new(Instrument::Drums);
        assert_eq!(draft.toggle(KICK, STEP_COUNT), Err(Rejection::StepOutOfRange(16)));
        assert!(matches!(
            draft.toggle(Pitch::tone("C4"), 0),
            Err(Rejection::PitchMismatch { .. })
        ));

        let mut bass = Draft::new(Instrument::Bass);
        assert!(bass.toggle(KICK, 0).is_err());
        assert!(bass.toggle(Pitch::tone("H2"), 0).is_err());
        assert_eq!(bass.toggle(Pitch::tone("D#2"), 3), Ok(true));
    }

    #[test]
    fn test_velocity_edits_existing_note() {
        let mut draft = Draft::new(Instrument::Drums);
        draft.toggle(KICK, 4).unwrap();
        draft.set_velocity(&KICK, 4, 1.7).unwrap();
        assert_eq!(draft.notes()[0].velocity, 1.0);
        draft.set_velocity(&KICK, 4, f32::NAN).unwrap();
        assert_eq!(draft.notes()[0].velocity, Note::DEFAULT_VELOCITY);
        assert!(matches!(
            draft.set_velocity(&KICK, 5, 0.5),
            Err(Rejection::UnknownNote { step: 5, .. })
        ));
    }

    #[test]
    fn test_instrument_switch_clears() {
        let mut draft = Draft::new(Instrument::Drums);
        draft.toggle(KICK, 0).unwrap();
        draft.set_replace_target(Some(LoopId::from("old")));

        draft.set_instrument(Instrument::Drums);
        assert_eq!(draft.len(), 1);

        draft.set_instrument(Instrument::Lead);
        assert!(draft.is_empty());
        assert!(draft.replace_target().is_none());
    }

    #[test]
    fn test_conflicts_ignore_the_replaced_loop() {
        let author = Participant::new("a", "#fff", 0).with_id("a");
        let mut state = SessionState::genesis(ParticipantId::from("a"), 120.0, 4, None);
        let mut owned = Loop::new(&author, Instrument::Drums, vec![Note::new(KICK, 0)], 1);
        owned.id = LoopId::from("owned");
        state.loops.push(owned);

        let mut draft = Draft::new(Instrument::Drums);
        draft.toggle(KICK, 8).unwrap();
        draft.toggle(Pitch::Drum(DrumVoice::Snare), 4).unwrap();
        assert_eq!(draft.conflicting_voices(&state), vec![DrumVoice::Kick]);

        draft.set_replace_target(Some(LoopId::from("owned")));
        assert!(draft.conflicting_voices(&state).is_empty());
    }
}
