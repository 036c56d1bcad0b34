//! Instruments, drum voices, scales, pitches and notes.

use serde::{Deserialize, Serialize};

use crate::domain::NoteId;
use crate::limits::{DRUM_LOOP_CAP, MELODIC_LOOP_CAP};

/// An instrument lane. Each committed loop belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Drums,
    Bass,
    Lead,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::Drums, Instrument::Bass, Instrument::Lead];

    pub fn as_str(&self) -> &'static str {
        match self {
            Instrument::Drums => "drums",
            Instrument::Bass => "bass",
            Instrument::Lead => "lead",
        }
    }

    pub fn is_drums(&self) -> bool {
        matches!(self, Instrument::Drums)
    }

    /// Maximum number of concurrently committed loops for this instrument.
    pub fn capacity(&self) -> usize {
        match self {
            Instrument::Drums => DRUM_LOOP_CAP,
            Instrument::Bass | Instrument::Lead => MELODIC_LOOP_CAP,
        }
    }

    /// Octave the scale pitches are spelled in.
    fn register(&self) -> Option<u8> {
        match self {
            Instrument::Drums => None,
            Instrument::Bass => Some(2),
            Instrument::Lead => Some(4),
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A drum row. A voice may be owned by at most one committed drum loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumVoice {
    Kick,
    Snare,
    HiHat,
    Clap,
}

impl DrumVoice {
    pub const ALL: [DrumVoice; 4] = [
        DrumVoice::Kick,
        DrumVoice::Snare,
        DrumVoice::HiHat,
        DrumVoice::Clap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrumVoice::Kick => "kick",
            DrumVoice::Snare => "snare",
            DrumVoice::HiHat => "hihat",
            DrumVoice::Clap => "clap",
        }
    }
}

impl std::fmt::Display for DrumVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scales rooted on C that melodic drafts are constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    Major,
    Minor,
    #[default]
    MajorPentatonic,
    MinorPentatonic,
    Dorian,
}

impl Scale {
    pub const ALL: [Scale; 5] = [
        Scale::Major,
        Scale::Minor,
        Scale::MajorPentatonic,
        Scale::MinorPentatonic,
        Scale::Dorian,
    ];

    /// Semitone offsets from the root.
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::MajorPentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
        }
    }

    /// Pitch names of this scale in the instrument's register, root first.
    ///
    /// Empty for drums.
    pub fn pitches(&self, instrument: Instrument) -> Vec<String> {
        let Some(octave) = instrument.register() else {
            return Vec::new();
        };
        self.intervals()
            .iter()
            .map(|&semi| format!("{}{}", NOTE_NAMES[semi as usize], octave))
            .collect()
    }

    /// First pitch of the scale for this instrument; the remap target for
    /// out-of-scale notes.
    pub fn root(&self, instrument: Instrument) -> Option<String> {
        self.pitches(instrument).into_iter().next()
    }

    pub fn contains(&self, instrument: Instrument, pitch: &str) -> bool {
        self.pitches(instrument).iter().any(|p| p == pitch)
    }
}

/// What a note plays: a drum row or a named pitch.
///
/// On the wire both are plain strings (`"kick"`, `"C4"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pitch {
    Drum(DrumVoice),
    Tone(String),
}

impl Pitch {
    pub fn tone(name: impl Into<String>) -> Self {
        Pitch::Tone(name.into())
    }

    pub fn drum_voice(&self) -> Option<DrumVoice> {
        match self {
            Pitch::Drum(voice) => Some(*voice),
            Pitch::Tone(_) => None,
        }
    }

    /// Whether this pitch can be played by `instrument` at all.
    ///
    /// Drums take drum voices; melodic instruments take well-formed pitch
    /// names like `C#4`. Scale membership is checked separately.
    pub fn fits(&self, instrument: Instrument) -> bool {
        match self {
            Pitch::Drum(_) => instrument.is_drums(),
            Pitch::Tone(name) => !instrument.is_drums() && is_pitch_name(name),
        }
    }
}

impl std::fmt::Display for Pitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pitch::Drum(voice) => write!(f, "{}", voice),
            Pitch::Tone(name) => f.write_str(name),
        }
    }
}

/// `<letter>[#]<octave>`, e.g. `A3`, `F#2`.
fn is_pitch_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(letter) = chars.next() else {
        return false;
    };
    if !('A'..='G').contains(&letter) {
        return false;
    }
    let rest = chars.as_str();
    let octave = rest.strip_prefix('#').unwrap_or(rest);
    !octave.is_empty() && octave.chars().all(|c| c.is_ascii_digit())
}

/// A single hit or held note within a loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub pitch: Pitch,
    /// Bounded `[0, STEP_COUNT)`.
    pub step: u8,
    /// Length in steps, at least 1.
    pub duration: u8,
    /// 0.0 ..= 1.0
    pub velocity: f32,
}

impl Note {
    pub const DEFAULT_VELOCITY: f32 = 0.8;

    pub fn new(pitch: Pitch, step: u8) -> Self {
        Self {
            id: NoteId::new(),
            pitch,
            step,
            duration: 1,
            velocity: Self::DEFAULT_VELOCITY,
        }
    }

    /// Clamp into `0.0..=1.0`. Non-finite input falls back to the default,
    /// since JSON has no encoding for NaN.
    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = if velocity.is_finite() {
            velocity.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_VELOCITY
        };
        self
    }
}
