use crate::error::{MelodyError, Result};
use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch number.
pub const MAX_PITCH: u8 = 127;

/// Largest rest fraction a note can carry; the range is half-open, `[0, 1)`.
pub const MAX_REST_FRACTION: f64 = 1.0 - f64::EPSILON / 2.0;

/// A sounding event before rest inference: pitch, onset and duration in quarter lengths.
///
/// Only constructible through [`RawNote::new`] (deserialization included), so every
/// instance already satisfies the note invariants.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(try_from = "RawNoteFields")]
pub struct RawNote {
    pitch: u8,
    onset: f64,
    duration: f64,
}

#[derive(Deserialize)]
struct RawNoteFields {
    pitch: u8,
    onset: f64,
    duration: f64,
}

impl TryFrom<RawNoteFields> for RawNote {
    type Error = MelodyError;

    fn try_from(fields: RawNoteFields) -> Result<Self> {
        RawNote::new(fields.pitch, fields.onset, fields.duration)
    }
}

impl RawNote {
    pub fn new(pitch: u8, onset: f64, duration: f64) -> Result<Self> {
        validate(pitch, onset, duration)?;
        Ok(Self {
            pitch,
            onset,
            duration,
        })
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

/// One note of a finalized melody.
///
/// `rest_fraction` is the share of the time since the previous note ended that is
/// silence, always within `[0, 1)`: the note itself always sounds for part of that time.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pitch: u8,
    onset: f64,
    duration: f64,
    rest_fraction: f64,
}

impl Note {
    pub fn new(pitch: u8, onset: f64, duration: f64, rest_fraction: f64) -> Result<Self> {
        validate(pitch, onset, duration)?;
        if !(0.0..1.0).contains(&rest_fraction) {
            return Err(MelodyError::InvalidArgument(format!(
                "rest fraction {rest_fraction} is outside [0, 1)"
            )));
        }

        Ok(Self {
            pitch,
            onset,
            duration,
            rest_fraction,
        })
    }

    pub(crate) fn from_raw(raw: RawNote, rest_fraction: f64) -> Self {
        Self {
            pitch: raw.pitch,
            onset: raw.onset,
            duration: raw.duration,
            rest_fraction,
        }
    }

    /// Same timing as `self`, different pitch.
    pub(crate) fn with_pitch(&self, pitch: u8) -> Self {
        Self { pitch, ..*self }
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn rest_fraction(&self) -> f64 {
        self.rest_fraction
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }
}

fn validate(pitch: u8, onset: f64, duration: f64) -> Result<()> {
    if pitch > MAX_PITCH {
        return Err(MelodyError::InvalidArgument(format!(
            "pitch {pitch} is outside the MIDI range [0..={MAX_PITCH}]"
        )));
    }
    if !onset.is_finite() || onset < 0.0 {
        return Err(MelodyError::InvalidArgument(format!(
            "onset {onset} must be a finite, non-negative quarter length"
        )));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MelodyError::InvalidArgument(format!(
            "duration {duration} must be a finite, positive quarter length"
        )));
    }
    Ok(())
}
