use crate::error::{MelodyError, Result};
use crate::model::melody::Melody;
use crate::model::note::Note;
use serde::Serialize;
use std::fmt;

/// Hashable stand-in for an n-gram's (pitch, duration) shape.
pub(crate) type ShapeKey = Vec<(u8, u64)>;

/// A window of consecutive notes taken from one melody.
///
/// Equality looks only at pitch and duration: onset and rest fraction describe where the
/// window sits in its melody, not the shape of the phrase.
#[derive(Serialize, Debug, Clone, Default)]
pub struct NGram {
    notes: Vec<Note>,
}

impl NGram {
    pub fn new(notes: Vec<Note>) -> Self {
        Self { notes }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The same rhythm with every pitch flattened to the first note's pitch.
    pub fn null_span(&self) -> NGram {
        let Some(first) = self.notes.first() else {
            return NGram::default();
        };

        let pitch = first.pitch();
        NGram::new(self.notes.iter().map(|note| note.with_pitch(pitch)).collect())
    }

    pub(crate) fn shape_key(&self) -> ShapeKey {
        self.notes
            .iter()
            .map(|note| (note.pitch(), note.duration().to_bits()))
            .collect()
    }
}

/// Flattens a shape key the same way [`NGram::null_span`] flattens an n-gram.
pub(crate) fn null_span_key(key: &ShapeKey) -> ShapeKey {
    let Some(&(pitch, _)) = key.first() else {
        return ShapeKey::new();
    };
    key.iter().map(|&(_, duration)| (pitch, duration)).collect()
}

impl PartialEq for NGram {
    fn eq(&self, other: &Self) -> bool {
        self.notes.len() == other.notes.len()
            && self
                .notes
                .iter()
                .zip(other.notes.iter())
                .all(|(a, b)| a.pitch() == b.pitch() && a.duration() == b.duration())
    }
}

/// `[{60,1},{62,0.5}]` by default; the alternate form (`{:#}`) adds the rest fraction and
/// drops the brackets: `{60,1,0}{62,0.5,0}`.
impl fmt::Display for NGram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            for note in &self.notes {
                write!(
                    f,
                    "{{{},{},{}}}",
                    note.pitch(),
                    note.duration(),
                    note.rest_fraction()
                )?;
            }
            return Ok(());
        }

        write!(f, "[")?;
        for (i, note) in self.notes.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{{{},{}}}", note.pitch(), note.duration())?;
        }
        write!(f, "]")
    }
}

/// Every window of `n` consecutive notes in `melody`, ordered by starting note.
///
/// Melodies shorter than `n` yield nothing; `n == 0` is rejected.
pub fn get_ngrams(melody: &Melody, n: usize) -> Result<Vec<NGram>> {
    if n == 0 {
        return Err(MelodyError::InvalidArgument(
            "n-gram size must be at least 1".into(),
        ));
    }

    Ok(melody
        .notes()
        .windows(n)
        .map(|window| NGram::new(window.to_vec()))
        .collect())
}
