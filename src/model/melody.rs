use crate::error::Result;
use crate::model::note::{Note, RawNote};
use crate::model::rest::infer_rest_fractions;
use serde::Serialize;

/// An identified, onset-ordered sequence of notes.
///
/// Rest fractions are computed once when the melody is built. There are no
/// mutators: use [`MelodyBuilder`] to assemble one incrementally.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Melody {
    id: String,
    notes: Vec<Note>,
}

impl Melody {
    pub fn new(id: impl Into<String>, raw_notes: Vec<RawNote>) -> Self {
        Self {
            id: id.into(),
            notes: infer_rest_fractions(raw_notes),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
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
}

/// Collects notes for a melody; `build` consumes it, so a finished melody cannot be extended.
#[derive(Debug, Clone, Default)]
pub struct MelodyBuilder {
    id: String,
    notes: Vec<RawNote>,
}

impl MelodyBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            notes: Vec::new(),
        }
    }

    pub fn note(mut self, pitch: u8, onset: f64, duration: f64) -> Result<Self> {
        self.notes.push(RawNote::new(pitch, onset, duration)?);
        Ok(self)
    }

    pub fn push(&mut self, note: RawNote) {
        self.notes.push(note);
    }

    pub fn build(self) -> Melody {
        Melody::new(self.id, self.notes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::MelodyError;

    #[test]
    fn builder_sorts_and_annotates() {
        let melody = MelodyBuilder::new("tune")
            .note(64, 3.0, 1.0)
            .unwrap()
            .note(60, 0.0, 1.0)
            .unwrap()
            .build();

        assert_eq!(melody.id(), "tune");
        assert_eq!(melody.len(), 2);
        assert_eq!(melody.notes()[0].pitch(), 60);
        assert_eq!(melody.notes()[0].rest_fraction(), 0.0);
        assert!((melody.notes()[1].rest_fraction() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn builder_rejects_bad_notes() {
        let result = MelodyBuilder::new("bad").note(60, 0.0, -1.0);
        assert!(matches!(result, Err(MelodyError::InvalidArgument(_))));
    }

    #[test]
    fn invalid_raw_notes_never_reach_a_melody() {
        let bad: std::result::Result<Vec<RawNote>, _> = serde_json::from_str(
            r#"[{"pitch":60,"onset":0.0,"duration":1.0},{"pitch":250,"onset":-3.0,"duration":-2.0}]"#,
        );
        assert!(bad.is_err());

        let raw: Vec<RawNote> = serde_json::from_str(
            r#"[{"pitch":62,"onset":1.0,"duration":0.5},{"pitch":60,"onset":0.0,"duration":1.0}]"#,
        )
        .unwrap();
        let mut builder = MelodyBuilder::new("pushed");
        for note in raw {
            builder.push(note);
        }
        let melody = builder.build();

        assert_eq!(melody.len(), 2);
        assert!(melody.notes().iter().all(|n| {
            n.pitch() <= 127
                && n.onset() >= 0.0
                && n.duration() > 0.0
                && (0.0..1.0).contains(&n.rest_fraction())
        }));
    }

    #[test]
    fn empty_melody_is_valid() {
        let melody = MelodyBuilder::new("empty").build();
        assert!(melody.is_empty());
        assert_eq!(melody.notes().len(), 0);
    }
}
