use crate::error::Result;
use crate::model::melody::Melody;
use crate::model::note::{MAX_PITCH, RawNote};
use log::debug;
use std::path::Path;

pub(crate) mod abc;
pub(crate) mod midi;

pub use abc::AbcReader;
pub use midi::MidiReader;

/// A file format that can be turned into a [`Melody`].
pub trait MelodyReader {
    /// Whether this reader handles `file_name`, judged by its extension.
    fn accept(&self, file_name: &str) -> bool;

    /// Parses the file at `path` into a melody called `melody_id`.
    fn read(&self, melody_id: &str, path: &Path) -> Result<Melody>;
}

/// Every reader this crate ships with.
pub fn default_readers() -> Vec<Box<dyn MelodyReader>> {
    vec![Box::new(MidiReader), Box::new(AbcReader)]
}

/// Picks the first reader from `readers` that accepts `file_name`.
pub fn reader_for<'a>(
    readers: &'a [Box<dyn MelodyReader>],
    file_name: &str,
) -> Option<&'a dyn MelodyReader> {
    readers
        .iter()
        .find(|reader| reader.accept(file_name))
        .map(|reader| reader.as_ref())
}

pub(crate) fn has_extension(file_name: &str, extensions: &[&str]) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// A note as a specific input format describes it. Readers convert each one
/// into a [`RawNote`] exactly once, so everything downstream sees one note type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceNote {
    /// A closed NoteOn/NoteOff pair, still in file ticks.
    Midi {
        key: u8,
        start_tick: u64,
        end_tick: u64,
        ticks_per_quarter: u64,
    },

    /// An ABC note with its position already resolved to quarter lengths.
    /// The pitch may fall outside the MIDI range after octave marks.
    Abc {
        pitch: i32,
        onset: f64,
        quarter_length: f64,
    },
}

impl SourceNote {
    /// Converts to a [`RawNote`], or `None` when the note is unplayable (zero length,
    /// or a pitch that octave marks pushed off the MIDI keyboard).
    pub fn to_raw(&self) -> Option<RawNote> {
        let (pitch, onset, duration) = match *self {
            SourceNote::Midi {
                key,
                start_tick,
                end_tick,
                ticks_per_quarter,
            } => {
                if end_tick <= start_tick || ticks_per_quarter == 0 {
                    debug!(
                        "Skipping zero/negative length midi note {}, start: {} end: {}..!",
                        key, start_tick, end_tick
                    );
                    return None;
                }

                let tpq = ticks_per_quarter as f64;
                (
                    key as i32,
                    start_tick as f64 / tpq,
                    (end_tick - start_tick) as f64 / tpq,
                )
            }
            SourceNote::Abc {
                pitch,
                onset,
                quarter_length,
            } => (pitch, onset, quarter_length),
        };

        if !(0..=MAX_PITCH as i32).contains(&pitch) {
            debug!("Dropping out-of-range pitch {}..!", pitch);
            return None;
        }

        RawNote::new(pitch as u8, onset, duration).ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extension_sniffing() {
        let readers = default_readers();

        assert!(reader_for(&readers, "tune.mid").is_some());
        assert!(reader_for(&readers, "TUNE.MIDI").is_some());
        assert!(reader_for(&readers, "reel.abc").is_some());
        assert!(reader_for(&readers, "notes.txt").is_none());
        assert!(reader_for(&readers, "mid").is_none());

        assert!(MidiReader.accept("a/b/c.Mid"));
        assert!(!MidiReader.accept("c.abc"));
        assert!(AbcReader.accept("c.ABC"));
        assert!(!AbcReader.accept("c.midi"));
    }

    #[test]
    fn midi_source_converts_ticks_to_quarters() {
        let raw = SourceNote::Midi {
            key: 60,
            start_tick: 240,
            end_tick: 720,
            ticks_per_quarter: 480,
        }
        .to_raw()
        .unwrap();

        assert_eq!(raw.pitch(), 60);
        assert_eq!(raw.onset(), 0.5);
        assert_eq!(raw.duration(), 1.0);
    }

    #[test]
    fn unplayable_sources_are_dropped() {
        let zero = SourceNote::Midi {
            key: 60,
            start_tick: 10,
            end_tick: 10,
            ticks_per_quarter: 480,
        };
        assert!(zero.to_raw().is_none());

        let too_high = SourceNote::Abc {
            pitch: 140,
            onset: 0.0,
            quarter_length: 1.0,
        };
        assert!(too_high.to_raw().is_none());
    }
}
