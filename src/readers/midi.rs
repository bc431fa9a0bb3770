use crate::error::{MelodyError, Result};
use crate::model::melody::Melody;
use crate::model::note::RawNote;
use crate::readers::{MelodyReader, SourceNote, has_extension};
use log::{debug, info, warn};
use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// A (track index, channel) pair. Each one is a candidate melodic line.
type Voice = (usize, u8);

/// Reads Standard MIDI Files.
///
/// Only the densest voice, the track/channel pair with the most notes, becomes the melody.
/// Notes that start together within that voice collapse to the highest pitch.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidiReader;

impl MelodyReader for MidiReader {
    fn accept(&self, file_name: &str) -> bool {
        has_extension(file_name, &["mid", "midi"])
    }

    fn read(&self, melody_id: &str, path: &Path) -> Result<Melody> {
        let bytes = fs::read(path).map_err(|e| MelodyError::io(path, e))?;
        self.read_bytes(melody_id, &bytes, path)
    }
}

impl MidiReader {
    /// Parses an in-memory SMF. `source_path` is only used for error messages.
    pub fn read_bytes(&self, melody_id: &str, bytes: &[u8], source_path: &Path) -> Result<Melody> {
        let smf = Smf::parse(bytes)
            .map_err(|e| MelodyError::parse(source_path, format!("invalid MIDI data: {e}")))?;

        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(t) => t.as_int() as u64,
            Timing::Timecode(_fps, _subframe) => {
                return Err(MelodyError::parse(
                    source_path,
                    "SMPTE timecode midi timing is not currently supported..!",
                ));
            }
        };

        debug!(
            "MIDI format: {:?}, tracks: {}, ticks per quarter note: {}",
            smf.header.format,
            smf.tracks.len(),
            ticks_per_quarter
        );

        let mut voices: BTreeMap<Voice, Vec<SourceNote>> = BTreeMap::new();

        for (track_idx, track) in smf.tracks.iter().enumerate() {
            let mut abs_tick: u64 = 0;
            let mut open_notes: HashMap<(u8, u8), Vec<u64>> = HashMap::new();

            for event in track.iter() {
                abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

                if let TrackEventKind::Midi { channel, message } = &event.kind {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open_notes
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push(abs_tick);
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            close_note(
                                &mut open_notes,
                                voices.entry((track_idx, ch)).or_default(),
                                ch,
                                key.as_int(),
                                abs_tick,
                                ticks_per_quarter,
                            );
                        }
                        _ => {}
                    }
                }
            }

            for ((ch, key), stack) in open_notes.into_iter() {
                for start_tick in stack {
                    let end_tick = if abs_tick > start_tick {
                        abs_tick
                    } else {
                        start_tick + ticks_per_quarter
                    };

                    warn!(
                        "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                        key, ch, start_tick, end_tick
                    );

                    voices.entry((track_idx, ch)).or_default().push(SourceNote::Midi {
                        key,
                        start_tick,
                        end_tick,
                        ticks_per_quarter,
                    });
                }
            }
        }

        let voice_count = voices.values().filter(|notes| !notes.is_empty()).count();
        let Some(((track_idx, ch), events)) = densest_voice(voices) else {
            debug!("No notes found in '{}'", source_path.display());
            return Ok(Melody::new(melody_id, Vec::new()));
        };

        if voice_count > 1 {
            info!(
                "'{}' has {} voices, reading track {} channel {} ({} notes)..!",
                source_path.display(),
                voice_count,
                track_idx,
                ch,
                events.len()
            );
        }

        let raw_notes = skyline(events.iter().filter_map(SourceNote::to_raw).collect());
        Ok(Melody::new(melody_id, raw_notes))
    }
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<u64>>,
    voice: &mut Vec<SourceNote>,
    ch: u8,
    key: u8,
    abs_tick: u64,
    ticks_per_quarter: u64,
) {
    if let Some(start_tick) = open_notes.get_mut(&(ch, key)).and_then(|stack| stack.pop()) {
        voice.push(SourceNote::Midi {
            key,
            start_tick,
            end_tick: abs_tick,
            ticks_per_quarter,
        });
    } else {
        debug!("Orphaned NoteOff for {} ch{} at tick {}..!", key, ch, abs_tick);
    }
}

/// The voice with the most notes; ties go to the lowest track, then the lowest channel.
fn densest_voice(voices: BTreeMap<Voice, Vec<SourceNote>>) -> Option<(Voice, Vec<SourceNote>)> {
    let mut best: Option<(Voice, Vec<SourceNote>)> = None;

    for (voice, notes) in voices.into_iter() {
        if notes.is_empty() {
            continue;
        }
        if best.as_ref().is_none_or(|(_, b)| notes.len() > b.len()) {
            best = Some((voice, notes));
        }
    }

    best
}

/// Keeps only the highest pitch among notes sharing an onset.
fn skyline(mut notes: Vec<RawNote>) -> Vec<RawNote> {
    notes.sort_by(|a, b| {
        a.onset()
            .total_cmp(&b.onset())
            .then(b.pitch().cmp(&a.pitch()))
    });

    let before = notes.len();
    notes.dedup_by(|later, kept| later.onset() == kept.onset());

    if notes.len() < before {
        debug!(
            "Collapsed {} simultaneous note(s) to the highest pitch",
            before - notes.len()
        );
    }

    notes
}
