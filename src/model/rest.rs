use crate::model::note::{MAX_REST_FRACTION, Note, RawNote};

/// Annotates each note with the fraction of silence that precedes it.
///
/// Rests are not explicit events in either input format; they are the gaps
/// between one note's end and the next note's onset. For every note after the
/// first, `rest_fraction = (onset - last_off) / (end - last_off)`, where
/// `last_off` is the end of the previously processed note. Overlapping notes and
/// zero-length spans yield 0.0, and the result is clamped to `[0, 1)`.
///
/// The input is stable-sorted by onset first, so callers may pass events in any order.
pub fn infer_rest_fractions(mut raw: Vec<RawNote>) -> Vec<Note> {
    raw.sort_by(|a, b| a.onset().total_cmp(&b.onset()));

    let mut notes = Vec::with_capacity(raw.len());
    let mut last_off: Option<f64> = None;

    for note in raw.into_iter() {
        let rest_fraction = match last_off {
            None => 0.0,
            Some(last_off) => {
                let time_span = note.end() - last_off;
                let gap_before = note.onset() - last_off;

                if time_span > 0.0 {
                    (gap_before / time_span).clamp(0.0, MAX_REST_FRACTION)
                } else {
                    0.0
                }
            }
        };

        notes.push(Note::from_raw(note, rest_fraction));

        // always extend from this note's end, even when it ends before the previous one
        last_off = Some(note.end());
    }

    notes
}
