use crate::error::{MelodyError, Result};
use crate::model::melody::Melody;
use crate::readers::{MelodyReader, SourceNote, has_extension};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Semitones above C for each step, indexed C D E F G A B.
const STEP_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Position on the circle of fifths of each natural major key, indexed C D E F G A B.
const MAJOR_FIFTHS: [i32; 7] = [0, 2, 4, -1, 1, 3, 5];

/// Steps in the order sharps (F C G D A E B) and flats (B E A D G C F) enter a key signature.
const SHARP_ORDER: [usize; 7] = [3, 0, 4, 1, 5, 2, 6];
const FLAT_ORDER: [usize; 7] = [6, 2, 5, 1, 4, 0, 3];

/// Middle C, the pitch of an unmarked `C`.
const MIDDLE_C: i32 = 60;

/// Reads ABC notation.
///
/// Only the first tune of a file and the first voice of that tune are read. Chords keep
/// their highest note; grace notes, decorations, annotations and lyrics are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbcReader;

impl MelodyReader for AbcReader {
    fn accept(&self, file_name: &str) -> bool {
        has_extension(file_name, &["abc"])
    }

    fn read(&self, melody_id: &str, path: &Path) -> Result<Melody> {
        let text = fs::read_to_string(path).map_err(|e| MelodyError::io(path, e))?;
        self.read_str(melody_id, &text, path)
    }
}

impl AbcReader {
    /// Parses ABC text. `source_path` is only used for error messages.
    pub fn read_str(&self, melody_id: &str, text: &str, source_path: &Path) -> Result<Melody> {
        let mut tune = TuneParser::new(source_path);
        let mut in_body = false;

        for line in text.lines() {
            // an empty line terminates the tune; comment-only lines do not
            if in_body && line.trim().is_empty() {
                break;
            }

            let line = strip_comment(line).trim();
            if let Some((field, value)) = field_line(line) {
                if field == 'X' && in_body {
                    debug!("Ignoring further tunes in '{}'", source_path.display());
                    break;
                }

                tune.field(field, value, in_body)?;
                if field == 'K' && !in_body {
                    in_body = true;
                    tune.start_body();
                }
                continue;
            }

            if in_body {
                tune.body_line(line)?;
            }
        }

        if !in_body {
            return Err(MelodyError::parse(
                source_path,
                "no K: field found, not an ABC tune..!",
            ));
        }

        let raw_notes = tune.notes.iter().filter_map(SourceNote::to_raw).collect();
        Ok(Melody::new(melody_id, raw_notes))
    }
}

/// The most recent note or rest, kept so broken rhythm can re-balance it.
#[derive(Debug, Clone, Copy)]
struct LastEvent {
    onset: f64,
    length: f64,
    note: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Tuplet {
    ratio: f64,
    remaining: usize,
}

/// A single note token: its pitch and its length as a multiple of the unit note length.
#[derive(Debug, Clone, Copy)]
struct NoteToken {
    pitch: i32,
    multiplier: f64,
}

/// Running state while walking one tune.
struct TuneParser<'p> {
    path: &'p Path,
    /// Meter as (numerator, denominator), `None` for free meter.
    meter: Option<(u32, u32)>,
    /// Unit note length in quarter lengths.
    unit: Option<f64>,
    /// Alteration in semitones per step from the key signature.
    key: [i32; 7],
    /// Accidentals written earlier in the current bar, keyed by (step, octave).
    bar_accidentals: HashMap<(usize, i32), i32>,
    time: f64,
    notes: Vec<SourceNote>,
    last: Option<LastEvent>,
    next_factor: f64,
    tuplet: Option<Tuplet>,
    primary_voice: Option<String>,
    in_primary: bool,
}

impl<'p> TuneParser<'p> {
    fn new(path: &'p Path) -> Self {
        Self {
            path,
            meter: None,
            unit: None,
            key: [0; 7],
            bar_accidentals: HashMap::new(),
            time: 0.0,
            notes: Vec::new(),
            last: None,
            next_factor: 1.0,
            tuplet: None,
            primary_voice: None,
            in_primary: true,
        }
    }

    fn error(&self, reason: impl Into<String>) -> MelodyError {
        MelodyError::parse(self.path, reason)
    }

    fn field(&mut self, field: char, value: &str, in_body: bool) -> Result<()> {
        match field {
            'L' => {
                let fraction = parse_fraction(value)
                    .ok_or_else(|| self.error(format!("invalid unit note length 'L:{value}'")))?;
                self.unit = Some(fraction * 4.0);
            }
            'M' => self.meter = parse_meter(value),
            'K' => {
                self.key = parse_key(value);
                self.bar_accidentals.clear();
            }
            'V' => {
                let id = value.split_whitespace().next().unwrap_or_default();
                if self.primary_voice.is_none() {
                    self.primary_voice = Some(id.to_string());
                }
                if in_body {
                    self.in_primary = self.primary_voice.as_deref() == Some(id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Settles the unit note length once the header is complete.
    fn start_body(&mut self) {
        if self.unit.is_none() {
            let short_meter = self
                .meter
                .is_some_and(|(num, den)| (num as f64) / (den as f64) < 0.75);
            self.unit = Some(if short_meter { 0.25 } else { 0.5 });
        }
    }

    fn unit(&self) -> f64 {
        self.unit.unwrap_or(0.5)
    }

    fn body_line(&mut self, line: &str) -> Result<()> {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if !self.in_primary {
                i = match inline_field(&chars, i) {
                    Some((field, value, end)) if field == 'V' => {
                        self.field(field, &value, true)?;
                        end
                    }
                    _ => i + 1,
                };
                continue;
            }

            i = match c {
                '"' | '{' => {
                    let close = if c == '"' { '"' } else { '}' };
                    find(&chars, i + 1, close).map_or(chars.len(), |end| end + 1)
                }
                '!' | '+' => find(&chars, i + 1, c).map_or(i + 1, |end| end + 1),
                '|' => {
                    self.bar_accidentals.clear();
                    skip_volta(&chars, i + 1)
                }
                '[' => self.bracket(&chars, i)?,
                '(' => self.tuplet(&chars, i),
                '>' | '<' => self.broken_rhythm(&chars, i),
                '^' | '_' | '=' | 'A'..='G' | 'a'..='g' => {
                    let (token, end) = self.note(&chars, i)?;
                    if let Some(token) = token {
                        self.emit(Some(token.pitch), token.multiplier * self.unit());
                    }
                    end
                }
                'z' | 'x' => {
                    let mut end = i + 1;
                    let multiplier = self.length(&chars, &mut end)?;
                    self.emit(None, multiplier * self.unit());
                    end
                }
                'Z' | 'X' => {
                    let mut end = i + 1;
                    let bars = digits(&chars, &mut end).unwrap_or(1);
                    let bar_length = self
                        .meter
                        .map_or(4.0, |(num, den)| 4.0 * num as f64 / den as f64);
                    self.time += bars as f64 * bar_length;
                    self.last = None;
                    end
                }
                '&' => {
                    debug!("Skipping voice overlay in '{}'", self.path.display());
                    find(&chars, i + 1, '|').unwrap_or(chars.len())
                }
                _ => i + 1,
            };
        }

        Ok(())
    }

    /// Handles everything that opens with `[`: inline fields, chords, volta brackets and bars.
    fn bracket(&mut self, chars: &[char], i: usize) -> Result<usize> {
        if let Some((field, value, end)) = inline_field(chars, i) {
            self.field(field, &value, true)?;
            return Ok(end);
        }

        match chars.get(i + 1) {
            Some(d) if d.is_ascii_digit() => return Ok(skip_volta(chars, i + 1)),
            Some('|') => {
                self.bar_accidentals.clear();
                return Ok(i + 2);
            }
            _ => {}
        }

        let mut j = i + 1;
        let mut highest: Option<NoteToken> = None;
        let mut first_multiplier: Option<f64> = None;

        while j < chars.len() && chars[j] != ']' {
            match chars[j] {
                '^' | '_' | '=' | 'A'..='G' | 'a'..='g' => {
                    let (token, end) = self.note(chars, j)?;
                    if let Some(token) = token {
                        first_multiplier.get_or_insert(token.multiplier);
                        if highest.is_none_or(|h| token.pitch > h.pitch) {
                            highest = Some(token);
                        }
                    }
                    j = end;
                }
                '"' => j = find(chars, j + 1, '"').map_or(chars.len(), |end| end + 1),
                '!' => j = find(chars, j + 1, '!').map_or(j + 1, |end| end + 1),
                _ => j += 1,
            }
        }

        // step over ']' and read the chord's own length
        j += 1;
        let outer = self.length(chars, &mut j)?;

        if let (Some(top), Some(multiplier)) = (highest, first_multiplier) {
            self.emit(Some(top.pitch), multiplier * outer * self.unit());
        }

        Ok(j)
    }

    /// Parses `(p`, `(p:q` or `(p:q:r`. A bare `(` opens a slur and is skipped.
    fn tuplet(&mut self, chars: &[char], i: usize) -> usize {
        let mut j = i + 1;
        let Some(p) = digits(chars, &mut j) else {
            return j;
        };

        let mut q = None;
        let mut r = None;
        if chars.get(j) == Some(&':') {
            j += 1;
            q = digits(chars, &mut j);
            if chars.get(j) == Some(&':') {
                j += 1;
                r = digits(chars, &mut j);
            }
        }

        if p == 0 {
            debug!("Ignoring empty tuplet in '{}'", self.path.display());
            return j;
        }

        let compound = self.meter.is_some_and(|(num, _)| num > 3 && num % 3 == 0);
        let q = q.unwrap_or(match p {
            2 | 4 | 8 => 3,
            3 | 6 => 2,
            _ if compound => 3,
            _ => 2,
        });

        self.tuplet = Some(Tuplet {
            ratio: q as f64 / p as f64,
            remaining: r.unwrap_or(p) as usize,
        });

        j
    }

    /// `>` dots the previous event and halves the next; `<` does the reverse.
    /// Doubling the symbol (`>>`) doubles the effect.
    fn broken_rhythm(&mut self, chars: &[char], i: usize) -> usize {
        let symbol = chars[i];
        let mut j = i;
        while chars.get(j) == Some(&symbol) {
            j += 1;
        }

        let short = 0.5f64.powi((j - i) as i32);
        let long = 2.0 - short;
        let (previous, next) = if symbol == '>' {
            (long, short)
        } else {
            (short, long)
        };

        let Some(last) = self.last.as_mut() else {
            debug!("Broken rhythm without a preceding note..!");
            return j;
        };

        let length = last.length * previous;
        if let Some(SourceNote::Abc { quarter_length, .. }) =
            last.note.and_then(|idx| self.notes.get_mut(idx))
        {
            *quarter_length = length;
        }
        last.length = length;
        self.time = last.onset + length;
        self.next_factor = next;

        j
    }

    /// Reads one note starting at `i`: accidental, letter, octave marks and length.
    fn note(&mut self, chars: &[char], i: usize) -> Result<(Option<NoteToken>, usize)> {
        let mut j = i;
        let accidental = match chars[j] {
            '^' if chars.get(j + 1) == Some(&'^') => Some(2),
            '_' if chars.get(j + 1) == Some(&'_') => Some(-2),
            '^' => Some(1),
            '_' => Some(-1),
            '=' => Some(0),
            _ => None,
        };
        j += match accidental {
            Some(2) | Some(-2) => 2,
            Some(_) => 1,
            None => 0,
        };

        let Some(letter) = chars.get(j).copied().filter(char::is_ascii_alphabetic) else {
            debug!("Stray accidental in '{}'", self.path.display());
            return Ok((None, j));
        };
        let Some(step) = step_index(letter) else {
            debug!("Stray accidental in '{}'", self.path.display());
            return Ok((None, j));
        };
        j += 1;

        let mut octave = if letter.is_ascii_lowercase() { 1 } else { 0 };
        while let Some(mark) = chars.get(j) {
            match mark {
                '\'' => octave += 1,
                ',' => octave -= 1,
                _ => break,
            }
            j += 1;
        }

        let alteration = match accidental {
            Some(alteration) => {
                self.bar_accidentals.insert((step, octave), alteration);
                alteration
            }
            None => self
                .bar_accidentals
                .get(&(step, octave))
                .copied()
                .unwrap_or(self.key[step]),
        };

        let multiplier = self.length(chars, &mut j)?;
        let pitch = MIDDLE_C + 12 * octave + STEP_SEMITONES[step] + alteration;

        Ok((Some(NoteToken { pitch, multiplier }), j))
    }

    /// Parses a length suffix such as `2`, `/`, `//`, `3/2`. No suffix means 1.
    fn length(&self, chars: &[char], j: &mut usize) -> Result<f64> {
        let numerator = digits(chars, j).unwrap_or(1) as f64;
        let mut denominator = 1.0;

        while chars.get(*j) == Some(&'/') {
            *j += 1;
            denominator *= match digits(chars, j) {
                Some(0) => return Err(self.error("note length with a zero denominator")),
                Some(d) => d as f64,
                None => 2.0,
            };
        }

        Ok(numerator / denominator)
    }

    fn emit(&mut self, pitch: Option<i32>, length: f64) {
        let mut length = length * self.next_factor;
        self.next_factor = 1.0;

        if let Some(tuplet) = self.tuplet.as_mut() {
            length *= tuplet.ratio;
            tuplet.remaining = tuplet.remaining.saturating_sub(1);
            if tuplet.remaining == 0 {
                self.tuplet = None;
            }
        }

        let onset = self.time;
        let note = match pitch {
            Some(pitch) => {
                self.notes.push(SourceNote::Abc {
                    pitch,
                    onset,
                    quarter_length: length,
                });
                Some(self.notes.len() - 1)
            }
            None => None,
        };

        self.last = Some(LastEvent {
            onset,
            length,
            note,
        });
        self.time += length;
    }
}

fn step_index(letter: char) -> Option<usize> {
    match letter.to_ascii_uppercase() {
        'C' => Some(0),
        'D' => Some(1),
        'E' => Some(2),
        'F' => Some(3),
        'G' => Some(4),
        'A' => Some(5),
        'B' => Some(6),
        _ => None,
    }
}

fn strip_comment(line: &str) -> &str {
    line.find('%').map_or(line, |idx| &line[..idx])
}

/// Splits an `X:value` style line into its field letter and value.
fn field_line(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let field = chars.next().filter(char::is_ascii_alphabetic)?;
    (chars.next() == Some(':')).then(|| (field, line[2..].trim()))
}

/// Recognises `[K:G]` style inline fields, returning the field, its value and the index after `]`.
fn inline_field(chars: &[char], i: usize) -> Option<(char, String, usize)> {
    if chars.get(i) != Some(&'[') || chars.get(i + 2) != Some(&':') {
        return None;
    }
    let field = chars.get(i + 1).copied().filter(char::is_ascii_alphabetic)?;
    let end = find(chars, i + 3, ']')?;
    let value: String = chars[i + 3..end].iter().collect();
    Some((field, value.trim().to_string(), end + 1))
}

fn find(chars: &[char], from: usize, target: char) -> Option<usize> {
    chars
        .iter()
        .skip(from)
        .position(|&c| c == target)
        .map(|pos| pos + from)
}

/// Skips the ending numbers that may follow a bar line, as in `|1` or `:|2,3`.
fn skip_volta(chars: &[char], mut i: usize) -> usize {
    while chars
        .get(i)
        .is_some_and(|c| c.is_ascii_digit() || *c == ',')
    {
        i += 1;
    }
    i
}

fn digits(chars: &[char], j: &mut usize) -> Option<u32> {
    let start = *j;
    while chars.get(*j).is_some_and(char::is_ascii_digit) {
        *j += 1;
    }
    if *j == start {
        return None;
    }

    let text: String = chars[start..*j].iter().collect();
    text.parse().ok()
}

/// Parses `1/8` style fractions; a bare integer is a whole number.
fn parse_fraction(value: &str) -> Option<f64> {
    let value = value.trim();
    let (num, den) = value.split_once('/').unwrap_or((value, "1"));
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    (num > 0 && den > 0).then(|| num as f64 / den as f64)
}

/// Parses `M:` values: `C`, `C|`, `6/8`, `2+3/8`. `none` and unparseable meters give `None`.
fn parse_meter(value: &str) -> Option<(u32, u32)> {
    let value = value.trim();
    match value {
        "C" => return Some((4, 4)),
        "C|" => return Some((2, 2)),
        _ => {}
    }

    let (num, den) = value.split_once('/')?;
    let num: u32 = num
        .trim_matches(|c| c == '(' || c == ')' || char::is_whitespace(c))
        .split('+')
        .try_fold(0u32, |total, part| total.checked_add(part.trim().parse().ok()?))?;
    let den: u32 = den.trim().parse().ok()?;

    if num == 0 || den == 0 {
        debug!("Ignoring degenerate meter '{}'", value);
        return None;
    }
    Some((num, den))
}

/// Distance of a mode from its relative major, measured in fifths.
fn mode_fifths(mode: &str) -> Option<i32> {
    let prefix: String = mode.chars().take(3).collect::<String>().to_lowercase();
    match prefix.as_str() {
        "" | "maj" | "ion" => Some(0),
        "m" | "min" | "aeo" => Some(-3),
        "mix" => Some(-1),
        "dor" => Some(-2),
        "phr" => Some(-4),
        "lyd" => Some(1),
        "loc" => Some(-5),
        _ => None,
    }
}

/// Turns a `K:` value into per-step alterations.
fn parse_key(value: &str) -> [i32; 7] {
    let mut key = [0; 7];
    let mut tokens = value.split_whitespace().peekable();

    let first = tokens.peek().copied();
    let tonic = first.and_then(|token| {
        let letter = token.chars().next().filter(|c| ('A'..='G').contains(c))?;
        step_index(letter).map(|step| (step, &token[1..]))
    });

    if let Some((step, rest)) = tonic {
        tokens.next();

        let (shift, mut mode) = match rest.chars().next() {
            Some('#') => (7, &rest[1..]),
            Some('b') => (-7, &rest[1..]),
            _ => (0, rest),
        };

        if mode.is_empty()
            && let Some(next) = tokens.peek().copied()
            && next.chars().all(|c| c.is_ascii_alphabetic())
            && mode_fifths(next).is_some()
        {
            mode = next;
            tokens.next();
        }

        // an explicit signature ("exp") only carries the accidentals listed after it
        if !mode.to_lowercase().starts_with("exp") {
            let offset = mode_fifths(mode).unwrap_or_else(|| {
                debug!("Unknown mode '{}', assuming major", mode);
                0
            });
            let fifths = MAJOR_FIFTHS[step] + shift + offset;

            if fifths > 0 {
                for k in 0..fifths as usize {
                    key[SHARP_ORDER[k % 7]] += 1;
                }
            } else {
                for k in 0..fifths.unsigned_abs() as usize {
                    key[FLAT_ORDER[k % 7]] -= 1;
                }
            }
        }
    }

    for token in tokens {
        let (alteration, letter) = if let Some(rest) = token.strip_prefix("^^") {
            (2, rest)
        } else if let Some(rest) = token.strip_prefix("__") {
            (-2, rest)
        } else if let Some(rest) = token.strip_prefix('^') {
            (1, rest)
        } else if let Some(rest) = token.strip_prefix('_') {
            (-1, rest)
        } else if let Some(rest) = token.strip_prefix('=') {
            (0, rest)
        } else {
            continue;
        };

        if let Some(step) = letter.chars().next().and_then(step_index) {
            key[step] = alteration;
        }
    }

    key
}

#[cfg(test)]
mod test {
    use super::*;

    fn read(text: &str) -> Result<Melody> {
        AbcReader.read_str("tune", text, Path::new("tune.abc"))
    }

    fn pitches(melody: &Melody) -> Vec<u8> {
        melody.notes().iter().map(|n| n.pitch()).collect()
    }

    fn durations(melody: &Melody) -> Vec<f64> {
        melody.notes().iter().map(|n| n.duration()).collect()
    }

    fn onsets(melody: &Melody) -> Vec<f64> {
        melody.notes().iter().map(|n| n.onset()).collect()
    }

    #[test]
    fn reads_simple_scale() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nT:Scale\nM:4/4\nL:1/4\nK:C\nC D E F|\n").unwrap();

        assert_eq!(melody.id(), "tune");
        assert_eq!(pitches(&melody), vec![60, 62, 64, 65]);
        assert_eq!(onsets(&melody), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(durations(&melody), vec![1.0; 4]);
    }

    #[test]
    fn key_signature_and_bar_accidentals() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/4\nK:G\nF f ^F =F F | F\n").unwrap();
        assert_eq!(pitches(&melody), vec![66, 78, 66, 65, 65, 66]);
    }

    #[test]
    fn modes_and_flat_keys() {
        env_logger::try_init().unwrap_or(());

        assert_eq!(pitches(&read("X:1\nK:Bb\nB e\n").unwrap()), vec![70, 75]);
        assert_eq!(pitches(&read("X:1\nK:Eb\nA B\n").unwrap()), vec![68, 70]);
        assert_eq!(pitches(&read("X:1\nK:Am\nF G\n").unwrap()), vec![65, 67]);
        assert_eq!(pitches(&read("X:1\nK:D dor\nF c\n").unwrap()), vec![65, 72]);
        assert_eq!(pitches(&read("X:1\nK:E minor\nF c\n").unwrap()), vec![66, 72]);
        assert_eq!(pitches(&read("X:1\nK:C ^f\nF\n").unwrap()), vec![66]);
        assert_eq!(pitches(&read("X:1\nK:none\nF\n").unwrap()), vec![65]);
    }

    #[test]
    fn octave_marks() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nK:C\nC, C c c'\n").unwrap();
        assert_eq!(pitches(&melody), vec![48, 60, 72, 84]);
    }

    #[test]
    fn note_lengths() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/8\nK:C\nA2 B/ c3/2 d// e\n").unwrap();
        assert_eq!(durations(&melody), vec![1.0, 0.25, 0.75, 0.125, 0.5]);
        assert_eq!(onsets(&melody), vec![0.0, 1.0, 1.25, 2.0, 2.125]);
    }

    #[test]
    fn default_unit_follows_meter() {
        env_logger::try_init().unwrap_or(());

        assert_eq!(durations(&read("X:1\nM:2/4\nK:C\nC\n").unwrap()), vec![0.25]);
        assert_eq!(durations(&read("X:1\nM:6/8\nK:C\nC\n").unwrap()), vec![0.5]);
        assert_eq!(durations(&read("X:1\nK:C\nC\n").unwrap()), vec![0.5]);
    }

    #[test]
    fn oversized_meter_is_ignored() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nM:4294967295+1/4\nK:C\nC D\n").unwrap();
        assert_eq!(pitches(&melody), vec![60, 62]);
        assert_eq!(durations(&melody), vec![0.5, 0.5]);

        assert_eq!(parse_meter("2+3/8"), Some((5, 8)));
        assert_eq!(parse_meter("4294967295+1/4"), None);
    }

    #[test]
    fn rests_become_rest_fractions() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/4\nK:C\nC z D\n").unwrap();
        assert_eq!(onsets(&melody), vec![0.0, 2.0]);
        assert_eq!(melody.notes()[1].rest_fraction(), 0.5);
    }

    #[test]
    fn broken_rhythm() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/8\nK:C\nA>B c<d\n").unwrap();
        assert_eq!(durations(&melody), vec![0.75, 0.25, 0.25, 0.75]);
        assert_eq!(onsets(&melody), vec![0.0, 0.75, 1.0, 1.25]);
    }

    #[test]
    fn triplets() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/8\nK:C\n(3abc d\n").unwrap();
        let durations = durations(&melody);
        for d in &durations[..3] {
            assert!((d - 1.0 / 3.0).abs() < 1e-9);
        }
        assert_eq!(durations[3], 0.5);
        assert!((melody.notes()[3].onset() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn chords_keep_top_note() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/4\nK:C\n[CEG]2 c\n").unwrap();
        assert_eq!(pitches(&melody), vec![67, 72]);
        assert_eq!(durations(&melody), vec![2.0, 1.0]);
        assert_eq!(onsets(&melody), vec![0.0, 2.0]);
    }

    #[test]
    fn ignores_ornaments_and_annotations() {
        env_logger::try_init().unwrap_or(());

        let text = "X:1\nL:1/4\nK:C\n\"Am\"A !trill!B {g}c ~d | % comment c d e\nw: la la la la\n";
        let melody = read(text).unwrap();
        assert_eq!(pitches(&melody), vec![69, 71, 72, 74]);
        assert_eq!(onsets(&melody), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn inline_fields_and_voltas() {
        env_logger::try_init().unwrap_or(());

        let melody = read("X:1\nL:1/4\nK:C\n|: F [K:G] F [L:1/8] F :|1 G |2 A |]\n").unwrap();
        assert_eq!(pitches(&melody), vec![65, 66, 66, 67, 69]);
        assert_eq!(durations(&melody), vec![1.0, 1.0, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn only_first_tune_is_read() {
        env_logger::try_init().unwrap_or(());

        let text = "X:1\nK:C\nC D\n\nX:2\nK:C\nE F G\n";
        assert_eq!(pitches(&read(text).unwrap()), vec![60, 62]);
    }

    #[test]
    fn only_first_voice_is_read() {
        env_logger::try_init().unwrap_or(());

        let text = "X:1\nL:1/4\nK:C\nV:1\nc d\nV:2\nC, D,\nV:1\ne\n";
        let melody = read(text).unwrap();
        assert_eq!(pitches(&melody), vec![72, 74, 76]);
        assert_eq!(onsets(&melody), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        env_logger::try_init().unwrap_or(());

        assert!(matches!(read("C D E F"), Err(MelodyError::Parse { .. })));
        assert!(matches!(read(""), Err(MelodyError::Parse { .. })));
        assert!(matches!(read("X:1\nK:C\nA/0\n"), Err(MelodyError::Parse { .. })));
        assert!(matches!(read("X:1\nL:1/0\nK:C\nA\n"), Err(MelodyError::Parse { .. })));
    }

    #[test]
    fn reparsing_is_idempotent() {
        env_logger::try_init().unwrap_or(());

        let text = "X:1\nM:6/8\nK:D\nA>B c2 z | (3def g3 |\n";
        assert_eq!(read(text).unwrap(), read(text).unwrap());
    }
}
