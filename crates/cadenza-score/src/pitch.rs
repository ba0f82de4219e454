//! Pitch spelling and transposition.
//!
//! Pitches are stored on notes as scientific-pitch text (`"C4"`, `"F#3"`,
//! `"Bb5"`). [`Pitch`] parses that text into letter, alteration and octave
//! so it can be moved chromatically (by semitones, respelled to suit the
//! key) or diatonically (by letter steps, taking accidentals from the key).
//! The two are separate operations with separate parameters: twelve
//! semitones and seven diatonic steps both reach the octave but are not
//! interchangeable arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{Accidental, Clef};
use crate::{ScoreError, ScoreResult};

/// Natural note letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    /// Position within the octave, C = 0.
    pub fn index(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 1,
            Letter::E => 2,
            Letter::F => 3,
            Letter::G => 4,
            Letter::A => 5,
            Letter::B => 6,
        }
    }

    /// Semitones above C.
    pub fn semitone(self) -> i32 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    fn from_index(index: i32) -> Letter {
        Letter::ALL[index.rem_euclid(7) as usize]
    }

    fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

/// A spelled pitch: letter, chromatic alteration and octave (C4 = middle C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pitch {
    pub letter: Letter,
    pub alter: i8,
    pub octave: i32,
}

impl Pitch {
    pub fn new(letter: Letter, alter: i8, octave: i32) -> Self {
        Self {
            letter,
            alter,
            octave,
        }
    }

    /// MIDI note number (C4 = 60).
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.letter.semitone() + i32::from(self.alter)
    }

    /// Equal-tempered frequency with A4 = 440 Hz.
    pub fn frequency(&self) -> f64 {
        440.0 * 2.0_f64.powf(f64::from(self.midi() - 69) / 12.0)
    }

    /// Spells a MIDI number, preferring pitches that belong to `key`.
    pub fn from_midi(midi: i32, key: &str) -> Pitch {
        let fifths = key_fifths(key).unwrap_or(0);
        let pitch_class = midi.rem_euclid(12);

        let in_key = Letter::ALL.into_iter().find_map(|letter| {
            let alter = wrap_alter(pitch_class - letter.semitone());
            (alter == key_alter(fifths, letter)).then_some((letter, alter))
        });
        let (letter, alter) = in_key.unwrap_or_else(|| {
            let prefer_flats = fifths < 0;
            Letter::ALL
                .into_iter()
                .filter_map(|letter| {
                    let alter = wrap_alter(pitch_class - letter.semitone());
                    let wanted = if prefer_flats { -1 } else { 1 };
                    (alter == 0 || alter == wanted).then_some((letter, alter))
                })
                .min_by_key(|&(_, alter)| alter.abs())
                .unwrap_or((Letter::C, wrap_alter(pitch_class)))
        });

        let octave = (midi - letter.semitone() - i32::from(alter)).div_euclid(12) - 1;
        Pitch::new(letter, alter, octave)
    }

    /// Moves by `semitones`, respelling for `key`.
    pub fn transpose_chromatic(&self, semitones: i32, key: &str) -> Pitch {
        Pitch::from_midi(self.midi() + semitones, key)
    }

    /// Moves by `steps` letter names, taking the alteration from `key`.
    pub fn transpose_diatonic(&self, steps: i32, key: &str) -> Pitch {
        let fifths = key_fifths(key).unwrap_or(0);
        let target = self.letter.index() + steps;
        let letter = Letter::from_index(target);
        Pitch::new(
            letter,
            key_alter(fifths, letter),
            self.octave + target.div_euclid(7),
        )
    }

    /// The accidental that must be written in `key`, if any.
    pub fn written_accidental(&self, key: &str) -> Option<Accidental> {
        let fifths = key_fifths(key).unwrap_or(0);
        if self.alter == key_alter(fifths, self.letter) {
            return None;
        }
        match self.alter {
            0 => Some(Accidental::Natural),
            1 => Some(Accidental::Sharp),
            -1 => Some(Accidental::Flat),
            2 => Some(Accidental::DoubleSharp),
            -2 => Some(Accidental::DoubleFlat),
            _ => None,
        }
    }
}

fn wrap_alter(diff: i32) -> i8 {
    let wrapped = (diff + 6).rem_euclid(12) - 6;
    wrapped as i8
}

impl FromStr for Pitch {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScoreError::InvalidPitch(s.to_string());
        let mut chars = s.trim().chars().peekable();
        let letter = chars.next().and_then(Letter::from_char).ok_or_else(invalid)?;

        let mut alter: i8 = 0;
        while let Some(&c) = chars.peek() {
            match c {
                '#' => alter += 1,
                'b' => alter -= 1,
                _ => break,
            }
            chars.next();
        }
        if alter.abs() > 2 {
            return Err(invalid());
        }

        let octave: String = chars.collect();
        let octave = octave.parse().map_err(|_| invalid())?;
        Ok(Pitch::new(letter, alter, octave))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accidental = match self.alter {
            2 => "##",
            1 => "#",
            -1 => "b",
            -2 => "bb",
            _ => "",
        };
        write!(f, "{}{}{}", self.letter.as_char(), accidental, self.octave)
    }
}

/// Position of a key on the circle of fifths (sharps positive, flats
/// negative). Minor keys are written with a trailing `m`.
pub fn key_fifths(key: &str) -> Option<i32> {
    let fifths = match key.trim() {
        "C" | "Am" => 0,
        "G" | "Em" => 1,
        "D" | "Bm" => 2,
        "A" | "F#m" => 3,
        "E" | "C#m" => 4,
        "B" | "G#m" => 5,
        "F#" | "D#m" => 6,
        "C#" | "A#m" => 7,
        "F" | "Dm" => -1,
        "Bb" | "Gm" => -2,
        "Eb" | "Cm" => -3,
        "Ab" | "Fm" => -4,
        "Db" | "Bbm" => -5,
        "Gb" | "Ebm" => -6,
        "Cb" | "Abm" => -7,
        _ => return None,
    };
    Some(fifths)
}

/// Validates a key name.
pub fn parse_key(key: &str) -> ScoreResult<i32> {
    key_fifths(key).ok_or_else(|| ScoreError::InvalidKeySignature(key.to_string()))
}

/// Alteration the key signature applies to `letter`.
fn key_alter(fifths: i32, letter: Letter) -> i8 {
    const SHARP_ORDER: [Letter; 7] = [
        Letter::F,
        Letter::C,
        Letter::G,
        Letter::D,
        Letter::A,
        Letter::E,
        Letter::B,
    ];
    let position = |order: &[Letter]| order.iter().position(|&l| l == letter).unwrap_or(7) as i32;
    if fifths > 0 && position(&SHARP_ORDER) < fifths {
        1
    } else if fifths < 0 {
        let flat_position = 6 - position(&SHARP_ORDER);
        if flat_position < -fifths { -1 } else { 0 }
    } else {
        0
    }
}

/// Moves a stored pitch string chromatically.
pub fn transpose_chromatic(pitch: &str, semitones: i32, key: &str) -> ScoreResult<Pitch> {
    Ok(pitch.parse::<Pitch>()?.transpose_chromatic(semitones, key))
}

/// Moves a stored pitch string diatonically.
pub fn transpose_diatonic(pitch: &str, steps: i32, key: &str) -> ScoreResult<Pitch> {
    Ok(pitch.parse::<Pitch>()?.transpose_diatonic(steps, key))
}

/// MIDI number of a stored pitch string, `None` if it does not parse.
pub fn midi_of(pitch: &str) -> Option<i32> {
    pitch.parse::<Pitch>().ok().map(|p| p.midi())
}

/// Pitch given to a cursor or restored note when nothing else suggests one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultPitches {
    pub treble: String,
    pub bass: String,
    pub alto: String,
    pub tenor: String,
}

impl DefaultPitches {
    /// Middle-line pitch for `clef`. A grand staff uses the treble value.
    pub fn for_clef(&self, clef: Clef) -> &str {
        match clef {
            Clef::Treble | Clef::Grand => &self.treble,
            Clef::Bass => &self.bass,
            Clef::Alto => &self.alto,
            Clef::Tenor => &self.tenor,
        }
    }
}

impl Default for DefaultPitches {
    fn default() -> Self {
        Self {
            treble: "B4".to_string(),
            bass: "D3".to_string(),
            alto: "C4".to_string(),
            tenor: "A3".to_string(),
        }
    }
}
