//! Score document types.
//!
//! The shape mirrors the JSON interchange form: a [`Score`] owns staves, a
//! [`Staff`] owns measures, a [`Measure`] owns events and a [`ScoreEvent`]
//! owns one note (or several, for a chord). Rests are events holding a
//! single pitchless [`Note`], so every selectable thing has a note ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{ScoreError, ScoreResult, quant};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a fresh random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a staff.
    StaffId
);
string_id!(
    /// Identifier of a measure on one staff.
    MeasureId
);
string_id!(
    /// Identifier of an event (a note, chord or rest).
    EventId
);
string_id!(
    /// Identifier of a single note inside an event.
    NoteId
);
string_id!(
    /// Identifier shared by every member of one tuplet group.
    TupletGroupId
);

/// Written duration names, longest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duration {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
    SixtyFourth,
}

impl Duration {
    /// Every duration, from whole down to sixty-fourth.
    pub const ALL: [Duration; 7] = [
        Duration::Whole,
        Duration::Half,
        Duration::Quarter,
        Duration::Eighth,
        Duration::Sixteenth,
        Duration::ThirtySecond,
        Duration::SixtyFourth,
    ];

    /// Undotted, non-tuplet length in quants.
    pub fn base_quants(self) -> u32 {
        match self {
            Duration::Whole => 64,
            Duration::Half => 32,
            Duration::Quarter => 16,
            Duration::Eighth => 8,
            Duration::Sixteenth => 4,
            Duration::ThirtySecond => 2,
            Duration::SixtyFourth => 1,
        }
    }

    /// The JSON name of this duration.
    pub fn name(self) -> &'static str {
        match self {
            Duration::Whole => "whole",
            Duration::Half => "half",
            Duration::Quarter => "quarter",
            Duration::Eighth => "eighth",
            Duration::Sixteenth => "sixteenth",
            Duration::ThirtySecond => "thirtysecond",
            Duration::SixtyFourth => "sixtyfourth",
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Duration::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| format!("unknown duration '{s}'"))
    }
}

/// Staff clef.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Clef {
    #[default]
    Treble,
    Bass,
    Alto,
    Tenor,
    Grand,
}

/// Written accidental on a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Accidental {
    Sharp,
    Flat,
    Natural,
    DoubleSharp,
    DoubleFlat,
}

impl Accidental {
    /// Chromatic alteration in semitones.
    pub fn alter(self) -> i8 {
        match self {
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
            Accidental::Natural => 0,
            Accidental::DoubleSharp => 2,
            Accidental::DoubleFlat => -2,
        }
    }
}

/// A meter such as 4/4 or 6/8. Serialized as `"4/4"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    /// Common time.
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Creates a time signature, rejecting zero terms and non power-of-two
    /// denominators finer than a sixty-fourth.
    pub fn new(numerator: u32, denominator: u32) -> ScoreResult<Self> {
        let valid = numerator > 0
            && denominator > 0
            && denominator.is_power_of_two()
            && denominator <= quant::QUANTS_PER_WHOLE;
        if !valid {
            return Err(ScoreError::InvalidTimeSignature(format!(
                "{numerator}/{denominator}"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Capacity of one full measure in quants.
    pub fn quants_per_measure(&self) -> u32 {
        self.numerator * quant::QUANTS_PER_WHOLE / self.denominator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScoreError::InvalidTimeSignature(s.to_string());
        let (num, den) = s.trim().split_once('/').ok_or_else(invalid)?;
        let numerator = num.trim().parse().map_err(|_| invalid())?;
        let denominator = den.trim().parse().map_err(|_| invalid())?;
        Self::new(numerator, denominator)
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = ScoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSignature> for String {
    fn from(value: TimeSignature) -> Self {
        value.to_string()
    }
}

/// N:M tuplet ratio: N events played in the time of M.
/// Serialized as a `[numerator, denominator]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct TupletRatio {
    pub numerator: u32,
    pub denominator: u32,
}

impl TupletRatio {
    /// Three in the time of two.
    pub const TRIPLET: TupletRatio = TupletRatio {
        numerator: 3,
        denominator: 2,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Returns an error for ratios with a zero term.
    pub fn validate(&self) -> ScoreResult<()> {
        if self.numerator == 0 || self.denominator == 0 {
            return Err(ScoreError::InvalidTuplet {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        Ok(())
    }

    /// Factor applied to a member's written length.
    pub fn scale(&self) -> f64 {
        f64::from(self.denominator) / f64::from(self.numerator)
    }
}

impl From<(u32, u32)> for TupletRatio {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

impl From<TupletRatio> for (u32, u32) {
    fn from(value: TupletRatio) -> Self {
        (value.numerator, value.denominator)
    }
}

/// Tuplet membership of one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupletInfo {
    pub ratio: TupletRatio,
    pub group_size: usize,
    /// 0-based position within the group
    pub position: usize,
    pub base_duration: Duration,
    pub group_id: TupletGroupId,
}

/// A single pitch (or the placeholder inside a rest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    /// Scientific pitch such as `"C#4"`; `None` for a rest
    pub pitch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accidental: Option<Accidental>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tied: bool,
}

impl Note {
    /// A pitched note with a fresh ID.
    pub fn pitched(pitch: impl Into<String>) -> Self {
        Self {
            id: NoteId::new(),
            pitch: Some(pitch.into()),
            accidental: None,
            tied: false,
        }
    }

    /// The placeholder note carried by a rest.
    pub fn rest() -> Self {
        Self {
            id: NoteId::new(),
            pitch: None,
            accidental: None,
            tied: false,
        }
    }

    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }
}

/// A note, chord or rest occupying one slot in a measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEvent {
    pub id: EventId,
    pub duration: Duration,
    #[serde(default)]
    pub dotted: bool,
    pub notes: Vec<Note>,
    #[serde(default)]
    pub is_rest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuplet: Option<TupletInfo>,
}

impl ScoreEvent {
    /// A single-note event.
    pub fn note(duration: Duration, dotted: bool, pitch: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            duration,
            dotted,
            notes: vec![Note::pitched(pitch)],
            is_rest: false,
            tuplet: None,
        }
    }

    /// A chord built from several pitches.
    pub fn chord<S: AsRef<str>>(duration: Duration, dotted: bool, pitches: &[S]) -> Self {
        Self {
            id: EventId::new(),
            duration,
            dotted,
            notes: pitches
                .iter()
                .map(|p| Note::pitched(p.as_ref()))
                .collect(),
            is_rest: false,
            tuplet: None,
        }
    }

    /// A rest.
    pub fn rest(duration: Duration, dotted: bool) -> Self {
        Self {
            id: EventId::new(),
            duration,
            dotted,
            notes: vec![Note::rest()],
            is_rest: true,
            tuplet: None,
        }
    }

    /// Length of this event in quants, tuplet-aware.
    pub fn quants(&self) -> f64 {
        quant::event_quants(self)
    }

    pub fn is_chord(&self) -> bool {
        self.notes.len() > 1
    }

    pub fn find_note(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn note_index(&self, id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|n| &n.id == id)
    }

    /// Turns this event into a rest, keeping the first note's ID so that
    /// selections pointing at it stay valid.
    pub fn make_rest(&mut self) {
        let id = self.notes.first().map(|n| n.id.clone()).unwrap_or_default();
        self.notes = vec![Note {
            id,
            pitch: None,
            accidental: None,
            tied: false,
        }];
        self.is_rest = true;
    }

    /// Turns a rest into a single pitched note, reusing the placeholder ID.
    pub fn make_pitched(&mut self, pitch: impl Into<String>) {
        let id = self.notes.first().map(|n| n.id.clone()).unwrap_or_default();
        self.notes = vec![Note {
            id,
            pitch: Some(pitch.into()),
            accidental: None,
            tied: false,
        }];
        self.is_rest = false;
    }

    fn validate(&self) -> ScoreResult<()> {
        if self.is_rest {
            let well_formed = self.notes.len() == 1 && self.notes[0].pitch.is_none();
            if !well_formed {
                return Err(ScoreError::MalformedRest(self.id.clone()));
            }
        } else if self.notes.is_empty() {
            return Err(ScoreError::EmptyEvent(self.id.clone()));
        }
        Ok(())
    }
}

/// One bar of one staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub id: MeasureId,
    #[serde(default)]
    pub events: Vec<ScoreEvent>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_pickup: bool,
}

impl Measure {
    /// An empty measure with a fresh ID.
    pub fn new() -> Self {
        Self {
            id: MeasureId::new(),
            events: Vec::new(),
            is_pickup: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_index(&self, id: &EventId) -> Option<usize> {
        self.events.iter().position(|e| &e.id == id)
    }

    pub fn event(&self, id: &EventId) -> Option<&ScoreEvent> {
        self.events.iter().find(|e| &e.id == id)
    }

    /// Total written content in quants.
    pub fn total_quants(&self) -> f64 {
        quant::total_quants(&self.events)
    }

    /// Checks that every tuplet group in this measure is contiguous, shares
    /// its ratio and size, and numbers its members `0..group_size` in order.
    pub fn validate_tuplets(&self) -> ScoreResult<()> {
        let mut index = 0;
        while index < self.events.len() {
            let Some(head) = &self.events[index].tuplet else {
                index += 1;
                continue;
            };
            let group = head.group_id.clone();
            let inconsistent = |reason: String| ScoreError::InconsistentTuplet {
                group: group.clone(),
                reason,
            };
            let members: Vec<&TupletInfo> = self.events[index..]
                .iter()
                .map_while(|e| e.tuplet.as_ref().filter(|t| t.group_id == group))
                .collect();
            if members.len() != head.group_size {
                return Err(inconsistent(format!(
                    "{} members for a group of {}",
                    members.len(),
                    head.group_size
                )));
            }
            for (position, member) in members.iter().enumerate() {
                if member.position != position {
                    return Err(inconsistent(format!(
                        "member {position} claims position {}",
                        member.position
                    )));
                }
                if member.ratio != head.ratio || member.group_size != head.group_size {
                    return Err(inconsistent("members disagree on ratio or size".into()));
                }
            }
            index += members.len();
        }

        Ok(())
    }
}

impl Default for Measure {
    fn default() -> Self {
        Self::new()
    }
}

/// A horizontal line of measures with its own clef.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staff {
    pub id: StaffId,
    pub clef: Clef,
    pub key_signature: String,
    #[serde(default)]
    pub measures: Vec<Measure>,
}

impl Staff {
    /// A staff with `measures` empty measures.
    pub fn empty(clef: Clef, key_signature: impl Into<String>, measures: usize) -> Self {
        Self {
            id: StaffId::new(),
            clef,
            key_signature: key_signature.into(),
            measures: (0..measures).map(|_| Measure::new()).collect(),
        }
    }

    /// An empty sibling with the same measure count and pickup flags.
    pub fn empty_sibling(&self, clef: Clef) -> Self {
        Self {
            id: StaffId::new(),
            clef,
            key_signature: self.key_signature.clone(),
            measures: self
                .measures
                .iter()
                .map(|m| Measure {
                    is_pickup: m.is_pickup,
                    ..Measure::new()
                })
                .collect(),
        }
    }
}

/// Where an event lives inside a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventLocation {
    pub staff_index: usize,
    pub measure_index: usize,
    pub event_index: usize,
}

/// The whole document.
///
/// Staff order matters: index 0 is the upper staff and higher indices go
/// downward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub title: String,
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub key_signature: String,
    pub staves: Vec<Staff>,
}

impl Score {
    /// An empty score with one staff per clef.
    pub fn blank(clefs: &[Clef], measures: usize, time_signature: TimeSignature) -> Self {
        Self {
            title: "Untitled".to_string(),
            bpm: 120,
            time_signature,
            key_signature: "C".to_string(),
            staves: clefs
                .iter()
                .map(|&clef| Staff::empty(clef, "C", measures))
                .collect(),
        }
    }

    /// Capacity of a full measure under the score's time signature.
    pub fn quants_per_measure(&self) -> u32 {
        self.time_signature.quants_per_measure()
    }

    /// Number of measures (identical on every staff of a valid score).
    pub fn measure_count(&self) -> usize {
        self.staves.first().map_or(0, |s| s.measures.len())
    }

    pub fn staff(&self, staff_index: usize) -> Option<&Staff> {
        self.staves.get(staff_index)
    }

    pub fn measure(&self, staff_index: usize, measure_index: usize) -> Option<&Measure> {
        self.staff(staff_index)?.measures.get(measure_index)
    }

    pub fn event(
        &self,
        staff_index: usize,
        measure_index: usize,
        event_id: &EventId,
    ) -> Option<&ScoreEvent> {
        self.measure(staff_index, measure_index)?.event(event_id)
    }

    /// Finds an event anywhere in the score.
    pub fn locate_event(&self, event_id: &EventId) -> Option<EventLocation> {
        self.staves.iter().enumerate().find_map(|(staff_index, staff)| {
            staff
                .measures
                .iter()
                .enumerate()
                .find_map(|(measure_index, measure)| {
                    measure.event_index(event_id).map(|event_index| EventLocation {
                        staff_index,
                        measure_index,
                        event_index,
                    })
                })
        })
    }

    /// Structural validity check applied before a new state is accepted.
    pub fn validate(&self) -> ScoreResult<()> {
        let Some(first) = self.staves.first() else {
            return Err(ScoreError::NoStaves);
        };
        let expected = first.measures.len();
        for (staff_index, staff) in self.staves.iter().enumerate() {
            if staff.measures.len() != expected {
                return Err(ScoreError::MeasureCountMismatch {
                    staff: staff_index,
                    expected,
                    found: staff.measures.len(),
                });
            }
            for measure in &staff.measures {
                for event in &measure.events {
                    event.validate()?;
                }
                measure.validate_tuplets()?;
            }
        }
        Ok(())
    }
}

impl Default for Score {
    fn default() -> Self {
        Self::blank(&[Clef::Treble], 1, TimeSignature::COMMON)
    }
}
