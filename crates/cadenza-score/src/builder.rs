//! Fluent score construction.
//!
//! ```
//! use cadenza_score::{Clef, Duration, ScoreBuilder};
//!
//! let score = ScoreBuilder::new()
//!     .title("Minuet")
//!     .time_signature("3/4".parse().unwrap())
//!     .staff(Clef::Treble, |staff| {
//!         staff.measure(|m| {
//!             m.note(Duration::Quarter, "D5").note(Duration::Half, "G4");
//!         });
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(score.staves[0].measures[0].events.len(), 2);
//! ```

use crate::model::{
    Clef, Duration, Measure, Score, ScoreEvent, Staff, TimeSignature, TupletGroupId, TupletInfo,
    TupletRatio,
};
use crate::reflow::pad_measures;
use crate::{ScoreResult, pitch};

/// Builds a [`Score`] one staff at a time.
#[derive(Debug, Clone)]
pub struct ScoreBuilder {
    title: String,
    bpm: u32,
    time_signature: TimeSignature,
    key_signature: String,
    staves: Vec<Staff>,
}

impl ScoreBuilder {
    pub fn new() -> Self {
        Self {
            title: "Untitled".to_string(),
            bpm: 120,
            time_signature: TimeSignature::COMMON,
            key_signature: "C".to_string(),
            staves: Vec::new(),
        }
    }

    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = title.into();
        self
    }

    pub fn bpm(&mut self, bpm: u32) -> &mut Self {
        self.bpm = bpm;
        self
    }

    pub fn time_signature(&mut self, time_signature: TimeSignature) -> &mut Self {
        self.time_signature = time_signature;
        self
    }

    /// Sets the score key. Staves added afterwards inherit it.
    pub fn key_signature(&mut self, key: impl Into<String>) -> &mut Self {
        self.key_signature = key.into();
        self
    }

    /// Adds a staff and fills it through `f`.
    pub fn staff(&mut self, clef: Clef, f: impl FnOnce(&mut StaffBuilder)) -> &mut Self {
        let mut staff = StaffBuilder {
            staff: Staff::empty(clef, self.key_signature.clone(), 0),
        };
        f(&mut staff);
        self.staves.push(staff.staff);
        self
    }

    /// Finishes the score. Short staves are padded with empty measures so
    /// every staff has the same count (at least one).
    pub fn build(&self) -> ScoreResult<Score> {
        pitch::parse_key(&self.key_signature)?;
        let count = self
            .staves
            .iter()
            .map(|s| s.measures.len())
            .max()
            .unwrap_or(0)
            .max(1);
        let mut staves = self.staves.clone();
        for staff in &mut staves {
            pad_measures(&mut staff.measures, count);
        }
        let score = Score {
            title: self.title.clone(),
            bpm: self.bpm,
            time_signature: self.time_signature,
            key_signature: self.key_signature.clone(),
            staves,
        };
        score.validate()?;
        Ok(score)
    }
}

impl Default for ScoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds measures to one staff.
#[derive(Debug)]
pub struct StaffBuilder {
    staff: Staff,
}

impl StaffBuilder {
    pub fn measure(&mut self, f: impl FnOnce(&mut MeasureBuilder)) -> &mut Self {
        let mut measure = MeasureBuilder {
            measure: Measure::new(),
        };
        f(&mut measure);
        self.staff.measures.push(measure.measure);
        self
    }

    /// Adds a measure flagged as a pickup.
    pub fn pickup(&mut self, f: impl FnOnce(&mut MeasureBuilder)) -> &mut Self {
        self.measure(f);
        if let Some(last) = self.staff.measures.last_mut() {
            last.is_pickup = true;
        }
        self
    }

    /// Adds `count` empty measures.
    pub fn empty_measures(&mut self, count: usize) -> &mut Self {
        for _ in 0..count {
            self.staff.measures.push(Measure::new());
        }
        self
    }
}

/// Adds events to one measure.
#[derive(Debug)]
pub struct MeasureBuilder {
    measure: Measure,
}

impl MeasureBuilder {
    pub fn note(&mut self, duration: Duration, pitch: &str) -> &mut Self {
        self.event(ScoreEvent::note(duration, false, pitch))
    }

    pub fn dotted_note(&mut self, duration: Duration, pitch: &str) -> &mut Self {
        self.event(ScoreEvent::note(duration, true, pitch))
    }

    pub fn chord(&mut self, duration: Duration, pitches: &[&str]) -> &mut Self {
        self.event(ScoreEvent::chord(duration, false, pitches))
    }

    pub fn rest(&mut self, duration: Duration) -> &mut Self {
        self.event(ScoreEvent::rest(duration, false))
    }

    /// Adds one tuplet group with a note per pitch.
    pub fn tuplet(&mut self, ratio: TupletRatio, duration: Duration, pitches: &[&str]) -> &mut Self {
        let group_id = TupletGroupId::new();
        for (position, pitch) in pitches.iter().enumerate() {
            let mut event = ScoreEvent::note(duration, false, *pitch);
            event.tuplet = Some(TupletInfo {
                ratio,
                group_size: pitches.len(),
                position,
                base_duration: duration,
                group_id: group_id.clone(),
            });
            self.measure.events.push(event);
        }
        self
    }

    pub fn event(&mut self, event: ScoreEvent) -> &mut Self {
        self.measure.events.push(event);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staves_are_padded() {
        let score = ScoreBuilder::new()
            .staff(Clef::Treble, |s| {
                s.empty_measures(3);
            })
            .staff(Clef::Bass, |_| {})
            .build()
            .unwrap();
        assert_eq!(score.staves[0].measures.len(), 3);
        assert_eq!(score.staves[1].measures.len(), 3);
    }

    #[test]
    fn test_tuplet_group() {
        let score = ScoreBuilder::new()
            .staff(Clef::Treble, |s| {
                s.measure(|m| {
                    m.tuplet(TupletRatio::TRIPLET, Duration::Eighth, &["C4", "D4", "E4"]);
                });
            })
            .build()
            .unwrap();
        let measure = &score.staves[0].measures[0];
        assert!(measure.validate_tuplets().is_ok());
        assert!(crate::quant::approx_eq(measure.total_quants(), 16.0));
    }

    #[test]
    fn test_key_is_checked() {
        let result = ScoreBuilder::new().key_signature("Q#").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_staves_inherit_key() {
        let score = ScoreBuilder::new()
            .key_signature("Bb")
            .staff(Clef::Treble, |_| {})
            .build()
            .unwrap();
        assert_eq!(score.staves[0].key_signature, "Bb");
    }
}
