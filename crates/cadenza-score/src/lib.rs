//! # Cadenza Score
//!
//! The score document and the arithmetic that runs over it.
//!
//! ## Key Concepts
//!
//! ### Quantized time
//! - Every duration is measured in *quants*: 64 quants make a whole note
//! - Dotted values and N:M tuplets scale the base value, so tuplet members
//!   carry fractional quants (`f64`)
//!
//! ### Snapshots
//! - A [`Score`] is never edited in place once it is shared: the helpers in
//!   [`mutate`] clone, apply and return a fresh `Arc<Score>`
//! - A path that does not resolve hands back the *same* `Arc`, so callers can
//!   detect no-ops with `Arc::ptr_eq`

mod builder;
mod model;
pub mod mutate;
pub mod pitch;
pub mod quant;
pub mod reflow;
mod selection;
pub mod timeline;

pub use builder::{MeasureBuilder, ScoreBuilder, StaffBuilder};
pub use model::{
    Accidental, Clef, Duration, EventId, EventLocation, Measure, MeasureId, Note, NoteId, Score,
    ScoreEvent, Staff, StaffId, TimeSignature, TupletGroupId, TupletInfo, TupletRatio,
};
pub use pitch::{DefaultPitches, Pitch};
pub use quant::{QUANTS_PER_WHOLE, QuantPart};
pub use selection::{PreviewMode, PreviewNote, PreviewSource, SelectedNote, Selection};

/// Result type for score operations
pub type ScoreResult<T> = Result<T, ScoreError>;

/// Errors that can occur while building or validating a score
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("Invalid time signature: {0}")]
    InvalidTimeSignature(String),

    #[error("Invalid pitch: {0}")]
    InvalidPitch(String),

    #[error("Invalid key signature: {0}")]
    InvalidKeySignature(String),

    #[error("Invalid tuplet ratio {numerator}:{denominator}")]
    InvalidTuplet { numerator: u32, denominator: u32 },

    #[error("Score has no staves")]
    NoStaves,

    #[error("Staff {staff} has {found} measures, expected {expected}")]
    MeasureCountMismatch {
        staff: usize,
        expected: usize,
        found: usize,
    },

    #[error("Rest event {0} must hold exactly one pitchless note")]
    MalformedRest(EventId),

    #[error("Event {0} has no notes")]
    EmptyEvent(EventId),

    #[error("Tuplet group {group} is inconsistent: {reason}")]
    InconsistentTuplet { group: TupletGroupId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_builder_produces_valid_score() {
        let score = ScoreBuilder::new()
            .title("Etude")
            .staff(Clef::Treble, |staff| {
                staff.measure(|m| {
                    m.note(Duration::Quarter, "C4")
                        .note(Duration::Quarter, "D4")
                        .rest(Duration::Half);
                });
            })
            .build()
            .unwrap();

        assert!(score.validate().is_ok());
        assert_eq!(score.staves[0].measures[0].events.len(), 3);
    }

    #[test]
    fn test_quarter_is_sixteen_quants() {
        assert_eq!(quant::duration_to_quants(Duration::Quarter, false, None), 16.0);
    }

    #[test]
    fn test_missing_path_returns_same_snapshot() {
        let score = Arc::new(Score::blank(&[Clef::Treble], 1, TimeSignature::COMMON));
        let next = mutate::update_measure(&score, 0, 5, |m| m.events.clear());
        assert!(Arc::ptr_eq(&score, &next));
    }
}
