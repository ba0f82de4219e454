//! The command abstraction.
//!
//! ## Contract
//!
//! - `execute` takes a snapshot and returns the next one. It captures what
//!   it needs to reverse itself into an [`UndoPayload`].
//! - `undo` reverses the last `execute` using only its input and that
//!   payload.
//! - A target that cannot be found is not an error: both methods hand back
//!   the input `Arc` unchanged, and a command whose `execute` was a no-op
//!   also has a no-op `undo`.
//! - `Err` is reserved for requests that can never succeed (for example a
//!   tuplet ratio with a zero term).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use cadenza_score::{Measure, Note, Score, ScoreEvent, Staff, TimeSignature, TupletInfo};

use crate::CoreResult;

/// A reversible edit.
pub trait Command: fmt::Debug + Send {
    /// Short human-readable name, used in logs and history listings.
    fn label(&self) -> &str;

    /// Applies the edit.
    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>>;

    /// Reverses the last `execute`.
    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>>;

    /// Reversal data captured by the last `execute`, if it changed anything.
    fn payload(&self) -> Option<&UndoPayload> {
        None
    }
}

/// One event as it was before a multi-target edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    pub staff_index: usize,
    pub measure_index: usize,
    pub event: ScoreEvent,
}

/// Typed reversal data, one variant per kind of edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UndoPayload {
    /// An event was inserted at `index`.
    InsertedEvent { index: usize },
    /// An event was removed from `index`.
    RemovedEvent { index: usize, event: ScoreEvent },
    /// A note was removed from a chord at `index`.
    RemovedNote { index: usize, note: Note },
    /// An event was modified in place.
    ReplacedEvent { previous: ScoreEvent },
    /// A note was modified in place.
    ReplacedNote { previous: Note },
    /// Several events were modified in place.
    ReplacedEvents { previous: Vec<EventSnapshot> },
    /// Tuplet fields of consecutive events starting at `start_index`.
    Tuplets {
        start_index: usize,
        previous: Vec<Option<TupletInfo>>,
    },
    /// The whole staff list.
    Staves { previous: Vec<Staff> },
    /// Staff list together with the meter it was laid out for.
    Layout {
        time_signature: TimeSignature,
        staves: Vec<Staff>,
    },
    /// Score key and per-staff keys.
    KeySignature {
        score_key: String,
        staff_keys: Vec<String>,
    },
    /// An empty measure was inserted on every staff at `index`.
    InsertedMeasure { index: usize },
    /// One measure per staff was removed from `index`.
    RemovedMeasures { index: usize, measures: Vec<Measure> },
    /// The whole document was replaced.
    Document { previous: Box<Score> },
}

/// Runs several commands as one.
///
/// `execute` applies them in order; `undo` reverses them in the opposite
/// order, so each sub-command sees exactly the state it produced.
#[derive(Debug)]
pub struct BatchCommand {
    label: String,
    commands: Vec<Box<dyn Command>>,
}

impl BatchCommand {
    pub fn new(commands: Vec<Box<dyn Command>>) -> Self {
        Self::with_label("Batch", commands)
    }

    pub fn with_label(label: impl Into<String>, commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            label: label.into(),
            commands,
        }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Labels of the wrapped commands, in execution order.
    pub fn labels(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.label()).collect()
    }
}

impl Command for BatchCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let mut state = Arc::clone(score);
        for command in &mut self.commands {
            state = command.execute(&state)?;
        }
        Ok(state)
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let mut state = Arc::clone(score);
        for command in self.commands.iter_mut().rev() {
            state = command.undo(&state)?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{AddEventCommand, ChangePitchCommand, DeleteNoteCommand};
    use cadenza_score::{Clef, Duration, ScoreBuilder};

    fn score() -> Arc<Score> {
        Arc::new(
            ScoreBuilder::new()
                .staff(Clef::Treble, |s| {
                    s.measure(|m| {
                        m.note(Duration::Quarter, "C4").note(Duration::Quarter, "D4");
                    });
                })
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_batch_undo_restores_original() {
        let original = score();
        let first = &original.staves[0].measures[0].events[0];
        let second = &original.staves[0].measures[0].events[1];

        let mut batch = BatchCommand::new(vec![
            Box::new(AddEventCommand::new(
                0,
                0,
                ScoreEvent::note(Duration::Quarter, false, "E4"),
                None,
            )),
            Box::new(ChangePitchCommand::new(
                0,
                0,
                first.id.clone(),
                first.notes[0].id.clone(),
                "G4",
            )),
            Box::new(DeleteNoteCommand::new(
                0,
                0,
                second.id.clone(),
                second.notes[0].id.clone(),
            )),
        ]);

        let edited = batch.execute(&original).unwrap();
        assert_eq!(edited.staves[0].measures[0].events.len(), 2);
        assert_eq!(
            edited.staves[0].measures[0].events[0].notes[0].pitch.as_deref(),
            Some("G4")
        );

        let restored = batch.undo(&edited).unwrap();
        assert_eq!(*restored, *original);
    }

    #[test]
    fn test_empty_batch_is_identity() {
        let original = score();
        let mut batch = BatchCommand::new(Vec::new());
        assert!(batch.is_empty());
        let next = batch.execute(&original).unwrap();
        assert!(Arc::ptr_eq(&original, &next));
    }

    #[test]
    fn test_payload_serializes_with_kind_tag() {
        let payload = UndoPayload::InsertedMeasure { index: 3 };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "insertedMeasure");
        assert_eq!(json["index"], 3);
    }
}
