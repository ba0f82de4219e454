//! Inserting and removing events and notes.

use std::sync::Arc;

use cadenza_score::mutate::{update_event, update_measure};
use cadenza_score::{EventId, Note, NoteId, Score, ScoreEvent};

use super::restore_event;
use crate::CoreResult;
use crate::command::{Command, UndoPayload};

/// Inserts an event into a measure, appending by default.
#[derive(Debug)]
pub struct AddEventCommand {
    staff_index: usize,
    measure_index: usize,
    event: ScoreEvent,
    index: Option<usize>,
    payload: Option<UndoPayload>,
}

impl AddEventCommand {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        event: ScoreEvent,
        index: Option<usize>,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            event,
            index,
            payload: None,
        }
    }

    /// ID of the inserted event.
    pub fn event_id(&self) -> &EventId {
        &self.event.id
    }

    /// The event this command inserts.
    pub fn event(&self) -> &ScoreEvent {
        &self.event
    }
}

impl Command for AddEventCommand {
    fn label(&self) -> &str {
        if self.event.is_rest { "Add Rest" } else { "Add Note" }
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(measure) = score.measure(self.staff_index, self.measure_index) else {
            return Ok(Arc::clone(score));
        };
        let index = self
            .index
            .unwrap_or(measure.events.len())
            .min(measure.events.len());

        let event = self.event.clone();
        let next = update_measure(score, self.staff_index, self.measure_index, |m| {
            m.events.insert(index, event);
        });
        self.payload = Some(UndoPayload::InsertedEvent { index });
        Ok(next)
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let Some(UndoPayload::InsertedEvent { index }) = self.payload.take() else {
            return Ok(Arc::clone(score));
        };
        let Some(position) = score
            .measure(self.staff_index, self.measure_index)
            .and_then(|m| match m.events.get(index) {
                Some(e) if e.id == self.event.id => Some(index),
                _ => m.event_index(&self.event.id),
            })
        else {
            return Ok(Arc::clone(score));
        };
        Ok(update_measure(
            score,
            self.staff_index,
            self.measure_index,
            |m| {
                m.events.remove(position);
            },
        ))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Removes a whole event.
#[derive(Debug)]
pub struct DeleteEventCommand {
    staff_index: usize,
    measure_index: usize,
    event_id: EventId,
    payload: Option<UndoPayload>,
}

impl DeleteEventCommand {
    pub fn new(staff_index: usize, measure_index: usize, event_id: EventId) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            payload: None,
        }
    }
}

impl Command for DeleteEventCommand {
    fn label(&self) -> &str {
        "Delete Event"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(measure) = score.measure(self.staff_index, self.measure_index) else {
            return Ok(Arc::clone(score));
        };
        let Some(index) = measure.event_index(&self.event_id) else {
            return Ok(Arc::clone(score));
        };

        self.payload = Some(UndoPayload::RemovedEvent {
            index,
            event: measure.events[index].clone(),
        });
        Ok(update_measure(
            score,
            self.staff_index,
            self.measure_index,
            |m| {
                m.events.remove(index);
            },
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::RemovedEvent { index, event }) => Ok(reinsert_event(
                score,
                self.staff_index,
                self.measure_index,
                index,
                event,
            )),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Removes one note. A single-note event (or a rest) is removed whole.
#[derive(Debug)]
pub struct DeleteNoteCommand {
    staff_index: usize,
    measure_index: usize,
    event_id: EventId,
    note_id: NoteId,
    payload: Option<UndoPayload>,
}

impl DeleteNoteCommand {
    pub fn new(staff_index: usize, measure_index: usize, event_id: EventId, note_id: NoteId) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            note_id,
            payload: None,
        }
    }

    /// True if the last `execute` removed the whole event.
    pub fn removed_event(&self) -> bool {
        matches!(self.payload, Some(UndoPayload::RemovedEvent { .. }))
    }
}

impl Command for DeleteNoteCommand {
    fn label(&self) -> &str {
        "Delete Note"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(measure) = score.measure(self.staff_index, self.measure_index) else {
            return Ok(Arc::clone(score));
        };
        let Some(event_index) = measure.event_index(&self.event_id) else {
            return Ok(Arc::clone(score));
        };
        let event = &measure.events[event_index];
        let Some(note_index) = event.note_index(&self.note_id) else {
            return Ok(Arc::clone(score));
        };

        if event.notes.len() == 1 {
            self.payload = Some(UndoPayload::RemovedEvent {
                index: event_index,
                event: event.clone(),
            });
            return Ok(update_measure(
                score,
                self.staff_index,
                self.measure_index,
                |m| {
                    m.events.remove(event_index);
                },
            ));
        }

        self.payload = Some(UndoPayload::RemovedNote {
            index: note_index,
            note: event.notes[note_index].clone(),
        });
        Ok(update_event(
            score,
            self.staff_index,
            self.measure_index,
            &self.event_id,
            |e| {
                e.notes.remove(note_index);
            },
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::RemovedEvent { index, event }) => Ok(reinsert_event(
                score,
                self.staff_index,
                self.measure_index,
                index,
                event,
            )),
            Some(UndoPayload::RemovedNote { index, note }) => Ok(update_event(
                score,
                self.staff_index,
                self.measure_index,
                &self.event_id,
                |e| {
                    let index = index.min(e.notes.len());
                    e.notes.insert(index, note);
                },
            )),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Adds a pitch to an existing event. A rest becomes a note.
#[derive(Debug)]
pub struct AddNoteToEventCommand {
    staff_index: usize,
    measure_index: usize,
    event_id: EventId,
    note: Note,
    payload: Option<UndoPayload>,
}

impl AddNoteToEventCommand {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        event_id: EventId,
        pitch: impl Into<String>,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            note: Note::pitched(pitch),
            payload: None,
        }
    }

    /// ID the added note carries.
    pub fn note_id(&self) -> &NoteId {
        &self.note.id
    }
}

impl Command for AddNoteToEventCommand {
    fn label(&self) -> &str {
        "Add Note To Chord"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(event) = score.event(self.staff_index, self.measure_index, &self.event_id) else {
            return Ok(Arc::clone(score));
        };
        let duplicate = !event.is_rest && event.notes.iter().any(|n| n.pitch == self.note.pitch);
        if duplicate {
            return Ok(Arc::clone(score));
        }

        self.payload = Some(UndoPayload::ReplacedEvent {
            previous: event.clone(),
        });
        let note = self.note.clone();
        Ok(update_event(
            score,
            self.staff_index,
            self.measure_index,
            &self.event_id,
            |e| {
                if e.is_rest {
                    e.notes = vec![note];
                    e.is_rest = false;
                } else {
                    e.notes.push(note);
                }
            },
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::ReplacedEvent { previous }) => Ok(restore_event(
                score,
                self.staff_index,
                self.measure_index,
                &previous,
            )),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

fn reinsert_event(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    index: usize,
    event: ScoreEvent,
) -> Arc<Score> {
    update_measure(score, staff_index, measure_index, |m| {
        let index = index.min(m.events.len());
        m.events.insert(index, event);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{grand, melody};
    use cadenza_score::Duration;

    #[test]
    fn test_add_event_appends_and_undoes() {
        let score = melody();
        let mut command =
            AddEventCommand::new(0, 1, ScoreEvent::rest(Duration::Quarter, false), None);

        let next = command.execute(&score).unwrap();
        let measure = &next.staves[0].measures[1];
        assert_eq!(measure.events.len(), 3);
        assert_eq!(&measure.events[2].id, command.event_id());
        assert_eq!(
            command.payload(),
            Some(&UndoPayload::InsertedEvent { index: 2 })
        );

        let back = command.undo(&next).unwrap();
        assert_eq!(*back, *score);
    }

    #[test]
    fn test_add_event_at_index() {
        let score = melody();
        let mut command = AddEventCommand::new(
            0,
            0,
            ScoreEvent::note(Duration::Eighth, false, "A4"),
            Some(1),
        );
        let next = command.execute(&score).unwrap();
        assert_eq!(
            next.staves[0].measures[0].events[1].notes[0].pitch.as_deref(),
            Some("A4")
        );
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_add_event_to_missing_measure_is_noop() {
        let score = melody();
        let mut command =
            AddEventCommand::new(0, 7, ScoreEvent::rest(Duration::Quarter, false), None);
        let next = command.execute(&score).unwrap();
        assert!(Arc::ptr_eq(&score, &next));
        assert!(Arc::ptr_eq(&next, &command.undo(&next).unwrap()));
    }

    #[test]
    fn test_delete_event_restores_position() {
        let score = melody();
        let id = score.staves[0].measures[0].events[1].id.clone();
        let mut command = DeleteEventCommand::new(0, 0, id.clone());

        let next = command.execute(&score).unwrap();
        assert!(next.event(0, 0, &id).is_none());
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_delete_only_note_removes_event() {
        let score = melody();
        let event = &score.staves[0].measures[0].events[0];
        let mut command =
            DeleteNoteCommand::new(0, 0, event.id.clone(), event.notes[0].id.clone());

        let next = command.execute(&score).unwrap();
        assert!(command.removed_event());
        assert_eq!(next.staves[0].measures[0].events.len(), 3);
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_delete_note_from_chord_keeps_event() {
        let score = grand();
        let chord = &score.staves[1].measures[0].events[0];
        let upper = chord.notes[1].id.clone();
        let mut command = DeleteNoteCommand::new(1, 0, chord.id.clone(), upper);

        let next = command.execute(&score).unwrap();
        assert!(!command.removed_event());
        let after = &next.staves[1].measures[0].events[0];
        assert_eq!(after.notes.len(), 1);
        assert_eq!(after.notes[0].pitch.as_deref(), Some("C3"));

        let back = command.undo(&next).unwrap();
        assert_eq!(*back, *score);
    }

    #[test]
    fn test_delete_stale_note_is_noop() {
        let score = melody();
        let event = &score.staves[0].measures[0].events[0];
        let mut command = DeleteNoteCommand::new(0, 0, event.id.clone(), NoteId::from("gone"));
        let next = command.execute(&score).unwrap();
        assert!(Arc::ptr_eq(&score, &next));
        assert!(command.payload().is_none());
    }

    #[test]
    fn test_add_note_to_event_builds_chord() {
        let score = melody();
        let id = score.staves[0].measures[0].events[0].id.clone();
        let mut command = AddNoteToEventCommand::new(0, 0, id.clone(), "E4");

        let next = command.execute(&score).unwrap();
        let chord = next.event(0, 0, &id).unwrap();
        assert!(chord.is_chord());
        assert_eq!(&chord.notes[1].id, command.note_id());
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_add_note_to_rest_makes_note() {
        let score = melody();
        let id = score.staves[0].measures[1].events[1].id.clone();
        let mut command = AddNoteToEventCommand::new(0, 1, id.clone(), "A4");

        let next = command.execute(&score).unwrap();
        let event = next.event(0, 1, &id).unwrap();
        assert!(!event.is_rest);
        assert_eq!(event.notes.len(), 1);
        assert!(next.validate().is_ok());
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_add_duplicate_pitch_is_noop() {
        let score = melody();
        let id = score.staves[0].measures[0].events[0].id.clone();
        let mut command = AddNoteToEventCommand::new(0, 0, id, "C4");
        assert!(Arc::ptr_eq(&score, &command.execute(&score).unwrap()));
    }
}
