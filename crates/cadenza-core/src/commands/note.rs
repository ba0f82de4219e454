//! In-place edits to one note or one event.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use cadenza_score::mutate::update_note;
use cadenza_score::{Accidental, Duration, EventId, Note, NoteId, Pitch, Score, ScoreEvent};

use super::restore_event;
use crate::CoreResult;
use crate::command::{Command, UndoPayload};

/// Sets the pitch of one note, respelling its accidental for the staff key.
#[derive(Debug)]
pub struct ChangePitchCommand {
    staff_index: usize,
    measure_index: usize,
    event_id: EventId,
    note_id: NoteId,
    pitch: String,
    payload: Option<UndoPayload>,
}

impl ChangePitchCommand {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        event_id: EventId,
        note_id: NoteId,
        pitch: impl Into<String>,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            note_id,
            pitch: pitch.into(),
            payload: None,
        }
    }
}

impl Command for ChangePitchCommand {
    fn label(&self) -> &str {
        "Change Pitch"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let pitch: Pitch = self.pitch.parse()?;
        let Some(event) = score.event(self.staff_index, self.measure_index, &self.event_id) else {
            return Ok(Arc::clone(score));
        };
        let Some(note) = event.find_note(&self.note_id) else {
            return Ok(Arc::clone(score));
        };
        if event.is_rest || note.pitch.as_deref() == Some(self.pitch.as_str()) {
            return Ok(Arc::clone(score));
        }

        let key = &score.staves[self.staff_index].key_signature;
        let accidental = pitch.written_accidental(key);
        self.payload = Some(UndoPayload::ReplacedNote {
            previous: note.clone(),
        });
        Ok(update_note(
            score,
            self.staff_index,
            self.measure_index,
            &self.event_id,
            &self.note_id,
            |n| {
                n.pitch = Some(pitch.to_string());
                n.accidental = accidental;
            },
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::ReplacedNote { previous }) => Ok(restore_note(
                score,
                self.staff_index,
                self.measure_index,
                &self.event_id,
                previous,
            )),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Field changes for [`UpdateNoteCommand`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteUpdate {
    pub pitch: Option<String>,
    pub accidental: Option<Option<Accidental>>,
    pub tied: Option<bool>,
}

impl NoteUpdate {
    pub fn pitch(mut self, pitch: impl Into<String>) -> Self {
        self.pitch = Some(pitch.into());
        self
    }

    pub fn accidental(mut self, accidental: Option<Accidental>) -> Self {
        self.accidental = Some(accidental);
        self
    }

    pub fn tied(mut self, tied: bool) -> Self {
        self.tied = Some(tied);
        self
    }

    fn apply(&self, note: &mut Note) {
        if let Some(pitch) = &self.pitch {
            note.pitch = Some(pitch.clone());
        }
        if let Some(accidental) = self.accidental {
            note.accidental = accidental;
        }
        if let Some(tied) = self.tied {
            note.tied = tied;
        }
    }
}

/// Applies a [`NoteUpdate`] to one note.
#[derive(Debug)]
pub struct UpdateNoteCommand {
    staff_index: usize,
    measure_index: usize,
    event_id: EventId,
    note_id: NoteId,
    update: NoteUpdate,
    payload: Option<UndoPayload>,
}

impl UpdateNoteCommand {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        event_id: EventId,
        note_id: NoteId,
        update: NoteUpdate,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            note_id,
            update,
            payload: None,
        }
    }
}

impl Command for UpdateNoteCommand {
    fn label(&self) -> &str {
        "Update Note"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(event) = score.event(self.staff_index, self.measure_index, &self.event_id) else {
            return Ok(Arc::clone(score));
        };
        let Some(note) = event.find_note(&self.note_id) else {
            return Ok(Arc::clone(score));
        };

        let mut updated = note.clone();
        self.update.apply(&mut updated);
        // A rest placeholder must stay pitchless.
        if updated == *note || (event.is_rest && updated.pitch.is_some()) {
            return Ok(Arc::clone(score));
        }

        self.payload = Some(UndoPayload::ReplacedNote {
            previous: note.clone(),
        });
        Ok(update_note(
            score,
            self.staff_index,
            self.measure_index,
            &self.event_id,
            &self.note_id,
            |n| *n = updated,
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::ReplacedNote { previous }) => Ok(restore_note(
                score,
                self.staff_index,
                self.measure_index,
                &self.event_id,
                previous,
            )),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Field changes for [`UpdateEventCommand`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub duration: Option<Duration>,
    pub dotted: Option<bool>,
}

impl EventUpdate {
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn dotted(mut self, dotted: bool) -> Self {
        self.dotted = Some(dotted);
        self
    }

    pub(crate) fn apply(&self, event: &mut ScoreEvent) {
        if let Some(duration) = self.duration {
            event.duration = duration;
        }
        if let Some(dotted) = self.dotted {
            event.dotted = dotted;
        }
    }
}

/// Applies an [`EventUpdate`] to one event. Measure capacity is the
/// caller's concern.
#[derive(Debug)]
pub struct UpdateEventCommand {
    staff_index: usize,
    measure_index: usize,
    event_id: EventId,
    update: EventUpdate,
    payload: Option<UndoPayload>,
}

impl UpdateEventCommand {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        event_id: EventId,
        update: EventUpdate,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            update,
            payload: None,
        }
    }
}

impl Command for UpdateEventCommand {
    fn label(&self) -> &str {
        "Update Event"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(event) = score.event(self.staff_index, self.measure_index, &self.event_id) else {
            return Ok(Arc::clone(score));
        };

        let mut updated = event.clone();
        self.update.apply(&mut updated);
        if updated == *event {
            return Ok(Arc::clone(score));
        }

        self.payload = Some(UndoPayload::ReplacedEvent {
            previous: event.clone(),
        });
        Ok(restore_event(
            score,
            self.staff_index,
            self.measure_index,
            &updated,
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

fn restore_note(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    event_id: &EventId,
    previous: Note,
) -> Arc<Score> {
    let note_id = previous.id.clone();
    update_note(score, staff_index, measure_index, event_id, &note_id, |n| {
        *n = previous;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use crate::commands::fixtures::melody;
    use cadenza_score::ScoreBuilder;
    use cadenza_score::Clef;

    fn first_note(score: &Score) -> (EventId, NoteId) {
        let event = &score.staves[0].measures[0].events[0];
        (event.id.clone(), event.notes[0].id.clone())
    }

    #[test]
    fn test_change_pitch_round_trip() {
        let score = melody();
        let (event_id, note_id) = first_note(&score);
        let mut command = ChangePitchCommand::new(0, 0, event_id.clone(), note_id, "F#4");

        let next = command.execute(&score).unwrap();
        let note = &next.event(0, 0, &event_id).unwrap().notes[0];
        assert_eq!(note.pitch.as_deref(), Some("F#4"));
        assert_eq!(note.accidental, Some(Accidental::Sharp));

        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_change_pitch_respects_staff_key() {
        let score = Arc::new(
            ScoreBuilder::new()
                .key_signature("G")
                .staff(Clef::Treble, |s| {
                    s.measure(|m| {
                        m.note(Duration::Quarter, "C4");
                    });
                })
                .build()
                .unwrap(),
        );
        let (event_id, note_id) = first_note(&score);
        let mut command = ChangePitchCommand::new(0, 0, event_id.clone(), note_id, "F#4");
        let next = command.execute(&score).unwrap();
        assert_eq!(next.event(0, 0, &event_id).unwrap().notes[0].accidental, None);
    }

    #[test]
    fn test_change_pitch_stale_target_is_noop() {
        let score = melody();
        let (event_id, _) = first_note(&score);
        let mut command = ChangePitchCommand::new(0, 0, event_id, NoteId::from("stale"), "G4");
        let next = command.execute(&score).unwrap();
        assert!(Arc::ptr_eq(&score, &next));
        assert!(Arc::ptr_eq(&next, &command.undo(&next).unwrap()));
    }

    #[test]
    fn test_change_pitch_rejects_garbage() {
        let score = melody();
        let (event_id, note_id) = first_note(&score);
        let mut command = ChangePitchCommand::new(0, 0, event_id, note_id, "H9");
        assert!(matches!(command.execute(&score), Err(CoreError::Score(_))));
    }

    #[test]
    fn test_update_note_sets_tie() {
        let score = melody();
        let (event_id, note_id) = first_note(&score);
        let mut command = UpdateNoteCommand::new(
            0,
            0,
            event_id.clone(),
            note_id,
            NoteUpdate::default().tied(true),
        );

        let next = command.execute(&score).unwrap();
        assert!(next.event(0, 0, &event_id).unwrap().notes[0].tied);
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_update_note_cannot_pitch_a_rest() {
        let score = melody();
        let rest = &score.staves[0].measures[1].events[1];
        let mut command = UpdateNoteCommand::new(
            0,
            1,
            rest.id.clone(),
            rest.notes[0].id.clone(),
            NoteUpdate::default().pitch("C5"),
        );
        assert!(Arc::ptr_eq(&score, &command.execute(&score).unwrap()));
    }

    #[test]
    fn test_update_event_duration_and_dot() {
        let score = melody();
        let (event_id, _) = first_note(&score);
        let mut command = UpdateEventCommand::new(
            0,
            0,
            event_id.clone(),
            EventUpdate::default()
                .duration(Duration::Eighth)
                .dotted(true),
        );

        let next = command.execute(&score).unwrap();
        let event = next.event(0, 0, &event_id).unwrap();
        assert_eq!(event.duration, Duration::Eighth);
        assert!(event.dotted);
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_unchanged_update_is_noop() {
        let score = melody();
        let (event_id, _) = first_note(&score);
        let mut command = UpdateEventCommand::new(
            0,
            0,
            event_id,
            EventUpdate::default().duration(Duration::Quarter),
        );
        assert!(Arc::ptr_eq(&score, &command.execute(&score).unwrap()));
        assert!(command.payload().is_none());
    }
}
