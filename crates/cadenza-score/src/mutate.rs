//! Copy-on-write updates over score snapshots.
//!
//! Each helper resolves a path (staff, measure, event, note) against the
//! borrowed snapshot first. If any step is missing the input `Arc` is
//! returned as-is, so `Arc::ptr_eq(&before, &after)` means "nothing
//! happened". Otherwise the score is cloned, the transform runs on the
//! clone, and the clone is returned as a new snapshot; the original stays
//! untouched for undo.

use std::sync::Arc;

use crate::model::{EventId, Measure, Note, NoteId, Score, ScoreEvent, Staff};

/// Applies `f` to a fresh copy of the whole score.
pub fn update_score(score: &Arc<Score>, f: impl FnOnce(&mut Score)) -> Arc<Score> {
    let mut next = Score::clone(score);
    f(&mut next);
    Arc::new(next)
}

/// Applies `f` to one staff.
pub fn update_staff(
    score: &Arc<Score>,
    staff_index: usize,
    f: impl FnOnce(&mut Staff),
) -> Arc<Score> {
    if score.staff(staff_index).is_none() {
        return Arc::clone(score);
    }
    update_score(score, |s| f(&mut s.staves[staff_index]))
}

/// Applies `f` to one measure.
pub fn update_measure(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    f: impl FnOnce(&mut Measure),
) -> Arc<Score> {
    if score.measure(staff_index, measure_index).is_none() {
        return Arc::clone(score);
    }
    update_score(score, |s| {
        f(&mut s.staves[staff_index].measures[measure_index]);
    })
}

/// Applies `f` to the event with `event_id` inside one measure.
pub fn update_event(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    event_id: &EventId,
    f: impl FnOnce(&mut ScoreEvent),
) -> Arc<Score> {
    let Some(event_index) = score
        .measure(staff_index, measure_index)
        .and_then(|m| m.event_index(event_id))
    else {
        return Arc::clone(score);
    };
    update_measure(score, staff_index, measure_index, |m| {
        f(&mut m.events[event_index]);
    })
}

/// Applies `f` to one note of one event.
pub fn update_note(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    event_id: &EventId,
    note_id: &NoteId,
    f: impl FnOnce(&mut Note),
) -> Arc<Score> {
    let Some(note_index) = score
        .event(staff_index, measure_index, event_id)
        .and_then(|e| e.note_index(note_id))
    else {
        return Arc::clone(score);
    };
    update_event(score, staff_index, measure_index, event_id, |e| {
        f(&mut e.notes[note_index]);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Clef, Duration, TimeSignature};

    fn sample() -> (Arc<Score>, EventId, NoteId) {
        let mut score = Score::blank(&[Clef::Treble], 2, TimeSignature::COMMON);
        let event = ScoreEvent::note(Duration::Quarter, false, "C4");
        let ids = (event.id.clone(), event.notes[0].id.clone());
        score.staves[0].measures[0].events.push(event);
        (Arc::new(score), ids.0, ids.1)
    }

    #[test]
    fn test_update_note_copies_on_write() {
        let (score, event_id, note_id) = sample();
        let next = update_note(&score, 0, 0, &event_id, &note_id, |n| {
            n.pitch = Some("G4".into());
        });

        assert!(!Arc::ptr_eq(&score, &next));
        let before = score.event(0, 0, &event_id).unwrap();
        let after = next.event(0, 0, &event_id).unwrap();
        assert_eq!(before.notes[0].pitch.as_deref(), Some("C4"));
        assert_eq!(after.notes[0].pitch.as_deref(), Some("G4"));
    }

    #[test]
    fn test_unresolved_paths_are_no_ops() {
        let (score, event_id, note_id) = sample();
        let missing_event = EventId::from("nope");
        let missing_note = NoteId::from("nope");

        assert!(Arc::ptr_eq(&score, &update_staff(&score, 3, |_| {})));
        assert!(Arc::ptr_eq(&score, &update_measure(&score, 0, 9, |_| {})));
        assert!(Arc::ptr_eq(
            &score,
            &update_event(&score, 0, 1, &event_id, |_| {})
        ));
        assert!(Arc::ptr_eq(
            &score,
            &update_event(&score, 0, 0, &missing_event, |_| {})
        ));
        assert!(Arc::ptr_eq(
            &score,
            &update_note(&score, 0, 0, &event_id, &missing_note, |_| {})
        ));
        assert!(!Arc::ptr_eq(
            &score,
            &update_note(&score, 0, 0, &event_id, &note_id, |_| {})
        ));
    }
}
