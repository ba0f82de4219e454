//! Built-in score commands.
//!
//! Every command records its reversal data in an [`UndoPayload`] during
//! `execute` and consumes it in `undo`. A command whose target cannot be
//! resolved records nothing and returns the input snapshot untouched.

mod event;
mod layout;
mod note;
mod targets;
mod tuplet;

pub use event::{AddEventCommand, AddNoteToEventCommand, DeleteEventCommand, DeleteNoteCommand};
pub use layout::{
    AddMeasureCommand, DeleteMeasureCommand, LoadScoreCommand, SetGrandStaffCommand,
    SetKeySignatureCommand, SetSingleStaffCommand, SetTimeSignatureCommand,
};
pub use note::{
    ChangePitchCommand, EventUpdate, NoteUpdate, UpdateEventCommand, UpdateNoteCommand,
};
pub use targets::{ChromaticTransposeCommand, ToggleRestCommand, TransposeSelectionCommand};
pub use tuplet::{ApplyTupletCommand, RemoveTupletCommand};

use std::collections::HashSet;
use std::sync::Arc;

use cadenza_score::mutate::{update_event, update_score};
use cadenza_score::{Score, ScoreEvent, SelectedNote};

use crate::command::EventSnapshot;

/// Puts `previous` back in place of the event with the same ID.
fn restore_event(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    previous: &ScoreEvent,
) -> Arc<Score> {
    update_event(score, staff_index, measure_index, &previous.id, |e| {
        *e = previous.clone();
    })
}

/// Puts every snapshot back. Events that have since disappeared are skipped.
fn restore_events(score: &Arc<Score>, previous: &[EventSnapshot]) -> Arc<Score> {
    if previous.is_empty() {
        return Arc::clone(score);
    }
    update_score(score, |s| {
        for snapshot in previous {
            let slot = s
                .staves
                .get_mut(snapshot.staff_index)
                .and_then(|staff| staff.measures.get_mut(snapshot.measure_index))
                .and_then(|m| m.events.iter_mut().find(|e| e.id == snapshot.event.id));
            if let Some(event) = slot {
                *event = snapshot.event.clone();
            }
        }
    })
}

/// Snapshots of the distinct events addressed by `targets`, in first-seen
/// order. Targets that no longer resolve are dropped.
pub(crate) fn target_events(score: &Score, targets: &[SelectedNote]) -> Vec<EventSnapshot> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .filter_map(|target| {
            let event = score.event(target.staff_index, target.measure_index, &target.event_id)?;
            seen.insert(&event.id).then(|| EventSnapshot {
                staff_index: target.staff_index,
                measure_index: target.measure_index,
                event: event.clone(),
            })
        })
        .collect()
}
