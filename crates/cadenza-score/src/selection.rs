//! Selection and ghost-cursor state.
//!
//! ## Addressing by value
//!
//! A selection refers to staves and measures by index and to events and
//! notes by ID. It never borrows from the score, so it survives edits and
//! may go stale; [`Selection::retain_valid`] prunes what no longer exists.
//!
//! ## Primary vs. set
//!
//! `selected_notes` is the whole multi-selection; `event_id` / `note_id`
//! track the primary (most recently touched) note, and `anchor` is the
//! fixed end for range extension.

use serde::{Deserialize, Serialize};

use crate::model::{Duration, EventId, NoteId, Score};

/// Address of one selected note.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedNote {
    pub staff_index: usize,
    pub measure_index: usize,
    pub event_id: EventId,
    pub note_id: NoteId,
}

impl SelectedNote {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        event_id: EventId,
        note_id: NoteId,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            event_id,
            note_id,
        }
    }

    /// True if the address still resolves in `score`.
    pub fn resolves(&self, score: &Score) -> bool {
        score
            .event(self.staff_index, self.measure_index, &self.event_id)
            .is_some_and(|e| e.find_note(&self.note_id).is_some())
    }
}

/// Cursor and selection state.
///
/// `measure_index == None` with a known staff is either "nothing selected"
/// or a ghost cursor, depending on whether a [`PreviewNote`] is active.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub staff_index: usize,
    pub measure_index: Option<usize>,
    pub event_id: Option<EventId>,
    pub note_id: Option<NoteId>,
    #[serde(default)]
    pub selected_notes: Vec<SelectedNote>,
    #[serde(default)]
    pub anchor: Option<SelectedNote>,
}

impl Selection {
    /// Nothing selected; the cursor sits on `staff_index`.
    pub fn empty(staff_index: usize) -> Self {
        Self {
            staff_index,
            ..Self::default()
        }
    }

    /// A single selected note that is also the range anchor.
    pub fn single(note: SelectedNote) -> Self {
        Self {
            staff_index: note.staff_index,
            measure_index: Some(note.measure_index),
            event_id: Some(note.event_id.clone()),
            note_id: Some(note.note_id.clone()),
            selected_notes: vec![note.clone()],
            anchor: Some(note),
        }
    }

    /// True when no event is selected.
    pub fn is_empty(&self) -> bool {
        self.event_id.is_none() && self.selected_notes.is_empty()
    }

    /// True when more than one note is selected.
    pub fn is_multi(&self) -> bool {
        self.selected_notes.len() > 1
    }

    /// The primary note, if one is selected.
    pub fn primary(&self) -> Option<SelectedNote> {
        Some(SelectedNote {
            staff_index: self.staff_index,
            measure_index: self.measure_index?,
            event_id: self.event_id.clone()?,
            note_id: self.note_id.clone()?,
        })
    }

    pub fn contains(&self, note: &SelectedNote) -> bool {
        self.selected_notes.contains(note)
    }

    /// Notes a batch operation should act on: the multi-selection, or the
    /// primary note alone.
    pub fn targets(&self) -> Vec<SelectedNote> {
        if !self.selected_notes.is_empty() {
            return self.selected_notes.clone();
        }
        self.primary().into_iter().collect()
    }

    /// Adds `note` to the set, or removes it if already present. The
    /// primary follows the most recent addition.
    pub fn toggle(&mut self, note: SelectedNote) {
        if let Some(position) = self.selected_notes.iter().position(|n| n == &note) {
            self.selected_notes.remove(position);
            if self.primary().as_ref() == Some(&note) {
                self.set_primary(self.selected_notes.last().cloned());
            }
        } else {
            if self.selected_notes.is_empty() {
                self.selected_notes.extend(self.primary());
            }
            self.selected_notes.push(note.clone());
            if self.anchor.is_none() {
                self.anchor = Some(note.clone());
            }
            self.set_primary(Some(note));
        }
    }

    /// Replaces the set with `notes`, keeping the anchor, and makes `focus`
    /// the primary.
    pub fn extend_to(&mut self, notes: Vec<SelectedNote>, focus: SelectedNote) {
        self.selected_notes = notes;
        self.set_primary(Some(focus));
    }

    fn set_primary(&mut self, note: Option<SelectedNote>) {
        match note {
            Some(note) => {
                self.staff_index = note.staff_index;
                self.measure_index = Some(note.measure_index);
                self.event_id = Some(note.event_id);
                self.note_id = Some(note.note_id);
            }
            None => {
                self.measure_index = None;
                self.event_id = None;
                self.note_id = None;
                self.anchor = None;
            }
        }
    }

    /// Drops references that no longer resolve in `score`. Returns true if
    /// anything was removed.
    pub fn retain_valid(&mut self, score: &Score) -> bool {
        let before = self.selected_notes.len();
        self.selected_notes.retain(|n| n.resolves(score));
        let mut changed = before != self.selected_notes.len();

        if let Some(primary) = self.primary() {
            if !primary.resolves(score) {
                let fallback = self.selected_notes.last().cloned();
                self.set_primary(fallback);
                changed = true;
            }
        }
        if self.anchor.as_ref().is_some_and(|a| !a.resolves(score)) {
            self.anchor = self.primary();
            changed = true;
        }
        if self.staff_index >= score.staves.len() {
            self.staff_index = score.staves.len().saturating_sub(1);
            changed = true;
        }
        changed
    }
}

/// How a preview note would be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PreviewMode {
    Append,
    Insert,
    Chord,
}

/// What produced the preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewSource {
    Hover,
    Keyboard,
}

/// The ghost cursor: a position with no event under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewNote {
    pub measure_index: usize,
    pub staff_index: usize,
    pub quant: f64,
    pub pitch: String,
    pub duration: Duration,
    pub dotted: bool,
    pub mode: PreviewMode,
    /// Event index the note would be inserted at
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    pub is_rest: bool,
    pub source: PreviewSource,
}
