//! Cursor movement over the staff × time grid.
//!
//! [`navigate`] is a pure function of the score, the current selection and
//! the ghost cursor. It never edits anything; the caller installs the
//! outcome and, if the outcome asks for it, creates the requested measure.
//!
//! ## Rules
//!
//! - **Left/Right** step through events, crossing bar lines. Stepping right
//!   off the last event of a bar that still has room lands on a ghost
//!   cursor at the bar's append position. Stepping past the last bar puts
//!   the ghost in a bar that does not exist yet and asks the host for it.
//! - **Up/Down** on a chord walk its notes by pitch. At the outer note (or
//!   on a single note) the cursor changes staff, wrapping around when
//!   cycling is enabled, and lands on whatever event sounds at the same
//!   quant. With nothing there it becomes a ghost at the target bar's
//!   append position.

use cadenza_score::pitch::midi_of;
use cadenza_score::quant::{QUANT_EPSILON, event_at_quant, event_offsets, quant_at_index};
use cadenza_score::{
    DefaultPitches, Duration, NoteId, PreviewMode, PreviewNote, PreviewSource, Score, ScoreEvent,
    SelectedNote, Selection,
};
use serde::{Deserialize, Serialize};

/// Arrow-key direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// Input state a ghost cursor is created with.
#[derive(Debug, Clone, Copy)]
pub struct NavigationContext<'a> {
    pub duration: Duration,
    pub dotted: bool,
    pub is_rest: bool,
    /// Wrap vertically from the last staff to the first and back
    pub cycle_staves: bool,
    pub default_pitches: &'a DefaultPitches,
}

/// Where the cursor ends up.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOutcome {
    pub selection: Selection,
    /// Set when the cursor is a ghost
    pub preview: Option<PreviewNote>,
    /// Measure index the host should create, if the ghost ran past the end
    pub request_measure: Option<usize>,
}

impl NavigationOutcome {
    fn select(staff_index: usize, measure_index: usize, event: &ScoreEvent, note_id: NoteId) -> Self {
        Self {
            selection: Selection::single(SelectedNote::new(
                staff_index,
                measure_index,
                event.id.clone(),
                note_id,
            )),
            preview: None,
            request_measure: None,
        }
    }

    fn select_first_note(staff_index: usize, measure_index: usize, event: &ScoreEvent) -> Option<Self> {
        let note = event.notes.first()?;
        Some(Self::select(staff_index, measure_index, event, note.id.clone()))
    }

    fn ghost(preview: PreviewNote) -> Self {
        Self {
            selection: Selection::empty(preview.staff_index),
            preview: Some(preview),
            request_measure: None,
        }
    }
}

/// Where the cursor currently is.
enum Cursor<'s> {
    Event {
        staff_index: usize,
        measure_index: usize,
        event_index: usize,
        event: &'s ScoreEvent,
        note_id: NoteId,
    },
    Ghost {
        staff_index: usize,
        measure_index: usize,
        quant: f64,
        pitch: String,
    },
}

impl Cursor<'_> {
    fn staff_index(&self) -> usize {
        match self {
            Cursor::Event { staff_index, .. } | Cursor::Ghost { staff_index, .. } => *staff_index,
        }
    }
}

/// Resolves a cursor move. `None` means the cursor stays where it is.
pub fn navigate(
    score: &Score,
    selection: &Selection,
    preview: Option<&PreviewNote>,
    direction: Direction,
    ctx: &NavigationContext<'_>,
) -> Option<NavigationOutcome> {
    let Some(cursor) = resolve_cursor(score, selection, preview) else {
        return match direction {
            Direction::Right | Direction::Left => start_of_staff(score, selection.staff_index, ctx),
            Direction::Up | Direction::Down => None,
        };
    };

    let outcome = match direction {
        Direction::Right => move_right(score, &cursor, ctx),
        Direction::Left => move_left(score, &cursor, ctx),
        Direction::Up | Direction::Down => move_vertical(score, &cursor, direction, ctx),
    };
    tracing::debug!(
        "Navigate {:?} from staff {}: {}",
        direction,
        cursor.staff_index(),
        if outcome.is_some() { "moved" } else { "stayed" }
    );
    outcome
}

fn resolve_cursor<'s>(
    score: &'s Score,
    selection: &Selection,
    preview: Option<&PreviewNote>,
) -> Option<Cursor<'s>> {
    if let Some(primary) = selection.primary() {
        let measure = score.measure(primary.staff_index, primary.measure_index)?;
        let event_index = measure.event_index(&primary.event_id)?;
        let event = &measure.events[event_index];
        event.find_note(&primary.note_id)?;
        return Some(Cursor::Event {
            staff_index: primary.staff_index,
            measure_index: primary.measure_index,
            event_index,
            event,
            note_id: primary.note_id,
        });
    }
    let preview = preview?;
    score.staff(preview.staff_index)?;
    Some(Cursor::Ghost {
        staff_index: preview.staff_index,
        measure_index: preview.measure_index,
        quant: preview.quant,
        pitch: preview.pitch.clone(),
    })
}

/// First event of the staff, or a ghost in its first bar.
fn start_of_staff(
    score: &Score,
    staff_index: usize,
    ctx: &NavigationContext<'_>,
) -> Option<NavigationOutcome> {
    let staff = score.staff(staff_index)?;
    let measure = staff.measures.first()?;
    match measure.events.first() {
        Some(event) => NavigationOutcome::select_first_note(staff_index, 0, event),
        None => Some(NavigationOutcome::ghost(ghost_at_end(
            score,
            staff_index,
            0,
            ctx.default_pitches.for_clef(staff.clef).to_string(),
            ctx,
        ))),
    }
}

// ==================== Horizontal ====================

fn move_right(score: &Score, cursor: &Cursor<'_>, ctx: &NavigationContext<'_>) -> Option<NavigationOutcome> {
    match cursor {
        Cursor::Event {
            staff_index,
            measure_index,
            event_index,
            event,
            ..
        } => {
            let (s, m) = (*staff_index, *measure_index);
            let measure = score.measure(s, m)?;
            if let Some(next) = measure.events.get(event_index + 1) {
                return NavigationOutcome::select_first_note(s, m, next);
            }
            let pitch = event
                .notes
                .iter()
                .find_map(|n| n.pitch.clone())
                .unwrap_or_else(|| default_pitch(score, s, ctx));
            let has_room = measure.total_quants() + QUANT_EPSILON < f64::from(score.quants_per_measure());
            if has_room {
                return Some(NavigationOutcome::ghost(ghost_at_end(score, s, m, pitch, ctx)));
            }
            Some(enter_measure(score, s, m + 1, pitch, ctx))
        }
        Cursor::Ghost {
            staff_index,
            measure_index,
            quant,
            pitch,
        } => {
            let (s, m) = (*staff_index, *measure_index);
            if m >= score.measure_count() {
                return None;
            }
            // A ghost placed mid-bar steps onto the next event after it.
            if let Some(measure) = score.measure(s, m) {
                let offsets = event_offsets(measure);
                let next = offsets
                    .iter()
                    .position(|&start| start + QUANT_EPSILON >= *quant);
                if let Some(index) = next {
                    return NavigationOutcome::select_first_note(s, m, &measure.events[index]);
                }
            }
            Some(enter_measure(score, s, m + 1, pitch.clone(), ctx))
        }
    }
}

/// Moves onto bar `measure_index`: its first event, a ghost at its start,
/// or a ghost in a bar that must still be created.
fn enter_measure(
    score: &Score,
    staff_index: usize,
    measure_index: usize,
    pitch: String,
    ctx: &NavigationContext<'_>,
) -> NavigationOutcome {
    if let Some(first) = score
        .measure(staff_index, measure_index)
        .and_then(|m| m.events.first())
    {
        if let Some(outcome) = NavigationOutcome::select_first_note(staff_index, measure_index, first) {
            return outcome;
        }
    }
    let mut outcome =
        NavigationOutcome::ghost(ghost_at_end(score, staff_index, measure_index, pitch, ctx));
    if measure_index >= score.measure_count() {
        outcome.request_measure = Some(measure_index);
    }
    outcome
}

fn move_left(score: &Score, cursor: &Cursor<'_>, ctx: &NavigationContext<'_>) -> Option<NavigationOutcome> {
    match cursor {
        Cursor::Event {
            staff_index,
            measure_index,
            event_index,
            ..
        } => {
            let (s, m) = (*staff_index, *measure_index);
            if *event_index > 0 {
                let measure = score.measure(s, m)?;
                return NavigationOutcome::select_first_note(s, m, &measure.events[event_index - 1]);
            }
            leave_measure_backwards(score, s, m, ctx)
        }
        Cursor::Ghost {
            staff_index,
            measure_index,
            quant,
            ..
        } => {
            let (s, m) = (*staff_index, *measure_index);
            if let Some(measure) = score.measure(s, m) {
                let offsets = event_offsets(measure);
                let before = offsets
                    .iter()
                    .rposition(|&start| start <= *quant + QUANT_EPSILON);
                if let Some(index) = before {
                    return NavigationOutcome::select_first_note(s, m, &measure.events[index]);
                }
            }
            leave_measure_backwards(score, s, m, ctx)
        }
    }
}

/// Moves to the last event of the bar before `measure_index`, or to a
/// ghost in it if it is empty.
fn leave_measure_backwards(
    score: &Score,
    staff_index: usize,
    measure_index: usize,
    ctx: &NavigationContext<'_>,
) -> Option<NavigationOutcome> {
    let previous = measure_index.checked_sub(1)?;
    let measure = score.measure(staff_index, previous)?;
    match measure.events.last() {
        Some(last) => NavigationOutcome::select_first_note(staff_index, previous, last),
        None => Some(NavigationOutcome::ghost(ghost_at_end(
            score,
            staff_index,
            previous,
            default_pitch(score, staff_index, ctx),
            ctx,
        ))),
    }
}

// ==================== Vertical ====================

/// Moves to the adjacent staff at the cursor's quant, walking a chord
/// note by note first.
///
/// If no event on the target staff covers that quant, the ghost goes to
/// the target bar's append position rather than to quant 0. That is quant 0
/// only when the bar is empty; otherwise it sits after the bar's last
/// event, so the ghost's index always equals the bar's event count.
fn move_vertical(
    score: &Score,
    cursor: &Cursor<'_>,
    direction: Direction,
    ctx: &NavigationContext<'_>,
) -> Option<NavigationOutcome> {
    let (staff_index, measure_index, quant) = match cursor {
        Cursor::Event {
            staff_index,
            measure_index,
            event_index,
            event,
            note_id,
        } => {
            if let Some(outcome) =
                walk_chord(*staff_index, *measure_index, event, note_id, direction)
            {
                return Some(outcome);
            }
            let measure = score.measure(*staff_index, *measure_index)?;
            (*staff_index, *measure_index, quant_at_index(measure, *event_index))
        }
        Cursor::Ghost {
            staff_index,
            measure_index,
            quant,
            ..
        } => (*staff_index, *measure_index, *quant),
    };

    let target = adjacent_staff(score, staff_index, direction, ctx.cycle_staves)?;
    let landing = score
        .measure(target, measure_index)
        .and_then(|m| event_at_quant(m, quant));
    if let Some((_, event)) = landing {
        let note = entry_note(event, direction)?;
        return Some(NavigationOutcome::select(target, measure_index, event, note));
    }

    let mut outcome = NavigationOutcome::ghost(ghost_at_end(
        score,
        target,
        measure_index,
        default_pitch(score, target, ctx),
        ctx,
    ));
    if measure_index >= score.measure_count() {
        outcome.request_measure = Some(measure_index);
    }
    Some(outcome)
}

/// Next note of a chord in pitch order, `None` at the outer note.
fn walk_chord(
    staff_index: usize,
    measure_index: usize,
    event: &ScoreEvent,
    note_id: &NoteId,
    direction: Direction,
) -> Option<NavigationOutcome> {
    if !event.is_chord() {
        return None;
    }
    let sorted = notes_by_pitch(event);
    let position = sorted.iter().position(|id| id == note_id)?;
    let next = match direction {
        Direction::Up => sorted.get(position + 1)?,
        Direction::Down => sorted.get(position.checked_sub(1)?)?,
        Direction::Left | Direction::Right => return None,
    };
    Some(NavigationOutcome::select(
        staff_index,
        measure_index,
        event,
        next.clone(),
    ))
}

/// Note IDs of an event, lowest pitch first. Rests and unreadable pitches
/// sort below everything else.
fn notes_by_pitch(event: &ScoreEvent) -> Vec<NoteId> {
    let mut notes: Vec<_> = event
        .notes
        .iter()
        .map(|n| (n.pitch.as_deref().and_then(midi_of).unwrap_or(i32::MIN), n.id.clone()))
        .collect();
    notes.sort_by_key(|(midi, _)| *midi);
    notes.into_iter().map(|(_, id)| id).collect()
}

/// The note a vertical move lands on: the top of a chord coming from
/// above, the bottom coming from below.
fn entry_note(event: &ScoreEvent, direction: Direction) -> Option<NoteId> {
    let sorted = notes_by_pitch(event);
    match direction {
        Direction::Down => sorted.last().cloned(),
        _ => sorted.first().cloned(),
    }
}

fn adjacent_staff(score: &Score, staff_index: usize, direction: Direction, cycle: bool) -> Option<usize> {
    let count = score.staves.len();
    if count < 2 {
        return None;
    }
    match direction {
        Direction::Up if staff_index > 0 => Some(staff_index - 1),
        Direction::Up if cycle => Some(count - 1),
        Direction::Down if staff_index + 1 < count => Some(staff_index + 1),
        Direction::Down if cycle => Some(0),
        _ => None,
    }
}

// ==================== Ghost cursor ====================

/// A ghost at the append position of a bar (quant 0 if the bar is empty or
/// does not exist yet).
fn ghost_at_end(
    score: &Score,
    staff_index: usize,
    measure_index: usize,
    pitch: String,
    ctx: &NavigationContext<'_>,
) -> PreviewNote {
    let (quant, index) = score
        .measure(staff_index, measure_index)
        .map_or((0.0, 0), |m| (m.total_quants(), m.events.len()));
    PreviewNote {
        measure_index,
        staff_index,
        quant,
        pitch,
        duration: ctx.duration,
        dotted: ctx.dotted,
        mode: PreviewMode::Append,
        index,
        event_id: None,
        is_rest: ctx.is_rest,
        source: PreviewSource::Keyboard,
    }
}

fn default_pitch(score: &Score, staff_index: usize, ctx: &NavigationContext<'_>) -> String {
    let clef = score.staff(staff_index).map(|s| s.clef).unwrap_or_default();
    ctx.default_pitches.for_clef(clef).to_string()
}
