//! The editing facade.
//!
//! [`ScoreEditor`] owns the command engine together with the selection,
//! the ghost cursor and the note-entry state. Hosts call its methods in
//! response to input and listen on the event bus.
//!
//! Every editing method returns true if it changed the score or the
//! cursor. A refused edit returns false and is also reported as
//! [`EditorEvent::CommandRejected`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cadenza_score::quant::{
    QUANT_EPSILON, can_add_event_to_measure, event_offsets, event_quants, quant_at_index,
};
use cadenza_score::timeline::{TimelineEntry, build_timeline};
use cadenza_score::{
    Clef, Duration, EventId, Pitch, PreviewNote, Score, ScoreEvent, SelectedNote, Selection,
    TimeSignature, TupletRatio,
};

use crate::adapter::{AudioSink, ScoreExporter, schedule_playback};
use crate::command::{BatchCommand, Command, EventSnapshot};
use crate::commands::{
    AddEventCommand, AddMeasureCommand, AddNoteToEventCommand, ApplyTupletCommand,
    ChromaticTransposeCommand, DeleteMeasureCommand, DeleteNoteCommand, EventUpdate,
    LoadScoreCommand, RemoveTupletCommand, SetGrandStaffCommand, SetKeySignatureCommand,
    SetSingleStaffCommand, SetTimeSignatureCommand, ToggleRestCommand, TransposeSelectionCommand,
    UpdateEventCommand, target_events,
};
use crate::config::Config;
use crate::engine::CommandEngine;
use crate::event::{EditorEvent, EventBus, EventHandler};
use crate::navigation::{Direction, NavigationContext, navigate};
use crate::{CoreError, CoreResult};

/// What the next entered event looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputState {
    pub duration: Duration,
    pub dotted: bool,
    /// Enter rests instead of notes
    pub rest_mode: bool,
}

impl InputState {
    fn from_config(config: &Config) -> Self {
        Self {
            duration: config.editor.default_duration,
            dotted: config.editor.default_dotted,
            rest_mode: false,
        }
    }
}

/// One open score with its cursor and history.
///
/// Owned by a single thread. Notifications leave through the event bus,
/// which never blocks.
#[derive(Debug)]
pub struct ScoreEditor {
    /// Live snapshot and undo history
    engine: CommandEngine,

    selection: Selection,

    /// Ghost cursor, set when the cursor has no event under it
    preview: Option<PreviewNote>,

    input: InputState,

    config: Config,

    event_bus: EventBus,
}

impl ScoreEditor {
    /// Creates an editor on an empty treble-clef score built from the
    /// config's score defaults.
    pub fn new(config: Config) -> Self {
        let score = config.score.new_score(&[Clef::Treble]);
        Self::build(Arc::new(score), config)
    }

    /// Creates an editor on an existing score.
    pub fn open(score: impl Into<Arc<Score>>, config: Config) -> CoreResult<Self> {
        let score = score.into();
        score.validate().map_err(CoreError::InvalidState)?;
        Ok(Self::build(score, config))
    }

    fn build(score: Arc<Score>, config: Config) -> Self {
        Self {
            engine: CommandEngine::with_limit(score, config.editor.undo_limit),
            selection: Selection::empty(0),
            preview: None,
            input: InputState::from_config(&config),
            config,
            event_bus: EventBus::new(),
        }
    }

    // ==================== Accessors ====================

    /// The live snapshot.
    pub fn score(&self) -> &Arc<Score> {
        self.engine.state()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn preview(&self) -> Option<&PreviewNote> {
        self.preview.as_ref()
    }

    pub fn input(&self) -> InputState {
        self.input
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribes to editor events.
    pub fn subscribe(&self) -> EventHandler {
        EventHandler::new(self.event_bus.subscribe())
    }

    // ==================== Selection ====================

    /// Selects one note. Returns false if it does not exist.
    pub fn select_note(&mut self, note: SelectedNote) -> bool {
        if !note.resolves(self.score()) {
            return false;
        }
        self.set_preview(None);
        self.set_selection(Selection::single(note))
    }

    /// Selects the first note of an event.
    pub fn select_event(&mut self, staff_index: usize, measure_index: usize, event_id: &EventId) -> bool {
        let Some(event) = self.score().event(staff_index, measure_index, event_id) else {
            return false;
        };
        let Some(note) = event.notes.first() else {
            return false;
        };
        let note = SelectedNote::new(staff_index, measure_index, event.id.clone(), note.id.clone());
        self.select_note(note)
    }

    /// Adds a note to the selection, or removes it if already selected.
    pub fn toggle_select(&mut self, note: SelectedNote) -> bool {
        if !note.resolves(self.score()) {
            return false;
        }
        let mut selection = self.selection.clone();
        selection.toggle(note);
        self.set_preview(None);
        self.set_selection(selection)
    }

    /// Selects every note between the anchor and `focus`, across the
    /// staves the two span.
    pub fn extend_selection(&mut self, focus: SelectedNote) -> bool {
        let score = Arc::clone(self.score());
        if !focus.resolves(&score) {
            return false;
        }
        let anchor = self
            .selection
            .anchor
            .clone()
            .or_else(|| self.selection.primary())
            .unwrap_or_else(|| focus.clone());

        let mut selection = self.selection.clone();
        selection.anchor = Some(anchor.clone());
        selection.extend_to(notes_between(&score, &anchor, &focus), focus);
        self.set_preview(None);
        self.set_selection(selection)
    }

    /// Moves the focus one step and extends the selection to it.
    pub fn extend_cursor(&mut self, direction: Direction) -> bool {
        let outcome = {
            let ctx = self.navigation_context();
            navigate(self.score(), &self.selection, self.preview.as_ref(), direction, &ctx)
        };
        match outcome.and_then(|o| o.selection.primary()) {
            Some(focus) => self.extend_selection(focus),
            None => {
                self.emit(EditorEvent::NavigationBlocked(direction));
                false
            }
        }
    }

    /// Selects every note in the score.
    pub fn select_all(&mut self) -> bool {
        let score = Arc::clone(self.score());
        let notes: Vec<SelectedNote> = score
            .staves
            .iter()
            .enumerate()
            .flat_map(|(s, staff)| {
                staff.measures.iter().enumerate().flat_map(move |(m, measure)| {
                    measure.events.iter().flat_map(move |event| {
                        event
                            .notes
                            .iter()
                            .map(move |note| SelectedNote::new(s, m, event.id.clone(), note.id.clone()))
                    })
                })
            })
            .collect();

        let Some(first) = notes.first().cloned() else {
            return false;
        };
        let mut selection = Selection::single(first.clone());
        selection.extend_to(notes, first);
        self.set_preview(None);
        self.set_selection(selection)
    }

    pub fn clear_selection(&mut self) -> bool {
        let staff_index = self.selection.staff_index;
        let preview_cleared = self.set_preview(None);
        self.set_selection(Selection::empty(staff_index)) || preview_cleared
    }

    // ==================== Navigation ====================

    /// Moves the cursor. Running past the last measure leaves a ghost in a
    /// measure that does not exist yet and emits
    /// [`EditorEvent::MeasureRequested`].
    pub fn move_cursor(&mut self, direction: Direction) -> bool {
        let outcome = {
            let ctx = self.navigation_context();
            navigate(self.score(), &self.selection, self.preview.as_ref(), direction, &ctx)
        };
        let Some(outcome) = outcome else {
            tracing::debug!("Cursor cannot move {:?}", direction);
            self.emit(EditorEvent::NavigationBlocked(direction));
            return false;
        };

        if let Some(measure_index) = outcome.request_measure {
            self.emit(EditorEvent::MeasureRequested {
                staff_index: outcome.selection.staff_index,
                measure_index,
            });
        }
        let moved = self.set_selection(outcome.selection);
        self.set_preview(outcome.preview) || moved
    }

    fn navigation_context(&self) -> NavigationContext<'_> {
        NavigationContext {
            duration: self.input.duration,
            dotted: self.input.dotted,
            is_rest: self.input.rest_mode,
            cycle_staves: self.config.editor.cycle_staves,
            default_pitches: &self.config.input.default_pitches,
        }
    }

    // ==================== Note Entry ====================

    /// Inserts an event with the current input settings at the cursor: at
    /// the ghost's position, or after the selected event.
    ///
    /// A ghost sitting in a not-yet-created measure gets that measure
    /// appended first, in the same undo step.
    pub fn insert_note(&mut self, pitch: &str) -> bool {
        const LABEL: &str = "Insert Note";
        if !self.input.rest_mode && pitch.parse::<Pitch>().is_err() {
            self.reject(LABEL, format!("invalid pitch '{pitch}'"));
            return false;
        }

        let score = Arc::clone(self.score());
        let (staff_index, measure_index, index) = if let Some(preview) = &self.preview {
            (preview.staff_index, preview.measure_index, preview.index)
        } else if let Some((primary, event_index)) = self.primary_location() {
            (primary.staff_index, primary.measure_index, event_index + 1)
        } else {
            return false;
        };

        let needs_measure = measure_index == score.measure_count();
        let existing = match score.measure(staff_index, measure_index) {
            Some(measure) => measure.events.as_slice(),
            None if needs_measure && staff_index < score.staves.len() => &[],
            None => return false,
        };
        let InputState {
            duration,
            dotted,
            rest_mode,
        } = self.input;
        if !can_add_event_to_measure(existing, duration, dotted, None, score.quants_per_measure()) {
            self.reject(LABEL, "measure is full");
            return false;
        }

        let event = if rest_mode {
            ScoreEvent::rest(duration, dotted)
        } else {
            ScoreEvent::note(duration, dotted, pitch)
        };
        let Some(note) = event.notes.first() else {
            return false;
        };
        let target = SelectedNote::new(staff_index, measure_index, event.id.clone(), note.id.clone());
        let add = Box::new(AddEventCommand::new(staff_index, measure_index, event, Some(index)));

        let inserted = if needs_measure {
            self.begin_transaction();
            let ok = self.dispatch(Box::new(AddMeasureCommand::new())) && self.dispatch(add);
            if ok {
                self.commit_transaction(Some(LABEL));
            } else {
                self.rollback_transaction();
            }
            ok
        } else {
            self.dispatch(add)
        };

        if inserted {
            self.set_preview(None);
            self.set_selection(Selection::single(target));
        }
        inserted
    }

    /// Adds a pitch to the selected event, turning a rest into a note.
    pub fn add_to_chord(&mut self, pitch: &str) -> bool {
        let Some((primary, _)) = self.primary_location() else {
            return false;
        };
        let command = AddNoteToEventCommand::new(
            primary.staff_index,
            primary.measure_index,
            primary.event_id.clone(),
            pitch,
        );
        let note_id = command.note_id().clone();
        if !self.dispatch(Box::new(command)) {
            return false;
        }
        let note = SelectedNote::new(primary.staff_index, primary.measure_index, primary.event_id, note_id);
        self.set_selection(Selection::single(note));
        true
    }

    /// Sets the entry duration and resizes the selected events.
    pub fn set_duration(&mut self, duration: Duration) -> bool {
        self.input.duration = duration;
        self.update_events("Set Duration", EventUpdate::default().duration(duration))
    }

    /// Flips the dot of the selected event (applied to every selected
    /// event) or of the entry state.
    pub fn toggle_dot(&mut self) -> bool {
        let dotted = self
            .primary_location()
            .and_then(|(p, _)| {
                self.score()
                    .event(p.staff_index, p.measure_index, &p.event_id)
                    .map(|e| !e.dotted)
            })
            .unwrap_or(!self.input.dotted);
        self.input.dotted = dotted;
        self.update_events("Toggle Dot", EventUpdate::default().dotted(dotted))
    }

    fn update_events(&mut self, label: &str, update: EventUpdate) -> bool {
        let score = Arc::clone(self.score());
        let events = target_events(&score, &self.selection.targets());
        if events.is_empty() {
            self.sync_preview_with_input();
            return true;
        }
        if !update_fits(&score, &events, &update) {
            self.reject(label, "measure capacity exceeded");
            return false;
        }

        let commands: Vec<Box<dyn Command>> = events
            .into_iter()
            .map(|s| {
                Box::new(UpdateEventCommand::new(
                    s.staff_index,
                    s.measure_index,
                    s.event.id,
                    update.clone(),
                )) as Box<dyn Command>
            })
            .collect();
        self.dispatch(Box::new(BatchCommand::with_label(label, commands)))
    }

    fn sync_preview_with_input(&mut self) {
        if let Some(preview) = &self.preview {
            let next = PreviewNote {
                duration: self.input.duration,
                dotted: self.input.dotted,
                is_rest: self.input.rest_mode,
                ..preview.clone()
            };
            self.set_preview(Some(next));
        }
    }

    // ==================== Editing ====================

    /// Removes the selected notes. An event whose last note goes is
    /// removed whole. The cursor falls back to the previous event.
    pub fn delete_selection(&mut self) -> bool {
        let targets = self.selection.targets();
        if targets.is_empty() {
            return false;
        }
        let fallback = self.primary_location();

        let commands: Vec<Box<dyn Command>> = targets
            .into_iter()
            .map(|t| {
                Box::new(DeleteNoteCommand::new(
                    t.staff_index,
                    t.measure_index,
                    t.event_id,
                    t.note_id,
                )) as Box<dyn Command>
            })
            .collect();
        if !self.dispatch(Box::new(BatchCommand::with_label("Delete", commands))) {
            return false;
        }

        if self.selection.is_empty() {
            if let Some((primary, index)) = fallback {
                let previous = self
                    .score()
                    .measure(primary.staff_index, primary.measure_index)
                    .and_then(|m| m.events.get(index.checked_sub(1)?))
                    .map(|e| e.id.clone());
                if let Some(event_id) = previous {
                    self.select_event(primary.staff_index, primary.measure_index, &event_id);
                }
            }
        }
        true
    }

    /// Toggles the selection between notes and rests. With only a ghost
    /// cursor this flips rest entry instead.
    pub fn toggle_rest(&mut self) -> bool {
        let targets = self.selection.targets();
        if targets.is_empty() {
            self.input.rest_mode = !self.input.rest_mode;
            self.sync_preview_with_input();
            return true;
        }
        let pitches = self.config.input.default_pitches.clone();
        self.dispatch(Box::new(ToggleRestCommand::new(targets, pitches)))
    }

    /// Transposes the selection by semitones. A ghost cursor only has its
    /// pitch moved; nothing is recorded.
    pub fn transpose(&mut self, semitones: i32) -> bool {
        let targets = self.selection.targets();
        if targets.is_empty() {
            return self.shift_preview(|p, key| p.transpose_chromatic(semitones, key));
        }
        self.dispatch(Box::new(ChromaticTransposeCommand::new(targets, semitones)))
    }

    /// Transposes the selection by scale steps in each staff's key.
    pub fn transpose_diatonic(&mut self, steps: i32) -> bool {
        let targets = self.selection.targets();
        if targets.is_empty() {
            return self.shift_preview(|p, key| p.transpose_diatonic(steps, key));
        }
        self.dispatch(Box::new(TransposeSelectionCommand::new(targets, steps)))
    }

    fn shift_preview(&mut self, shift: impl Fn(&Pitch, &str) -> Pitch) -> bool {
        let Some(preview) = &self.preview else {
            return false;
        };
        let Ok(pitch) = preview.pitch.parse::<Pitch>() else {
            return false;
        };
        let key = staff_key(self.engine.state(), preview.staff_index);
        let next = PreviewNote {
            pitch: shift(&pitch, key).to_string(),
            ..preview.clone()
        };
        self.set_preview(Some(next))
    }

    /// Groups `group_size` events starting at the selected one.
    pub fn apply_tuplet(&mut self, ratio: TupletRatio, group_size: usize) -> bool {
        let Some((primary, index)) = self.primary_location() else {
            return false;
        };
        self.dispatch(Box::new(ApplyTupletCommand::new(
            primary.staff_index,
            primary.measure_index,
            index,
            group_size,
            ratio,
        )))
    }

    /// Dissolves the tuplet the selected event belongs to.
    pub fn remove_tuplet(&mut self) -> bool {
        let Some((primary, index)) = self.primary_location() else {
            return false;
        };
        self.dispatch(Box::new(RemoveTupletCommand::new(
            primary.staff_index,
            primary.measure_index,
            index,
        )))
    }

    // ==================== Score Layout ====================

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) -> bool {
        self.dispatch(Box::new(SetTimeSignatureCommand::new(time_signature)))
    }

    pub fn set_key_signature(&mut self, key: &str) -> bool {
        self.dispatch(Box::new(SetKeySignatureCommand::new(key)))
    }

    pub fn set_grand_staff(&mut self) -> bool {
        self.dispatch(Box::new(SetGrandStaffCommand::new()))
    }

    /// Drops every staff but the one the cursor is on.
    pub fn set_single_staff(&mut self) -> bool {
        let keep = self.selection.staff_index;
        self.dispatch(Box::new(SetSingleStaffCommand::keeping(keep)))
    }

    /// Appends a measure, or inserts one at `index`.
    pub fn add_measure(&mut self, index: Option<usize>) -> bool {
        let command = match index {
            Some(index) => AddMeasureCommand::at(index),
            None => AddMeasureCommand::new(),
        };
        self.dispatch(Box::new(command))
    }

    pub fn delete_measure(&mut self, index: usize) -> bool {
        self.dispatch(Box::new(DeleteMeasureCommand::new(index)))
    }

    /// Replaces the whole document as one undoable step.
    pub fn load_score(&mut self, score: Score) -> bool {
        if !self.dispatch(Box::new(LoadScoreCommand::new(score))) {
            return false;
        }
        self.set_preview(None);
        self.set_selection(Selection::empty(0));
        true
    }

    // ==================== History ====================

    pub fn undo(&mut self) -> bool {
        let result = self.engine.undo();
        self.settle("Undo", result)
    }

    pub fn redo(&mut self) -> bool {
        let result = self.engine.redo();
        self.settle("Redo", result)
    }

    pub fn can_undo(&self) -> bool {
        self.engine.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.engine.can_redo()
    }

    pub fn begin_transaction(&mut self) {
        self.engine.begin_transaction();
    }

    /// Closes one transaction level. Returns true if a history entry was
    /// created.
    pub fn commit_transaction(&mut self, label: Option<&str>) -> bool {
        let committed = self.engine.commit_transaction(label);
        if committed {
            self.emit(EditorEvent::TransactionCommitted {
                label: label.unwrap_or("Transaction").to_string(),
            });
            self.emit_history();
        }
        committed
    }

    /// Undoes everything since the outermost `begin_transaction`.
    pub fn rollback_transaction(&mut self) -> usize {
        let count = self.engine.rollback_transaction();
        if count > 0 {
            self.emit(EditorEvent::TransactionRolledBack { commands: count });
            self.after_change();
        }
        count
    }

    // ==================== Playback & Export ====================

    /// Sounding events of the live snapshot, in start order.
    pub fn playback_timeline(&self) -> Vec<TimelineEntry> {
        build_timeline(self.score())
    }

    /// Schedules the live snapshot on `sink`.
    pub fn play(&self, sink: &mut dyn AudioSink) -> usize {
        schedule_playback(self.score(), sink)
    }

    pub fn export(&self, exporter: &dyn ScoreExporter) -> CoreResult<String> {
        exporter.export(self.score())
    }

    // ==================== Internals ====================

    fn dispatch(&mut self, command: Box<dyn Command>) -> bool {
        let label = command.label().to_string();
        let result = self.engine.dispatch(command);
        self.settle(&label, result)
    }

    fn settle(&mut self, label: &str, result: CoreResult<bool>) -> bool {
        match result {
            Ok(true) => {
                self.after_change();
                true
            }
            Ok(false) => false,
            Err(CoreError::CommandFailed { reason, .. }) => {
                self.reject(label, reason);
                false
            }
            Err(e) => {
                self.reject(label, e.to_string());
                false
            }
        }
    }

    /// Re-points the cursor at the new snapshot and notifies listeners.
    fn after_change(&mut self) {
        self.emit(EditorEvent::ScoreChanged);

        let score = Arc::clone(self.score());
        let mut selection = self.selection.clone();
        selection.selected_notes = selection
            .selected_notes
            .iter()
            .filter_map(|n| relocate(&score, n))
            .collect();
        if let Some(primary) = selection.primary().and_then(|p| relocate(&score, &p)) {
            selection.staff_index = primary.staff_index;
            selection.measure_index = Some(primary.measure_index);
        }
        selection.anchor = selection.anchor.as_ref().and_then(|a| relocate(&score, a));
        selection.retain_valid(&score);
        self.set_selection(selection);

        let stale = self.preview.as_ref().is_some_and(|p| {
            p.staff_index >= score.staves.len() || p.measure_index > score.measure_count()
        });
        if stale {
            self.set_preview(None);
        }
        self.emit_history();
    }

    /// The primary note and its event's index, if it still resolves.
    fn primary_location(&self) -> Option<(SelectedNote, usize)> {
        let primary = self.selection.primary()?;
        let index = self
            .score()
            .measure(primary.staff_index, primary.measure_index)?
            .event_index(&primary.event_id)?;
        Some((primary, index))
    }

    fn set_selection(&mut self, selection: Selection) -> bool {
        if selection == self.selection {
            return false;
        }
        self.selection = selection;
        self.emit(EditorEvent::SelectionChanged);
        true
    }

    fn set_preview(&mut self, preview: Option<PreviewNote>) -> bool {
        if preview == self.preview {
            return false;
        }
        self.preview = preview;
        self.emit(EditorEvent::PreviewChanged);
        true
    }

    fn reject(&self, label: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::debug!("{} rejected: {}", label, reason);
        self.emit(EditorEvent::CommandRejected {
            label: label.to_string(),
            reason,
        });
    }

    fn emit_history(&self) {
        self.emit(EditorEvent::HistoryChanged {
            can_undo: self.engine.can_undo(),
            can_redo: self.engine.can_redo(),
        });
    }

    fn emit(&self, event: EditorEvent) {
        self.event_bus.emit(event);
    }
}

fn staff_key(score: &Score, staff_index: usize) -> &str {
    score
        .staff(staff_index)
        .map_or(score.key_signature.as_str(), |s| s.key_signature.as_str())
}

/// Follows a note whose event moved to another measure.
fn relocate(score: &Score, note: &SelectedNote) -> Option<SelectedNote> {
    if note.resolves(score) {
        return Some(note.clone());
    }
    let location = score.locate_event(&note.event_id)?;
    let moved = SelectedNote::new(
        location.staff_index,
        location.measure_index,
        note.event_id.clone(),
        note.note_id.clone(),
    );
    moved.resolves(score).then_some(moved)
}

/// (measure, quant) ordering with quant tolerance.
fn before(a: (usize, f64), b: (usize, f64)) -> bool {
    a.0 < b.0 || (a.0 == b.0 && a.1 < b.1 - QUANT_EPSILON)
}

/// Every note whose event starts between the two addresses, on the
/// staves they span.
fn notes_between(score: &Score, a: &SelectedNote, b: &SelectedNote) -> Vec<SelectedNote> {
    let position = |n: &SelectedNote| {
        let measure = score.measure(n.staff_index, n.measure_index)?;
        let index = measure.event_index(&n.event_id)?;
        Some((n.measure_index, quant_at_index(measure, index)))
    };
    let (Some(pa), Some(pb)) = (position(a), position(b)) else {
        return Vec::new();
    };
    let (start, end) = if before(pb, pa) { (pb, pa) } else { (pa, pb) };

    let mut notes = Vec::new();
    for staff_index in a.staff_index.min(b.staff_index)..=a.staff_index.max(b.staff_index) {
        for measure_index in start.0..=end.0 {
            let Some(measure) = score.measure(staff_index, measure_index) else {
                continue;
            };
            for (event, offset) in measure.events.iter().zip(event_offsets(measure)) {
                let at = (measure_index, offset);
                if before(at, start) || before(end, at) {
                    continue;
                }
                notes.extend(event.notes.iter().map(|note| {
                    SelectedNote::new(staff_index, measure_index, event.id.clone(), note.id.clone())
                }));
            }
        }
    }
    notes
}

/// True if applying `update` to `events` keeps every touched measure
/// within capacity, or at least no fuller than it was.
fn update_fits(score: &Score, events: &[EventSnapshot], update: &EventUpdate) -> bool {
    let ids: HashSet<&EventId> = events.iter().map(|s| &s.event.id).collect();
    let measures: HashSet<(usize, usize)> = events
        .iter()
        .map(|s| (s.staff_index, s.measure_index))
        .collect();
    let capacity = f64::from(score.quants_per_measure()) + QUANT_EPSILON;

    measures.into_iter().all(|(s, m)| {
        score.measure(s, m).is_none_or(|measure| {
            let before_total = measure.total_quants();
            let after_total: f64 = measure
                .events
                .iter()
                .map(|event| {
                    if ids.contains(&event.id) {
                        let mut updated = event.clone();
                        update.apply(&mut updated);
                        event_quants(&updated)
                    } else {
                        event_quants(event)
                    }
                })
                .sum();
            after_total <= capacity || after_total <= before_total + QUANT_EPSILON
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_score::ScoreBuilder;

    /// m0: C4 D4 E4 F4 quarters (full); m1: G4 quarter.
    fn melody() -> Score {
        ScoreBuilder::new()
            .staff(Clef::Treble, |s| {
                s.measure(|m| {
                    m.note(Duration::Quarter, "C4")
                        .note(Duration::Quarter, "D4")
                        .note(Duration::Quarter, "E4")
                        .note(Duration::Quarter, "F4");
                })
                .measure(|m| {
                    m.note(Duration::Quarter, "G4");
                });
            })
            .build()
            .unwrap()
    }

    fn editor(score: Score) -> ScoreEditor {
        ScoreEditor::open(score, Config::default()).unwrap()
    }

    fn select(editor: &mut ScoreEditor, staff: usize, measure: usize, index: usize) {
        let id = editor.score().staves[staff].measures[measure].events[index].id.clone();
        assert!(editor.select_event(staff, measure, &id));
    }

    fn pitches(editor: &ScoreEditor, measure: usize) -> Vec<String> {
        editor.score().staves[0].measures[measure]
            .events
            .iter()
            .map(|e| e.notes[0].pitch.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_new_editor_uses_config() {
        let mut config = Config::default();
        config.score.measures = 2;
        config.editor.default_duration = Duration::Eighth;
        let editor = ScoreEditor::new(config);

        assert_eq!(editor.score().measure_count(), 2);
        assert_eq!(editor.input().duration, Duration::Eighth);
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_open_rejects_invalid_score() {
        let mut score = melody();
        score.staves.clear();
        assert!(matches!(
            ScoreEditor::open(score, Config::default()),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn test_insert_at_ghost_after_navigation() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);

        assert!(editor.move_cursor(Direction::Right));
        let ghost = editor.preview().unwrap().clone();
        assert_eq!((ghost.measure_index, ghost.index), (1, 1));

        assert!(editor.insert_note("A4"));
        assert_eq!(pitches(&editor, 1), vec!["G4", "A4"]);
        assert!(editor.preview().is_none());
        let primary = editor.selection().primary().unwrap();
        assert_eq!(primary.event_id, editor.score().staves[0].measures[1].events[1].id);
    }

    #[test]
    fn test_insert_after_selected_event() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.insert_note("B4"));
        assert_eq!(pitches(&editor, 1), vec!["G4", "B4"]);
    }

    #[test]
    fn test_insert_into_full_measure_is_rejected() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 1);
        let mut events = editor.subscribe();

        assert!(!editor.insert_note("A4"));
        assert_eq!(pitches(&editor, 0).len(), 4);
        assert!(events.drain().iter().any(|e| matches!(
            e,
            EditorEvent::CommandRejected { reason, .. } if reason == "measure is full"
        )));
    }

    #[test]
    fn test_insert_rejects_bad_pitch() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(!editor.insert_note("H9"));
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_ghost_past_end_creates_measure_in_one_step() {
        let score = ScoreBuilder::new()
            .staff(Clef::Treble, |s| {
                s.measure(|m| {
                    m.note(Duration::Half, "C4").note(Duration::Half, "E4");
                });
            })
            .build()
            .unwrap();
        let mut editor = editor(score);
        select(&mut editor, 0, 0, 1);
        let mut events = editor.subscribe();

        assert!(editor.move_cursor(Direction::Right));
        assert!(events.drain().contains(&EditorEvent::MeasureRequested {
            staff_index: 0,
            measure_index: 1,
        }));
        assert_eq!(editor.score().measure_count(), 1);

        assert!(editor.insert_note("C5"));
        assert_eq!(editor.score().measure_count(), 2);
        assert_eq!(pitches(&editor, 1), vec!["C5"]);
        assert_eq!(editor.engine().history_labels(), vec!["Insert Note"]);

        assert!(editor.undo());
        assert_eq!(editor.score().measure_count(), 1);
        assert!(editor.selection().primary().is_none());
    }

    #[test]
    fn test_rest_mode_inserts_rests() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.move_cursor(Direction::Right));
        assert!(editor.toggle_rest());
        assert!(editor.input().rest_mode);
        assert!(editor.preview().unwrap().is_rest);

        assert!(editor.insert_note(""));
        assert!(editor.score().staves[0].measures[1].events[1].is_rest);
    }

    #[test]
    fn test_transposing_ghost_is_not_recorded() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.move_cursor(Direction::Right));
        assert_eq!(editor.preview().unwrap().pitch, "G4");

        assert!(editor.transpose(2));
        assert_eq!(editor.preview().unwrap().pitch, "A4");
        assert!(editor.transpose_diatonic(1));
        assert_eq!(editor.preview().unwrap().pitch, "B4");
        assert!(!editor.can_undo());
    }

    #[test]
    fn test_transpose_selection() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        assert!(editor.transpose(12));
        assert_eq!(pitches(&editor, 0)[0], "C5");
        assert!(editor.undo());
        assert_eq!(pitches(&editor, 0)[0], "C4");
        assert!(editor.redo());
        assert_eq!(pitches(&editor, 0)[0], "C5");
    }

    #[test]
    fn test_delete_falls_back_to_previous_event() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 2);
        assert!(editor.delete_selection());

        assert_eq!(pitches(&editor, 0), vec!["C4", "D4", "F4"]);
        let primary = editor.selection().primary().unwrap();
        assert_eq!(primary.event_id, editor.score().staves[0].measures[0].events[1].id);

        assert!(editor.undo());
        assert_eq!(pitches(&editor, 0).len(), 4);
    }

    #[test]
    fn test_set_duration_respects_capacity() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        assert!(!editor.set_duration(Duration::Half));
        assert_eq!(editor.score().staves[0].measures[0].events[0].duration, Duration::Quarter);
        assert_eq!(editor.input().duration, Duration::Half);

        select(&mut editor, 0, 1, 0);
        assert!(editor.set_duration(Duration::Whole));
        assert_eq!(editor.score().staves[0].measures[1].events[0].duration, Duration::Whole);
    }

    #[test]
    fn test_toggle_dot_follows_selected_event() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.toggle_dot());
        assert!(editor.score().staves[0].measures[1].events[0].dotted);
        assert!(editor.input().dotted);
        assert!(editor.toggle_dot());
        assert!(!editor.score().staves[0].measures[1].events[0].dotted);
    }

    #[test]
    fn test_add_to_chord_then_undo_keeps_selection_valid() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.add_to_chord("B4"));
        assert_eq!(editor.score().staves[0].measures[1].events[0].notes.len(), 2);
        assert!(editor.selection().primary().unwrap().resolves(editor.score()));

        assert!(editor.undo());
        let score = Arc::clone(editor.score());
        assert!(editor.selection().targets().iter().all(|n| n.resolves(&score)));
    }

    #[test]
    fn test_extend_selection_range() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 1);
        let focus = {
            let event = &editor.score().staves[0].measures[1].events[0];
            SelectedNote::new(0, 1, event.id.clone(), event.notes[0].id.clone())
        };
        assert!(editor.extend_selection(focus.clone()));

        let selection = editor.selection();
        assert_eq!(selection.selected_notes.len(), 4);
        assert_eq!(selection.primary(), Some(focus));
        assert_eq!(
            selection.anchor.as_ref().map(|a| a.measure_index),
            Some(0)
        );
    }

    #[test]
    fn test_extend_cursor_grows_selection() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        assert!(editor.extend_cursor(Direction::Right));
        assert!(editor.extend_cursor(Direction::Right));
        assert_eq!(editor.selection().selected_notes.len(), 3);
    }

    #[test]
    fn test_select_all_and_clear() {
        let mut editor = editor(melody());
        assert!(editor.select_all());
        assert_eq!(editor.selection().selected_notes.len(), 5);
        assert!(editor.clear_selection());
        assert!(editor.selection().is_empty());
        assert!(!editor.clear_selection());
    }

    #[test]
    fn test_time_signature_change_follows_selection() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.set_time_signature(TimeSignature::new(2, 4).unwrap()));

        assert_eq!(editor.score().measure_count(), 3);
        assert_eq!(editor.selection().primary().unwrap().measure_index, 2);
    }

    #[test]
    fn test_grand_staff_navigation_and_single_staff() {
        let mut editor = editor(melody());
        assert!(editor.set_grand_staff());
        assert_eq!(editor.score().staves.len(), 2);

        select(&mut editor, 0, 0, 0);
        assert!(editor.move_cursor(Direction::Down));
        assert_eq!(editor.preview().unwrap().staff_index, 1);

        assert!(editor.set_single_staff());
        assert_eq!(editor.score().staves.len(), 1);
        assert!(editor.preview().is_none());
    }

    #[test]
    fn test_tuplet_round_trip() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        assert!(editor.apply_tuplet(TupletRatio::TRIPLET, 3));
        assert!(editor.score().staves[0].measures[0].events[2].tuplet.is_some());

        assert!(editor.remove_tuplet());
        assert!(editor.score().staves[0].measures[0].events.iter().all(|e| e.tuplet.is_none()));
    }

    #[test]
    fn test_key_signature_and_measures() {
        let mut editor = editor(melody());
        assert!(editor.set_key_signature("G"));
        assert!(!editor.set_key_signature("Q#"));
        assert!(editor.add_measure(None));
        assert_eq!(editor.score().measure_count(), 3);
        assert!(editor.delete_measure(2));
        assert_eq!(editor.score().measure_count(), 2);
    }

    #[test]
    fn test_load_score_resets_cursor() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 1, 0);
        assert!(editor.load_score(Config::default().score.new_score(&[Clef::Bass])));

        assert!(editor.selection().is_empty());
        assert_eq!(editor.score().staves[0].clef, Clef::Bass);
        assert!(editor.undo());
        assert_eq!(editor.score().staves[0].clef, Clef::Treble);
    }

    #[test]
    fn test_edit_emits_score_and_history_events() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        let mut events = editor.subscribe();

        assert!(editor.transpose(1));
        let seen = events.drain();
        assert!(seen.contains(&EditorEvent::ScoreChanged));
        assert!(seen.contains(&EditorEvent::HistoryChanged {
            can_undo: true,
            can_redo: false,
        }));
    }

    #[test]
    fn test_blocked_navigation_is_reported() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        let mut events = editor.subscribe();

        assert!(!editor.move_cursor(Direction::Up));
        assert_eq!(events.drain(), vec![EditorEvent::NavigationBlocked(Direction::Up)]);
    }

    #[test]
    fn test_manual_transaction() {
        let mut editor = editor(melody());
        select(&mut editor, 0, 0, 0);
        editor.begin_transaction();
        assert!(editor.transpose(1));
        assert!(editor.transpose(1));
        assert!(editor.commit_transaction(Some("Up Two")));
        assert_eq!(editor.engine().history_labels(), vec!["Up Two"]);

        editor.begin_transaction();
        assert!(editor.transpose(5));
        assert_eq!(editor.rollback_transaction(), 1);
        assert_eq!(pitches(&editor, 0)[0], "D4");
    }

    #[test]
    fn test_playback_and_export() {
        let editor = editor(melody());
        assert_eq!(editor.playback_timeline().len(), 5);

        let mut tones: Vec<crate::adapter::Tone> = Vec::new();
        assert_eq!(editor.play(&mut tones), 5);

        let json = editor.export(&crate::adapter::JsonExporter::default()).unwrap();
        assert!(json.contains("\"G4\""));
    }
}
