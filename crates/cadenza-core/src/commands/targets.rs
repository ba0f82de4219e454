//! Commands that act on every note of a multi-selection.

use std::collections::HashSet;
use std::sync::Arc;

use cadenza_score::{DefaultPitches, Pitch, Score, SelectedNote};

use super::{restore_events, target_events};
use crate::CoreResult;
use crate::command::{Command, UndoPayload};

/// Toggles the targeted events between notes and rests.
///
/// The toggle is decided for the whole set: only when every targeted event
/// is already a rest do they all become notes (each at the default pitch of
/// its staff's clef). Otherwise every targeted note event becomes a rest.
#[derive(Debug)]
pub struct ToggleRestCommand {
    targets: Vec<SelectedNote>,
    default_pitches: DefaultPitches,
    payload: Option<UndoPayload>,
}

impl ToggleRestCommand {
    pub fn new(targets: Vec<SelectedNote>, default_pitches: DefaultPitches) -> Self {
        Self {
            targets,
            default_pitches,
            payload: None,
        }
    }
}

impl Command for ToggleRestCommand {
    fn label(&self) -> &str {
        "Toggle Rest"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let events = target_events(score, &self.targets);
        if events.is_empty() {
            return Ok(Arc::clone(score));
        }
        let all_rests = events.iter().all(|snapshot| snapshot.event.is_rest);
        let changed: Vec<_> = events
            .into_iter()
            .filter(|snapshot| all_rests || !snapshot.event.is_rest)
            .collect();

        let mut next = Score::clone(score);
        for snapshot in &changed {
            let staff = &mut next.staves[snapshot.staff_index];
            let pitch = self.default_pitches.for_clef(staff.clef).to_string();
            let slot = staff.measures[snapshot.measure_index]
                .events
                .iter_mut()
                .find(|e| e.id == snapshot.event.id);
            if let Some(event) = slot {
                if all_rests {
                    event.make_pitched(pitch);
                } else {
                    event.make_rest();
                }
            }
        }

        self.payload = Some(UndoPayload::ReplacedEvents { previous: changed });
        Ok(Arc::new(next))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::ReplacedEvents { previous }) => Ok(restore_events(score, &previous)),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Moves the targeted notes by a number of semitones, spelled for each
/// staff's key.
#[derive(Debug)]
pub struct ChromaticTransposeCommand {
    targets: Vec<SelectedNote>,
    semitones: i32,
    payload: Option<UndoPayload>,
}

impl ChromaticTransposeCommand {
    pub fn new(targets: Vec<SelectedNote>, semitones: i32) -> Self {
        Self {
            targets,
            semitones,
            payload: None,
        }
    }
}

impl Command for ChromaticTransposeCommand {
    fn label(&self) -> &str {
        "Transpose"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        if self.semitones == 0 {
            return Ok(Arc::clone(score));
        }
        let semitones = self.semitones;
        let (next, payload) = transpose_targets(score, &self.targets, |pitch, key| {
            pitch.transpose_chromatic(semitones, key)
        });
        self.payload = payload;
        Ok(next)
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::ReplacedEvents { previous }) => Ok(restore_events(score, &previous)),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Moves the targeted notes by a number of staff positions (letter names),
/// taking accidentals from each staff's key.
#[derive(Debug)]
pub struct TransposeSelectionCommand {
    targets: Vec<SelectedNote>,
    steps: i32,
    payload: Option<UndoPayload>,
}

impl TransposeSelectionCommand {
    pub fn new(targets: Vec<SelectedNote>, steps: i32) -> Self {
        Self {
            targets,
            steps,
            payload: None,
        }
    }
}

impl Command for TransposeSelectionCommand {
    fn label(&self) -> &str {
        "Transpose Diatonic"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        if self.steps == 0 {
            return Ok(Arc::clone(score));
        }
        let steps = self.steps;
        let (next, payload) = transpose_targets(score, &self.targets, |pitch, key| {
            pitch.transpose_diatonic(steps, key)
        });
        self.payload = payload;
        Ok(next)
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::ReplacedEvents { previous }) => Ok(restore_events(score, &previous)),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Rewrites every distinct targeted note through `shift`. Rests, stale
/// targets and unparseable pitches are left alone.
fn transpose_targets(
    score: &Arc<Score>,
    targets: &[SelectedNote],
    shift: impl Fn(&Pitch, &str) -> Pitch,
) -> (Arc<Score>, Option<UndoPayload>) {
    let previous = target_events(score, targets);
    if previous.is_empty() {
        return (Arc::clone(score), None);
    }

    let mut next = Score::clone(score);
    let mut changed = false;
    let mut seen = HashSet::new();
    for target in targets.iter().filter(|t| seen.insert(*t)) {
        let Some(staff) = next.staves.get_mut(target.staff_index) else {
            continue;
        };
        let key = staff.key_signature.clone();
        let note = staff
            .measures
            .get_mut(target.measure_index)
            .and_then(|m| m.events.iter_mut().find(|e| e.id == target.event_id))
            .and_then(|e| e.notes.iter_mut().find(|n| n.id == target.note_id));
        let Some(note) = note else {
            continue;
        };
        let Some(pitch) = note.pitch.as_deref().and_then(|p| p.parse::<Pitch>().ok()) else {
            tracing::debug!("Skipping unpitched note {}", target.note_id);
            continue;
        };

        let moved = shift(&pitch, &key);
        note.pitch = Some(moved.to_string());
        note.accidental = moved.written_accidental(&key);
        changed = true;
    }

    if !changed {
        return (Arc::clone(score), None);
    }
    (
        Arc::new(next),
        Some(UndoPayload::ReplacedEvents { previous }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::{grand, melody, target};
    use cadenza_score::{Accidental, Clef, Duration, ScoreBuilder};

    fn pitches(score: &Score, staff: usize, measure: usize) -> Vec<Option<String>> {
        score.staves[staff].measures[measure]
            .events
            .iter()
            .map(|e| e.notes[0].pitch.clone())
            .collect()
    }

    #[test]
    fn test_mixed_selection_becomes_rests() {
        let score = melody();
        let targets = vec![target(&score, 0, 1, 0), target(&score, 0, 1, 1)];
        let mut command = ToggleRestCommand::new(targets, DefaultPitches::default());

        let next = command.execute(&score).unwrap();
        assert!(next.staves[0].measures[1].events.iter().all(|e| e.is_rest));
        assert!(next.validate().is_ok());
        // Only the note changed, so only it is recorded.
        assert!(matches!(
            command.payload(),
            Some(UndoPayload::ReplacedEvents { previous }) if previous.len() == 1
        ));
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_all_rests_become_notes_at_clef_default() {
        let score = Arc::new(
            ScoreBuilder::new()
                .staff(Clef::Treble, |s| {
                    s.measure(|m| {
                        m.rest(Duration::Half);
                    });
                })
                .staff(Clef::Bass, |s| {
                    s.measure(|m| {
                        m.rest(Duration::Half);
                    });
                })
                .build()
                .unwrap(),
        );
        let targets = vec![target(&score, 0, 0, 0), target(&score, 1, 0, 0)];
        let mut command = ToggleRestCommand::new(targets, DefaultPitches::default());

        let next = command.execute(&score).unwrap();
        assert_eq!(pitches(&next, 0, 0), vec![Some("B4".to_string())]);
        assert_eq!(pitches(&next, 1, 0), vec![Some("D3".to_string())]);
        // Placeholder IDs survive, so the selection stays valid.
        assert!(target(&score, 0, 0, 0).resolves(&next));
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_toggle_rest_with_stale_targets_is_noop() {
        let score = melody();
        let mut stale = target(&score, 0, 0, 0);
        stale.measure_index = 1;
        let mut command = ToggleRestCommand::new(vec![stale], DefaultPitches::default());
        assert!(Arc::ptr_eq(&score, &command.execute(&score).unwrap()));
    }

    #[test]
    fn test_chromatic_transpose_spells_for_key() {
        let score = melody();
        let targets = vec![target(&score, 0, 0, 0), target(&score, 0, 0, 2)];
        let mut command = ChromaticTransposeCommand::new(targets, 1);

        let next = command.execute(&score).unwrap();
        let measure = &next.staves[0].measures[0];
        assert_eq!(measure.events[0].notes[0].pitch.as_deref(), Some("C#4"));
        assert_eq!(measure.events[0].notes[0].accidental, Some(Accidental::Sharp));
        assert_eq!(measure.events[2].notes[0].pitch.as_deref(), Some("F4"));
        assert_eq!(measure.events[1].notes[0].pitch.as_deref(), Some("D4"));
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_octave_is_twelve_semitones_not_seven_steps() {
        let score = melody();
        let targets = vec![target(&score, 0, 0, 0)];

        let mut chromatic = ChromaticTransposeCommand::new(targets.clone(), 12);
        let up = chromatic.execute(&score).unwrap();
        assert_eq!(pitches(&up, 0, 0)[0].as_deref(), Some("C5"));

        let mut diatonic = TransposeSelectionCommand::new(targets, 12);
        let up = diatonic.execute(&score).unwrap();
        assert_eq!(pitches(&up, 0, 0)[0].as_deref(), Some("A5"));
    }

    #[test]
    fn test_diatonic_transpose_of_chord() {
        let score = grand();
        let chord = &score.staves[1].measures[0].events[0];
        let targets: Vec<_> = chord
            .notes
            .iter()
            .map(|n| SelectedNote::new(1, 0, chord.id.clone(), n.id.clone()))
            .collect();
        let mut command = TransposeSelectionCommand::new(targets, -1);

        let next = command.execute(&score).unwrap();
        let moved: Vec<_> = next.staves[1].measures[0].events[0]
            .notes
            .iter()
            .map(|n| n.pitch.clone().unwrap())
            .collect();
        assert_eq!(moved, vec!["B2", "F3"]);
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_transposing_rests_is_noop() {
        let score = melody();
        let mut command = ChromaticTransposeCommand::new(vec![target(&score, 0, 1, 1)], 2);
        assert!(Arc::ptr_eq(&score, &command.execute(&score).unwrap()));
        assert!(command.payload().is_none());
    }
}
