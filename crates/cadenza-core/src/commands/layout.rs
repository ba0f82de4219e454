//! Commands that reshape staves, measures or the whole document.

use std::sync::Arc;

use cadenza_score::mutate::update_score;
use cadenza_score::pitch::parse_key;
use cadenza_score::reflow::{pad_measures, reflow_measures};
use cadenza_score::{Clef, Measure, MeasureId, Score, TimeSignature};

use crate::CoreResult;
use crate::command::{Command, UndoPayload};

/// Splits a one-staff score into a treble and bass pair.
///
/// The existing staff keeps its notes: a bass staff becomes the lower half,
/// anything else becomes the upper half. Executing on a score that does not
/// have exactly one staff returns the input snapshot.
#[derive(Debug, Default)]
pub struct SetGrandStaffCommand {
    payload: Option<UndoPayload>,
}

impl SetGrandStaffCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Command for SetGrandStaffCommand {
    fn label(&self) -> &str {
        "Set Grand Staff"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let [original] = score.staves.as_slice() else {
            return Ok(Arc::clone(score));
        };

        let staves = if original.clef == Clef::Bass {
            vec![original.empty_sibling(Clef::Treble), original.clone()]
        } else {
            vec![original.clone(), original.empty_sibling(Clef::Bass)]
        };
        self.payload = Some(UndoPayload::Staves {
            previous: score.staves.clone(),
        });
        Ok(update_score(score, |s| s.staves = staves))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        Ok(restore_staves(score, self.payload.take()))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Collapses a multi-staff score to one staff.
#[derive(Debug, Default)]
pub struct SetSingleStaffCommand {
    keep: usize,
    payload: Option<UndoPayload>,
}

impl SetSingleStaffCommand {
    /// Keeps the upper staff.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the staff at `index`.
    pub fn keeping(index: usize) -> Self {
        Self {
            keep: index,
            payload: None,
        }
    }
}

impl Command for SetSingleStaffCommand {
    fn label(&self) -> &str {
        "Set Single Staff"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        if score.staves.len() < 2 {
            return Ok(Arc::clone(score));
        }
        let Some(kept) = score.staff(self.keep).cloned() else {
            return Ok(Arc::clone(score));
        };

        self.payload = Some(UndoPayload::Staves {
            previous: score.staves.clone(),
        });
        Ok(update_score(score, |s| s.staves = vec![kept]))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        Ok(restore_staves(score, self.payload.take()))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Changes the meter and reflows every staff into measures of the new size.
#[derive(Debug)]
pub struct SetTimeSignatureCommand {
    time_signature: TimeSignature,
    payload: Option<UndoPayload>,
}

impl SetTimeSignatureCommand {
    pub fn new(time_signature: TimeSignature) -> Self {
        Self {
            time_signature,
            payload: None,
        }
    }
}

impl Command for SetTimeSignatureCommand {
    fn label(&self) -> &str {
        "Set Time Signature"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        if score.time_signature == self.time_signature {
            return Ok(Arc::clone(score));
        }

        let mut reflowed: Vec<Vec<Measure>> = score
            .staves
            .iter()
            .map(|staff| reflow_measures(&staff.measures, self.time_signature))
            .collect();
        let count = reflowed.iter().map(Vec::len).max().unwrap_or(1);
        for measures in &mut reflowed {
            pad_measures(measures, count);
        }

        self.payload = Some(UndoPayload::Layout {
            time_signature: score.time_signature,
            staves: score.staves.clone(),
        });
        let time_signature = self.time_signature;
        Ok(update_score(score, |s| {
            s.time_signature = time_signature;
            for (staff, measures) in s.staves.iter_mut().zip(reflowed) {
                staff.measures = measures;
            }
        }))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let Some(UndoPayload::Layout {
            time_signature,
            staves,
        }) = self.payload.take()
        else {
            return Ok(Arc::clone(score));
        };
        Ok(update_score(score, |s| {
            s.time_signature = time_signature;
            s.staves = staves;
        }))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Sets the score key and the key of every staff.
#[derive(Debug)]
pub struct SetKeySignatureCommand {
    key: String,
    payload: Option<UndoPayload>,
}

impl SetKeySignatureCommand {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: None,
        }
    }
}

impl Command for SetKeySignatureCommand {
    fn label(&self) -> &str {
        "Set Key Signature"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        parse_key(&self.key)?;
        let unchanged = score.key_signature == self.key
            && score.staves.iter().all(|s| s.key_signature == self.key);
        if unchanged {
            return Ok(Arc::clone(score));
        }

        self.payload = Some(UndoPayload::KeySignature {
            score_key: score.key_signature.clone(),
            staff_keys: score
                .staves
                .iter()
                .map(|s| s.key_signature.clone())
                .collect(),
        });
        let key = self.key.clone();
        Ok(update_score(score, |s| {
            for staff in &mut s.staves {
                staff.key_signature = key.clone();
            }
            s.key_signature = key;
        }))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let Some(UndoPayload::KeySignature {
            score_key,
            staff_keys,
        }) = self.payload.take()
        else {
            return Ok(Arc::clone(score));
        };
        Ok(update_score(score, |s| {
            s.key_signature = score_key;
            for (staff, key) in s.staves.iter_mut().zip(staff_keys) {
                staff.key_signature = key;
            }
        }))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Inserts an empty measure on every staff, appending by default.
#[derive(Debug, Default)]
pub struct AddMeasureCommand {
    index: Option<usize>,
    ids: Vec<MeasureId>,
    payload: Option<UndoPayload>,
}

impl AddMeasureCommand {
    /// Appends after the last measure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts before the measure currently at `index`.
    pub fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }
}

impl Command for AddMeasureCommand {
    fn label(&self) -> &str {
        "Add Measure"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        if score.staves.is_empty() {
            return Ok(Arc::clone(score));
        }
        let count = score.measure_count();
        let index = self.index.unwrap_or(count).min(count);
        // Redo reuses the IDs handed out by the first execution.
        if self.ids.len() != score.staves.len() {
            self.ids = score.staves.iter().map(|_| MeasureId::new()).collect();
        }

        self.payload = Some(UndoPayload::InsertedMeasure { index });
        let ids = self.ids.clone();
        Ok(update_score(score, |s| {
            for (staff, id) in s.staves.iter_mut().zip(ids) {
                let at = index.min(staff.measures.len());
                staff.measures.insert(
                    at,
                    Measure {
                        id,
                        ..Measure::new()
                    },
                );
            }
        }))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let Some(UndoPayload::InsertedMeasure { index }) = self.payload.take() else {
            return Ok(Arc::clone(score));
        };
        Ok(update_score(score, |s| {
            for staff in &mut s.staves {
                if index < staff.measures.len() {
                    staff.measures.remove(index);
                }
            }
        }))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Removes one measure from every staff. The last remaining measure is
/// never removed.
#[derive(Debug)]
pub struct DeleteMeasureCommand {
    index: usize,
    payload: Option<UndoPayload>,
}

impl DeleteMeasureCommand {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            payload: None,
        }
    }
}

impl Command for DeleteMeasureCommand {
    fn label(&self) -> &str {
        "Delete Measure"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let count = score.measure_count();
        if count <= 1 || self.index >= count {
            return Ok(Arc::clone(score));
        }

        let index = self.index;
        self.payload = Some(UndoPayload::RemovedMeasures {
            index,
            measures: score
                .staves
                .iter()
                .filter_map(|s| s.measures.get(index).cloned())
                .collect(),
        });
        Ok(update_score(score, |s| {
            for staff in &mut s.staves {
                if index < staff.measures.len() {
                    staff.measures.remove(index);
                }
            }
        }))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        let Some(UndoPayload::RemovedMeasures { index, measures }) = self.payload.take() else {
            return Ok(Arc::clone(score));
        };
        Ok(update_score(score, |s| {
            for (staff, measure) in s.staves.iter_mut().zip(measures) {
                let at = index.min(staff.measures.len());
                staff.measures.insert(at, measure);
            }
        }))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Replaces the whole document.
#[derive(Debug)]
pub struct LoadScoreCommand {
    score: Arc<Score>,
    payload: Option<UndoPayload>,
}

impl LoadScoreCommand {
    pub fn new(score: impl Into<Arc<Score>>) -> Self {
        Self {
            score: score.into(),
            payload: None,
        }
    }
}

impl Command for LoadScoreCommand {
    fn label(&self) -> &str {
        "Load Score"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        if Arc::ptr_eq(score, &self.score) {
            return Ok(Arc::clone(score));
        }
        self.payload = Some(UndoPayload::Document {
            previous: Box::new(Score::clone(score)),
        });
        Ok(Arc::clone(&self.score))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        match self.payload.take() {
            Some(UndoPayload::Document { previous }) => Ok(Arc::new(*previous)),
            _ => Ok(Arc::clone(score)),
        }
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

fn restore_staves(score: &Arc<Score>, payload: Option<UndoPayload>) -> Arc<Score> {
    match payload {
        Some(UndoPayload::Staves { previous }) => update_score(score, |s| s.staves = previous),
        _ => Arc::clone(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use crate::commands::fixtures::{grand, melody};
    use cadenza_score::{Duration, ScoreBuilder};

    #[test]
    fn test_grand_staff_is_idempotent() {
        let score = melody();
        let mut command = SetGrandStaffCommand::new();

        let grand = command.execute(&score).unwrap();
        assert_eq!(grand.staves.len(), 2);
        assert_eq!(grand.staves[0], score.staves[0]);
        assert_eq!(grand.staves[1].clef, Clef::Bass);
        assert_eq!(grand.staves[1].measures.len(), 2);
        assert!(grand.staves[1].measures.iter().all(Measure::is_empty));

        let mut again = SetGrandStaffCommand::new();
        let same = again.execute(&grand).unwrap();
        assert!(Arc::ptr_eq(&grand, &same));
        assert!(Arc::ptr_eq(&same, &again.undo(&same).unwrap()));

        assert_eq!(*command.undo(&grand).unwrap(), *score);
    }

    #[test]
    fn test_grand_staff_from_bass_keeps_content_below() {
        let score = Arc::new(
            ScoreBuilder::new()
                .staff(Clef::Bass, |s| {
                    s.pickup(|m| {
                        m.note(Duration::Quarter, "G2");
                    });
                })
                .build()
                .unwrap(),
        );
        let next = SetGrandStaffCommand::new().execute(&score).unwrap();
        assert_eq!(next.staves[0].clef, Clef::Treble);
        assert!(next.staves[0].measures[0].is_pickup);
        assert_eq!(next.staves[1], score.staves[0]);
    }

    #[test]
    fn test_single_staff_round_trip() {
        let score = grand();
        let mut command = SetSingleStaffCommand::keeping(1);
        let next = command.execute(&score).unwrap();
        assert_eq!(next.staves.len(), 1);
        assert_eq!(next.staves[0].clef, Clef::Bass);
        assert_eq!(*command.undo(&next).unwrap(), *score);

        let single = melody();
        assert!(Arc::ptr_eq(
            &single,
            &SetSingleStaffCommand::new().execute(&single).unwrap()
        ));
    }

    #[test]
    fn test_time_signature_reflows_every_staff() {
        let score = grand();
        let three_four: TimeSignature = "3/4".parse().unwrap();
        let mut command = SetTimeSignatureCommand::new(three_four);

        let next = command.execute(&score).unwrap();
        assert_eq!(next.time_signature, three_four);
        assert!(next.validate().is_ok());
        // Four quarters split 3 + 1; two halves cannot share a 3/4 bar.
        assert_eq!(next.staves[0].measures[0].events.len(), 3);
        assert_eq!(next.staves[1].measures[0].events.len(), 1);
        assert_eq!(next.staves[0].measures.len(), next.staves[1].measures.len());

        assert_eq!(*command.undo(&next).unwrap(), *score);
    }

    #[test]
    fn test_same_time_signature_is_noop() {
        let score = melody();
        let mut command = SetTimeSignatureCommand::new(TimeSignature::COMMON);
        assert!(Arc::ptr_eq(&score, &command.execute(&score).unwrap()));
    }

    #[test]
    fn test_key_signature_updates_staves() {
        let score = grand();
        let mut command = SetKeySignatureCommand::new("Eb");
        let next = command.execute(&score).unwrap();
        assert_eq!(next.key_signature, "Eb");
        assert!(next.staves.iter().all(|s| s.key_signature == "Eb"));
        assert_eq!(*command.undo(&next).unwrap(), *score);

        let mut bad = SetKeySignatureCommand::new("H");
        assert!(matches!(bad.execute(&score), Err(CoreError::Score(_))));
    }

    #[test]
    fn test_add_measure_undo_restores_trailing_id() {
        let score = grand();
        let trailing = score.staves[0].measures.last().unwrap().id.clone();
        let mut command = AddMeasureCommand::new();

        let next = command.execute(&score).unwrap();
        assert_eq!(next.measure_count(), 3);
        assert!(next.validate().is_ok());

        let back = command.undo(&next).unwrap();
        assert_eq!(back.measure_count(), 2);
        assert_eq!(back.staves[0].measures.last().unwrap().id, trailing);
        assert_eq!(*back, *score);
    }

    #[test]
    fn test_add_measure_redo_reuses_ids() {
        let score = melody();
        let mut command = AddMeasureCommand::at(0);
        let first = command.execute(&score).unwrap();
        let back = command.undo(&first).unwrap();
        let second = command.execute(&back).unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_delete_measure() {
        let score = grand();
        let mut command = DeleteMeasureCommand::new(0);
        let next = command.execute(&score).unwrap();
        assert_eq!(next.measure_count(), 1);
        assert!(next.staves.iter().all(|s| s.measures[0].is_empty()));
        assert_eq!(*command.undo(&next).unwrap(), *score);

        let mut last = DeleteMeasureCommand::new(0);
        assert!(Arc::ptr_eq(&next, &last.execute(&next).unwrap()));
    }

    #[test]
    fn test_load_score_round_trip() {
        let score = melody();
        let replacement = Score::default();
        let mut command = LoadScoreCommand::new(replacement.clone());
        let next = command.execute(&score).unwrap();
        assert_eq!(*next, replacement);
        assert_eq!(*command.undo(&next).unwrap(), *score);
    }
}
