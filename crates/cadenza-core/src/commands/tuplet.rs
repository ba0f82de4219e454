//! Tuplet grouping.

use std::sync::Arc;

use cadenza_score::mutate::update_measure;
use cadenza_score::{Score, TupletGroupId, TupletInfo, TupletRatio};

use crate::CoreResult;
use crate::command::{Command, UndoPayload};

/// Groups `group_size` consecutive events into one tuplet.
#[derive(Debug)]
pub struct ApplyTupletCommand {
    staff_index: usize,
    measure_index: usize,
    start_index: usize,
    group_size: usize,
    ratio: TupletRatio,
    group_id: TupletGroupId,
    payload: Option<UndoPayload>,
}

impl ApplyTupletCommand {
    pub fn new(
        staff_index: usize,
        measure_index: usize,
        start_index: usize,
        group_size: usize,
        ratio: TupletRatio,
    ) -> Self {
        Self {
            staff_index,
            measure_index,
            start_index,
            group_size,
            ratio,
            group_id: TupletGroupId::new(),
            payload: None,
        }
    }

    pub fn group_id(&self) -> &TupletGroupId {
        &self.group_id
    }
}

impl Command for ApplyTupletCommand {
    fn label(&self) -> &str {
        "Apply Tuplet"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        self.ratio.validate()?;
        let Some(measure) = score.measure(self.staff_index, self.measure_index) else {
            return Ok(Arc::clone(score));
        };
        let end = self.start_index + self.group_size;
        if self.group_size == 0 || end > measure.events.len() {
            return Ok(Arc::clone(score));
        }

        let members = &measure.events[self.start_index..end];
        let previous = members.iter().map(|e| e.tuplet.clone()).collect();
        let base_duration = members[0].duration;
        self.payload = Some(UndoPayload::Tuplets {
            start_index: self.start_index,
            previous,
        });

        let (start, size, ratio) = (self.start_index, self.group_size, self.ratio);
        let group_id = self.group_id.clone();
        Ok(update_measure(
            score,
            self.staff_index,
            self.measure_index,
            |m| {
                for (position, event) in m.events[start..start + size].iter_mut().enumerate() {
                    event.tuplet = Some(TupletInfo {
                        ratio,
                        group_size: size,
                        position,
                        base_duration,
                        group_id: group_id.clone(),
                    });
                }
            },
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        Ok(restore_tuplets(
            score,
            self.staff_index,
            self.measure_index,
            self.payload.take(),
        ))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

/// Dissolves the tuplet group containing the event at `event_index`.
#[derive(Debug)]
pub struct RemoveTupletCommand {
    staff_index: usize,
    measure_index: usize,
    event_index: usize,
    payload: Option<UndoPayload>,
}

impl RemoveTupletCommand {
    pub fn new(staff_index: usize, measure_index: usize, event_index: usize) -> Self {
        Self {
            staff_index,
            measure_index,
            event_index,
            payload: None,
        }
    }
}

impl Command for RemoveTupletCommand {
    fn label(&self) -> &str {
        "Remove Tuplet"
    }

    fn execute(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        self.payload = None;
        let Some(measure) = score.measure(self.staff_index, self.measure_index) else {
            return Ok(Arc::clone(score));
        };
        let Some(tuplet) = measure
            .events
            .get(self.event_index)
            .and_then(|e| e.tuplet.as_ref())
        else {
            return Ok(Arc::clone(score));
        };
        let Some(start) = self.event_index.checked_sub(tuplet.position) else {
            return Ok(Arc::clone(score));
        };
        let end = start + tuplet.group_size;
        if end > measure.events.len() {
            return Ok(Arc::clone(score));
        }

        self.payload = Some(UndoPayload::Tuplets {
            start_index: start,
            previous: measure.events[start..end]
                .iter()
                .map(|e| e.tuplet.clone())
                .collect(),
        });
        Ok(update_measure(
            score,
            self.staff_index,
            self.measure_index,
            |m| {
                for event in &mut m.events[start..end] {
                    event.tuplet = None;
                }
            },
        ))
    }

    fn undo(&mut self, score: &Arc<Score>) -> CoreResult<Arc<Score>> {
        Ok(restore_tuplets(
            score,
            self.staff_index,
            self.measure_index,
            self.payload.take(),
        ))
    }

    fn payload(&self) -> Option<&UndoPayload> {
        self.payload.as_ref()
    }
}

fn restore_tuplets(
    score: &Arc<Score>,
    staff_index: usize,
    measure_index: usize,
    payload: Option<UndoPayload>,
) -> Arc<Score> {
    let Some(UndoPayload::Tuplets {
        start_index,
        previous,
    }) = payload
    else {
        return Arc::clone(score);
    };
    update_measure(score, staff_index, measure_index, |m| {
        for (event, tuplet) in m.events.iter_mut().skip(start_index).zip(previous) {
            event.tuplet = tuplet;
        }
    })
}
