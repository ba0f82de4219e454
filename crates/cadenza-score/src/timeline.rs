//! Playback timeline.
//!
//! Flattens a score into absolutely-timed sounding events for an audio
//! adapter. Nothing here feeds back into the document.

use serde::Serialize;

use crate::model::{EventId, Score};
use crate::pitch::Pitch;
use crate::quant::event_quants;

/// Quants in one quarter-note beat.
pub const QUANTS_PER_BEAT: f64 = 16.0;

/// One sounding event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub staff_index: usize,
    pub measure_index: usize,
    pub event_id: EventId,
    /// Offset from the start of the score
    pub start_quant: f64,
    pub duration_quants: f64,
    pub pitches: Vec<String>,
    pub frequencies: Vec<f64>,
}

impl TimelineEntry {
    pub fn start_seconds(&self, bpm: u32) -> f64 {
        quants_to_seconds(self.start_quant, bpm)
    }

    pub fn duration_seconds(&self, bpm: u32) -> f64 {
        quants_to_seconds(self.duration_quants, bpm)
    }
}

/// Converts quants to seconds at `bpm` quarter notes per minute.
pub fn quants_to_seconds(quants: f64, bpm: u32) -> f64 {
    if bpm == 0 {
        return 0.0;
    }
    quants / QUANTS_PER_BEAT * 60.0 / f64::from(bpm)
}

/// Absolute start of every measure. A pickup bar lasts as long as its
/// longest staff; every other bar lasts a full measure.
pub fn measure_starts(score: &Score) -> Vec<f64> {
    let full = f64::from(score.quants_per_measure());
    let mut starts = Vec::with_capacity(score.measure_count());
    let mut offset = 0.0;
    for measure_index in 0..score.measure_count() {
        starts.push(offset);
        let is_pickup = score
            .measure(0, measure_index)
            .is_some_and(|m| m.is_pickup);
        offset += if is_pickup {
            score
                .staves
                .iter()
                .filter_map(|s| s.measures.get(measure_index))
                .map(|m| m.total_quants())
                .fold(0.0, f64::max)
        } else {
            full
        };
    }
    starts
}

/// Builds the sounding events of every staff, ordered by start time and
/// then by staff. Rests are skipped and unparseable pitches get no
/// frequency.
pub fn build_timeline(score: &Score) -> Vec<TimelineEntry> {
    let starts = measure_starts(score);
    let mut entries = Vec::new();
    for (staff_index, staff) in score.staves.iter().enumerate() {
        for (measure_index, measure) in staff.measures.iter().enumerate() {
            let mut offset = starts.get(measure_index).copied().unwrap_or(0.0);
            for event in &measure.events {
                let length = event_quants(event);
                if !event.is_rest {
                    let pitches: Vec<String> =
                        event.notes.iter().filter_map(|n| n.pitch.clone()).collect();
                    let frequencies = pitches
                        .iter()
                        .filter_map(|p| p.parse::<Pitch>().ok())
                        .map(|p| p.frequency())
                        .collect();
                    entries.push(TimelineEntry {
                        staff_index,
                        measure_index,
                        event_id: event.id.clone(),
                        start_quant: offset,
                        duration_quants: length,
                        pitches,
                        frequencies,
                    });
                }
                offset += length;
            }
        }
    }
    entries.sort_by(|a, b| {
        a.start_quant
            .total_cmp(&b.start_quant)
            .then(a.staff_index.cmp(&b.staff_index))
    });
    entries
}
