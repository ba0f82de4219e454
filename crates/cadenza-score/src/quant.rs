//! Quantized time arithmetic.
//!
//! ## Resolution
//!
//! A whole note is 64 quants, so a sixty-fourth is the smallest integral
//! unit. Dots multiply by 1.5 and an N:M tuplet multiplies by M/N; the two
//! compose, which is why quant values are `f64` and comparisons go through
//! [`QUANT_EPSILON`].

use crate::model::{Duration, Measure, ScoreEvent, TupletRatio};

/// Quants in one whole note.
pub const QUANTS_PER_WHOLE: u32 = 64;

/// Tolerance for comparing fractional tuplet quants.
pub const QUANT_EPSILON: f64 = 1e-6;

/// One piece of a greedy decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantPart {
    pub duration: Duration,
    pub dotted: bool,
    pub quants: u32,
}

/// Candidate values for decomposition, largest first. A dotted value sits
/// ahead of the plain value it extends so an exact dotted match wins over
/// two plain notes.
const DECOMPOSITION_TABLE: [QuantPart; 12] = [
    part(Duration::Whole, false, 64),
    part(Duration::Half, true, 48),
    part(Duration::Half, false, 32),
    part(Duration::Quarter, true, 24),
    part(Duration::Quarter, false, 16),
    part(Duration::Eighth, true, 12),
    part(Duration::Eighth, false, 8),
    part(Duration::Sixteenth, true, 6),
    part(Duration::Sixteenth, false, 4),
    part(Duration::ThirtySecond, true, 3),
    part(Duration::ThirtySecond, false, 2),
    part(Duration::SixtyFourth, false, 1),
];

const fn part(duration: Duration, dotted: bool, quants: u32) -> QuantPart {
    QuantPart {
        duration,
        dotted,
        quants,
    }
}

/// Length of a written duration in quants.
pub fn duration_to_quants(duration: Duration, dotted: bool, tuplet: Option<TupletRatio>) -> f64 {
    let mut quants = f64::from(duration.base_quants());
    if dotted {
        quants *= 1.5;
    }
    if let Some(ratio) = tuplet {
        if ratio.numerator > 0 {
            quants *= ratio.scale();
        }
    }
    quants
}

/// Length of an event, honouring its tuplet membership.
pub fn event_quants(event: &ScoreEvent) -> f64 {
    duration_to_quants(
        event.duration,
        event.dotted,
        event.tuplet.as_ref().map(|t| t.ratio),
    )
}

/// Sum of event lengths. Tuplet groups may leave a tiny floating error, so
/// compare the result with [`approx_eq`].
pub fn total_quants(events: &[ScoreEvent]) -> f64 {
    events.iter().map(event_quants).sum()
}

/// Float comparison at quant tolerance.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < QUANT_EPSILON
}

/// Splits `quants` into standard durations, largest first.
///
/// `decompose_quants(24)` is a single dotted quarter rather than a quarter
/// plus an eighth; `decompose_quants(0)` is empty.
pub fn decompose_quants(quants: u32) -> Vec<QuantPart> {
    let mut parts = Vec::new();
    let mut remaining = quants;
    for candidate in DECOMPOSITION_TABLE {
        while remaining >= candidate.quants {
            parts.push(candidate);
            remaining -= candidate.quants;
        }
    }
    parts
}

/// True if an event of the given length still fits in the measure.
pub fn can_add_event_to_measure(
    events: &[ScoreEvent],
    duration: Duration,
    dotted: bool,
    tuplet: Option<TupletRatio>,
    quants_per_measure: u32,
) -> bool {
    total_quants(events) + duration_to_quants(duration, dotted, tuplet)
        <= f64::from(quants_per_measure) + QUANT_EPSILON
}

/// Unused capacity left in a measure, never negative.
pub fn remaining_quants(measure: &Measure, quants_per_measure: u32) -> f64 {
    let remaining = f64::from(quants_per_measure) - measure.total_quants();
    if remaining > QUANT_EPSILON { remaining } else { 0.0 }
}

/// Start offset of every event in the measure.
pub fn event_offsets(measure: &Measure) -> Vec<f64> {
    let mut offset = 0.0;
    measure
        .events
        .iter()
        .map(|event| {
            let start = offset;
            offset += event_quants(event);
            start
        })
        .collect()
}

/// Start offset of the event at `index`.
pub fn quant_at_index(measure: &Measure, index: usize) -> f64 {
    total_quants(&measure.events[..index.min(measure.events.len())])
}

/// The event whose `[start, start + length)` interval contains `quant`,
/// with its index. `None` past the end of the written content.
pub fn event_at_quant(measure: &Measure, quant: f64) -> Option<(usize, &ScoreEvent)> {
    let mut start = 0.0;
    for (index, event) in measure.events.iter().enumerate() {
        let end = start + event_quants(event);
        if quant + QUANT_EPSILON >= start && quant < end - QUANT_EPSILON {
            return Some((index, event));
        }
        start = end;
    }
    None
}
