//! Measure reflow.
//!
//! Re-packs the events of a staff into measures of a new size. Events are
//! never split: an event that does not fit in the current bar opens the
//! next one, and an event longer than a whole bar gets a bar of its own.

use crate::model::{Measure, MeasureId, TimeSignature};
use crate::quant::{QUANT_EPSILON, event_quants};

/// Flattens `measures` and re-buckets their events under `time_signature`.
///
/// Existing measure IDs are reused positionally so selections that point at
/// early bars stay meaningful; extra bars get fresh IDs. The first output
/// bar inherits the pickup flag of the first input bar. An empty input (or
/// one with no events) yields a single empty measure.
pub fn reflow_measures(measures: &[Measure], time_signature: TimeSignature) -> Vec<Measure> {
    let capacity = f64::from(time_signature.quants_per_measure());
    let is_pickup = measures.first().is_some_and(|m| m.is_pickup);
    let mut ids = measures.iter().map(|m| m.id.clone());
    let mut next_measure = || Measure {
        id: ids.next().unwrap_or_else(MeasureId::new),
        ..Measure::new()
    };

    let mut output = vec![next_measure()];
    let mut filled = 0.0;
    for event in measures.iter().flat_map(|m| m.events.iter()) {
        let length = event_quants(event);
        let current_has_content = output.last().is_some_and(|m| !m.events.is_empty());
        if current_has_content && filled + length > capacity + QUANT_EPSILON {
            output.push(next_measure());
            filled = 0.0;
        }
        if let Some(current) = output.last_mut() {
            current.events.push(event.clone());
        }
        filled += length;
    }

    if let Some(first) = output.first_mut() {
        first.is_pickup = is_pickup;
    }
    output
}

/// Pads `measures` with empty bars until it holds `count` of them.
pub fn pad_measures(measures: &mut Vec<Measure>, count: usize) {
    while measures.len() < count {
        measures.push(Measure::new());
    }
}
