//! Contracts for collaborators that live outside the core.
//!
//! Audio and export adapters only ever read a snapshot. Nothing they do
//! flows back into the document.

use serde::Serialize;

use cadenza_score::Score;
use cadenza_score::timeline::build_timeline;

use crate::{CoreError, CoreResult};

/// Receives the tones of a score in start order.
pub trait AudioSink {
    /// Schedules one tone. Times are in seconds from the start of the score.
    fn schedule(&mut self, frequency: f64, start: f64, duration: f64);
}

/// A scheduled tone, for sinks that just collect them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tone {
    pub frequency: f64,
    pub start: f64,
    pub duration: f64,
}

impl AudioSink for Vec<Tone> {
    fn schedule(&mut self, frequency: f64, start: f64, duration: f64) {
        self.push(Tone {
            frequency,
            start,
            duration,
        });
    }
}

/// Feeds every sounding note of `score` to `sink` at the score's tempo.
/// Returns the number of tones scheduled.
pub fn schedule_playback(score: &Score, sink: &mut dyn AudioSink) -> usize {
    let mut count = 0;
    for entry in build_timeline(score) {
        let start = entry.start_seconds(score.bpm);
        let duration = entry.duration_seconds(score.bpm);
        for frequency in &entry.frequencies {
            sink.schedule(*frequency, start, duration);
            count += 1;
        }
    }
    tracing::debug!("Scheduled {} tones", count);
    count
}

/// Serializes a snapshot to text.
pub trait ScoreExporter {
    /// Short format name, e.g. `"json"`.
    fn format(&self) -> &str;

    fn export(&self, score: &Score) -> CoreResult<String>;
}

/// JSON in the interchange shape (camelCase fields).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter {
    pub pretty: bool,
}

impl JsonExporter {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl ScoreExporter for JsonExporter {
    fn format(&self) -> &str {
        "json"
    }

    fn export(&self, score: &Score) -> CoreResult<String> {
        let text = if self.pretty {
            serde_json::to_string_pretty(score)?
        } else {
            serde_json::to_string(score)?
        };
        Ok(text)
    }
}

/// Parses a JSON score and checks its structure.
pub fn score_from_json(text: &str) -> CoreResult<Score> {
    let score: Score = serde_json::from_str(text)?;
    score.validate().map_err(CoreError::InvalidState)?;
    Ok(score)
}
