//! Scripted edit sessions.
//!
//! A script is one step per line; blank lines and `#` comments are
//! skipped. Steps name the editor operation they drive:
//!
//! ```text
//! select 0 1 0      # staff, measure, event index
//! right
//! insert C5
//! duration eighth
//! tuplet 3:2 3
//! undo
//! ```

use std::str::FromStr;

use cadenza_core::{Direction, ScoreEditor};
use cadenza_score::{Duration, TimeSignature, TupletRatio};

/// A script line that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub message: String,
}

/// One editor operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Select {
        staff: usize,
        measure: usize,
        event: usize,
    },
    Move(Direction),
    Extend(Direction),
    SelectAll,
    Clear,
    Insert(String),
    Chord(String),
    Rest,
    Delete,
    Transpose(i32),
    Diatonic(i32),
    Duration(Duration),
    Dot,
    Tuplet { ratio: TupletRatio, size: usize },
    RemoveTuplet,
    Time(TimeSignature),
    Key(String),
    Grand,
    Single,
    AddMeasure(Option<usize>),
    DeleteMeasure(usize),
    Undo,
    Redo,
}

impl FromStr for Step {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or("empty step")?;
        let args: Vec<&str> = words.collect();
        let arg = |i: usize| args.get(i).copied().ok_or(format!("'{name}' needs more arguments"));
        let int = |i: usize| -> Result<i64, String> {
            arg(i)?.parse().map_err(|_| format!("'{}' is not a number", args[i]))
        };
        let index = |i: usize| -> Result<usize, String> {
            usize::try_from(int(i)?).map_err(|_| format!("'{}' is not an index", args[i]))
        };

        let step = match name {
            "select" => Step::Select {
                staff: index(0)?,
                measure: index(1)?,
                event: index(2)?,
            },
            "left" => Step::Move(Direction::Left),
            "right" => Step::Move(Direction::Right),
            "up" => Step::Move(Direction::Up),
            "down" => Step::Move(Direction::Down),
            "shift-left" => Step::Extend(Direction::Left),
            "shift-right" => Step::Extend(Direction::Right),
            "select-all" => Step::SelectAll,
            "clear" => Step::Clear,
            "insert" => Step::Insert(arg(0).unwrap_or_default().to_string()),
            "chord" => Step::Chord(arg(0)?.to_string()),
            "rest" => Step::Rest,
            "delete" => Step::Delete,
            "transpose" => Step::Transpose(int(0)? as i32),
            "diatonic" => Step::Diatonic(int(0)? as i32),
            "duration" => Step::Duration(arg(0)?.parse().map_err(|e| format!("{e}"))?),
            "dot" => Step::Dot,
            "tuplet" => {
                let (n, d) = arg(0)?
                    .split_once(':')
                    .ok_or("tuplet ratio must look like 3:2")?;
                let numerator = n.parse().map_err(|_| "bad tuplet numerator")?;
                let denominator = d.parse().map_err(|_| "bad tuplet denominator")?;
                Step::Tuplet {
                    ratio: TupletRatio::new(numerator, denominator),
                    size: index(1)?,
                }
            }
            "untuplet" => Step::RemoveTuplet,
            "time" => Step::Time(arg(0)?.parse().map_err(|e| format!("{e}"))?),
            "key" => Step::Key(arg(0)?.to_string()),
            "grand" => Step::Grand,
            "single" => Step::Single,
            "measure" => Step::AddMeasure(if args.is_empty() { None } else { Some(index(0)?) }),
            "delete-measure" => Step::DeleteMeasure(index(0)?),
            "undo" => Step::Undo,
            "redo" => Step::Redo,
            other => return Err(format!("unknown step '{other}'")),
        };
        Ok(step)
    }
}

impl Step {
    /// Runs the step. Returns whether the editor changed.
    pub fn apply(&self, editor: &mut ScoreEditor) -> bool {
        match self {
            Step::Select {
                staff,
                measure,
                event,
            } => {
                let id = editor
                    .score()
                    .measure(*staff, *measure)
                    .and_then(|m| m.events.get(*event))
                    .map(|e| e.id.clone());
                id.is_some_and(|id| editor.select_event(*staff, *measure, &id))
            }
            Step::Move(direction) => editor.move_cursor(*direction),
            Step::Extend(direction) => editor.extend_cursor(*direction),
            Step::SelectAll => editor.select_all(),
            Step::Clear => editor.clear_selection(),
            Step::Insert(pitch) => editor.insert_note(pitch),
            Step::Chord(pitch) => editor.add_to_chord(pitch),
            Step::Rest => editor.toggle_rest(),
            Step::Delete => editor.delete_selection(),
            Step::Transpose(semitones) => editor.transpose(*semitones),
            Step::Diatonic(steps) => editor.transpose_diatonic(*steps),
            Step::Duration(duration) => editor.set_duration(*duration),
            Step::Dot => editor.toggle_dot(),
            Step::Tuplet { ratio, size } => editor.apply_tuplet(*ratio, *size),
            Step::RemoveTuplet => editor.remove_tuplet(),
            Step::Time(time_signature) => editor.set_time_signature(*time_signature),
            Step::Key(key) => editor.set_key_signature(key),
            Step::Grand => editor.set_grand_staff(),
            Step::Single => editor.set_single_staff(),
            Step::AddMeasure(index) => editor.add_measure(*index),
            Step::DeleteMeasure(index) => editor.delete_measure(*index),
            Step::Undo => editor.undo(),
            Step::Redo => editor.redo(),
        }
    }
}

/// Parses a whole script.
pub fn parse_script(text: &str) -> Result<Vec<Step>, ScriptError> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line = strip_comment(line);
            (!line.is_empty()).then_some((i + 1, line))
        })
        .map(|(line, text)| text.parse().map_err(|message| ScriptError { line, message }))
        .collect()
}

/// Cuts a trailing comment. A `#` inside a word (as in `C#5`) is kept.
fn strip_comment(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|&(i, c)| c == '#' && (i == 0 || line[..i].ends_with(char::is_whitespace)))
        .map_or(line.len(), |(i, _)| i);
    line[..end].trim()
}
