//! # Cadenza - Score Editing from the Command Line
//!
//! A thin host over `cadenza-core`: it loads JSON scores, inspects and
//! reflows them, and replays scripted edit sessions.
//!
//! ## Quick Start
//!
//! ```bash
//! # Create an empty grand-staff score
//! cargo run -- new --clef treble --clef bass -o song.json
//!
//! # Replay an edit script against it
//! cargo run -- edit song.json --script session.txt -o song.json
//!
//! # Rebar into 3/4
//! cargo run -- reflow song.json --time 3/4
//! ```

mod script;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cadenza_core::adapter::score_from_json;
use cadenza_core::{Config, EditorEvent, JsonExporter, ScoreEditor, ScoreExporter};
use cadenza_score::quant::{decompose_quants, remaining_quants};
use cadenza_score::{Clef, Score, TimeSignature};

/// Cadenza - music notation editing core
#[derive(Parser, Debug)]
#[command(name = "cadenza")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Cmd,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Summarize a score
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Rebar a score into a new time signature
    Reflow {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target time signature, e.g. 3/4
        #[arg(short, long)]
        time: TimeSignature,

        /// Output file (stdout if omitted)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Split a quant count into written durations
    Decompose {
        quants: u32,
    },

    /// List the sounding events of a score with their times
    Timeline {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Create an empty score from the configured defaults
    New {
        /// One staff per clef, top to bottom
        #[arg(long = "clef", value_enum, default_value = "treble")]
        clefs: Vec<ClefArg>,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Replay an edit script against a score
    Edit {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// One step per line
        #[arg(short, long, value_name = "FILE")]
        script: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ClefArg {
    Treble,
    Bass,
    Alto,
    Tenor,
}

impl From<ClefArg> for Clef {
    fn from(clef: ClefArg) -> Self {
        match clef {
            ClefArg::Treble => Clef::Treble,
            ClefArg::Bass => Clef::Bass,
            ClefArg::Alto => Clef::Alto,
            ClefArg::Tenor => Clef::Tenor,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    tracing::info!("Starting Cadenza v{}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::load(),
    };

    match args.command {
        Cmd::Inspect { file } => inspect(&load_score(&file)?),
        Cmd::Reflow {
            file,
            time,
            output,
        } => {
            let mut editor = ScoreEditor::open(load_score(&file)?, config)?;
            if !editor.set_time_signature(time) {
                tracing::info!("Score is already in {}", time);
            }
            write_score(editor.score(), output.as_deref())
        }
        Cmd::Decompose { quants } => {
            for part in decompose_quants(quants) {
                let dot = if part.dotted { "dotted " } else { "" };
                println!("{:>3}  {}{}", part.quants, dot, part.duration);
            }
            Ok(())
        }
        Cmd::Timeline { file } => {
            let score = load_score(&file)?;
            let editor = ScoreEditor::open(score, config)?;
            let bpm = editor.score().bpm;
            for entry in editor.playback_timeline() {
                println!(
                    "{:>8.3}s  {:>6.3}s  staff {} bar {:<3} {}",
                    entry.start_seconds(bpm),
                    entry.duration_seconds(bpm),
                    entry.staff_index,
                    entry.measure_index + 1,
                    entry.pitches.join(" ")
                );
            }
            Ok(())
        }
        Cmd::New { clefs, output } => {
            let clefs: Vec<Clef> = clefs.into_iter().map(Clef::from).collect();
            let score = config.score.new_score(&clefs);
            write_score(&score, output.as_deref())
        }
        Cmd::Edit {
            file,
            script,
            output,
        } => {
            let text = std::fs::read_to_string(&script)
                .with_context(|| format!("Failed to read script {}", script.display()))?;
            let steps = script::parse_script(&text)?;
            let mut editor = ScoreEditor::open(load_score(&file)?, config)?;
            let mut events = editor.subscribe();

            for step in &steps {
                let changed = step.apply(&mut editor);
                tracing::debug!("{:?} -> {}", step, changed);
                for event in events.drain() {
                    if let EditorEvent::CommandRejected { label, reason } = event {
                        eprintln!("{label}: {reason}");
                    }
                }
            }
            tracing::info!(
                "Replayed {} steps, {} undo entries",
                steps.len(),
                editor.engine().undo_count()
            );
            write_score(editor.score(), output.as_deref())
        }
    }
}

fn load_score(path: &Path) -> anyhow::Result<Score> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    score_from_json(&text).with_context(|| format!("Failed to load {}", path.display()))
}

fn write_score(score: &Score, output: Option<&Path>) -> anyhow::Result<()> {
    let json = JsonExporter::pretty().export(score)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn inspect(score: &Score) -> anyhow::Result<()> {
    let capacity = score.quants_per_measure();
    println!("{} ({} bpm, {}, key {})", score.title, score.bpm, score.time_signature, score.key_signature);
    println!("{} staves x {} measures", score.staves.len(), score.measure_count());
    for (index, staff) in score.staves.iter().enumerate() {
        let fill: Vec<String> = staff
            .measures
            .iter()
            .map(|m| {
                let free = remaining_quants(m, capacity);
                if free > 0.0 { format!("{free}") } else { "full".to_string() }
            })
            .collect();
        println!("  staff {} {:?}: free quants [{}]", index, staff.clef, fill.join(", "));
    }
    Ok(())
}
