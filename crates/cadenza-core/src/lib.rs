//! # Cadenza Core
//!
//! Editing logic on top of the score model.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       ScoreEditor                         │
//! │  ┌──────────────┐ ┌─────────────┐ ┌────────────────────┐  │
//! │  │ Selection +  │ │   Config    │ │      EventBus      │  │
//! │  │ PreviewNote  │ └─────────────┘ └────────────────────┘  │
//! │  └──────┬───────┘                                         │
//! │         │ navigation (pure)                               │
//! │  ┌──────┴───────────────────────────────────────────┐     │
//! │  │                 CommandEngine                     │     │
//! │  │   Arc<Score> ── history ── redo ── transaction    │     │
//! │  └───────────────────────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Commands build new snapshots and never mutate shared ones, so a failed
//! or half-finished `execute` cannot corrupt the live document.

pub mod adapter;
pub mod command;
pub mod commands;
pub mod config;
pub mod editor;
pub mod engine;
pub mod event;
pub mod navigation;
pub mod registry;

pub use adapter::{AudioSink, JsonExporter, ScoreExporter, Tone};
pub use command::{BatchCommand, Command, EventSnapshot, UndoPayload};
pub use config::{Config, ConfigError, EditorConfig, InputConfig, ScoreConfig};
pub use editor::{InputState, ScoreEditor};
pub use engine::{CommandEngine, DEFAULT_UNDO_LIMIT};
pub use event::{EditorEvent, EventBus, EventHandler};
pub use navigation::{Direction, NavigationContext, NavigationOutcome};
pub use registry::{EditorId, EngineRegistry};

use cadenza_score::ScoreError;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid document state: {0}")]
    InvalidState(#[source] ScoreError),

    #[error("Command '{label}' failed: {reason}")]
    CommandFailed { label: String, reason: String },

    #[error("Editor not found: {0}")]
    EditorNotFound(EditorId),

    #[error("A transaction is open")]
    TransactionOpen,

    #[error("Score error: {0}")]
    Score(#[from] ScoreError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
