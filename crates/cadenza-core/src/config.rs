//! Editor configuration.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the
//! keys it wants to change.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use cadenza_score::{Clef, DefaultPitches, Duration, Score, TimeSignature};

use crate::engine::DEFAULT_UNDO_LIMIT;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Editing behaviour
    pub editor: EditorConfig,

    /// Defaults for new scores
    pub score: ScoreConfig,

    /// Note entry
    pub input: InputConfig,
}

impl Config {
    /// Loads config from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from_default_path().unwrap_or_default()
    }

    /// Loads config from a file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    fn load_from_default_path() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("cadenza").join("config.toml"))
    }

    /// Saves the config to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path()?)
    }

    /// Saves the config as pretty TOML, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Editing behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo steps kept before the oldest is dropped
    pub undo_limit: usize,

    /// Wrap vertical navigation from the last staff to the first
    pub cycle_staves: bool,

    /// Duration selected when the editor opens
    pub default_duration: Duration,

    /// Whether the dot is on when the editor opens
    pub default_dotted: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_limit: DEFAULT_UNDO_LIMIT,
            cycle_staves: true,
            default_duration: Duration::Quarter,
            default_dotted: false,
        }
    }
}

/// Defaults for new scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    pub title: String,
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub key_signature: String,
    /// Number of empty measures
    pub measures: usize,
}

impl ScoreConfig {
    /// An empty score with one staff per clef, built from these defaults.
    pub fn new_score(&self, clefs: &[Clef]) -> Score {
        let mut score = Score::blank(clefs, self.measures.max(1), self.time_signature);
        score.title = self.title.clone();
        score.bpm = self.bpm;
        score.key_signature = self.key_signature.clone();
        for staff in &mut score.staves {
            staff.key_signature = self.key_signature.clone();
        }
        score
    }
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            bpm: 120,
            time_signature: TimeSignature::COMMON,
            key_signature: "C".to_string(),
            measures: 4,
        }
    }
}

/// Note entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Pitch a fresh ghost cursor or restored note gets, per clef
    pub default_pitches: DefaultPitches,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
