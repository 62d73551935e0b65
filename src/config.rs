// Transport configuration
// Loaded from a RON file; every field falls back to its default when absent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tunables for the transport, the timeline editor and the chord store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Lowest accepted playback rate
    pub min_rate: f64,
    /// Highest accepted playback rate
    pub max_rate: f64,
    /// Floor applied to every chord duration (seconds)
    pub min_chord_duration: f64,
    /// Duration of a chord inserted into an empty timeline (seconds)
    pub default_chord_duration: f64,
    /// Period of the transport polling loop
    pub tick_interval_ms: u64,
    /// Maximum tolerated gap between rendered audio and the clock (seconds)
    pub max_drift_secs: f64,
    /// Quiet period before a chord edit is persisted
    pub save_debounce_ms: u64,
    /// Waveform gain applied at startup (0.0 - 1.0)
    pub initial_volume: f32,
    /// Client name announced to the MIDI backend
    pub midi_client_name: String,
    /// Capacity of the controller -> renderer command ring
    pub render_command_capacity: usize,
    /// Directory of the JSON chord store (platform data dir when unset)
    pub store_dir: Option<PathBuf>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            min_rate: 0.25,
            max_rate: 2.0,
            min_chord_duration: 0.1,
            default_chord_duration: 2.0,
            tick_interval_ms: 10,
            max_drift_secs: 0.1,
            save_debounce_ms: 750,
            initial_volume: 0.8,
            midi_client_name: "chordplay".to_string(),
            render_command_capacity: 64,
            store_dir: None,
        }
    }
}

impl TransportConfig {
    /// Load and validate a RON configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = ron::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty RON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_rate > 0.0 && self.min_rate <= self.max_rate) {
            return Err(ConfigError::Invalid(format!(
                "rate bounds [{}, {}] are not a positive range",
                self.min_rate, self.max_rate
            )));
        }
        if self.min_chord_duration <= 0.0 {
            return Err(ConfigError::Invalid(
                "min_chord_duration must be > 0".to_string(),
            ));
        }
        if self.default_chord_duration < self.min_chord_duration {
            return Err(ConfigError::Invalid(
                "default_chord_duration must be >= min_chord_duration".to_string(),
            ));
        }
        if self.render_command_capacity == 0 {
            return Err(ConfigError::Invalid(
                "render_command_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Chord store directory, falling back to `<data dir>/chordplay/chords`
    pub fn resolved_store_dir(&self) -> PathBuf {
        match &self.store_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("chordplay")
                .join("chords"),
        }
    }
}
