// Chord store - One JSON document per session

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::sequencer::chord::Chord;

/// Storage backend for chord timelines
pub trait ChordStore: Send {
    fn save(&mut self, session_id: &str, chords: &[Chord]) -> Result<(), StoreError>;

    /// Chords of `session_id`, empty for an unknown session
    fn load(&self, session_id: &str) -> Result<Vec<Chord>, StoreError>;
}

/// On-disk document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordDocument {
    pub session_id: String,
    pub saved_at: DateTime<Utc>,
    pub chords: Vec<Chord>,
}

/// Stores each session as `<dir>/<session>.json`
#[derive(Debug, Clone)]
pub struct JsonChordStore {
    dir: PathBuf,
}

impl JsonChordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `session_id`. Only ASCII alphanumerics, '-' and '_' are
    /// kept so a session id can never escape the store directory.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf, StoreError> {
        let file_stem: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if file_stem.is_empty() || file_stem.chars().all(|c| c == '_') {
            return Err(StoreError::InvalidSession(session_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", file_stem)))
    }

    pub fn load_document(&self, session_id: &str) -> Result<Option<ChordDocument>, StoreError> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

impl ChordStore for JsonChordStore {
    fn save(&mut self, session_id: &str, chords: &[Chord]) -> Result<(), StoreError> {
        let path = self.path_for(session_id)?;
        fs::create_dir_all(&self.dir)?;

        let document = ChordDocument {
            session_id: session_id.to_string(),
            saved_at: Utc::now(),
            chords: chords.to_vec(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        // Write then rename so a crash never leaves a truncated document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!("Saved {} chords to {}", chords.len(), path.display());
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<Vec<Chord>, StoreError> {
        let mut chords = self
            .load_document(session_id)?
            .map(|doc| doc.chords)
            .unwrap_or_default();
        chords.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(chords)
    }
}
