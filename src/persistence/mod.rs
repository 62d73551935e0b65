// Chord persistence - Storage collaborator for edited chord timelines
//
// The transport never blocks on storage: edits go through a DebouncedSaver
// that writes once the user has stopped editing for a moment.

pub mod debounce;
pub mod store;

pub use debounce::DebouncedSaver;
pub use store::{ChordDocument, ChordStore, JsonChordStore};

use thiserror::Error;

/// Chord store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid session id: '{0}'")]
    InvalidSession(String),
}
