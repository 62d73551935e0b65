// Debounced saver - Fire-and-forget persistence of chord edits

use std::time::{Duration, Instant};

use super::store::ChordStore;
use crate::sequencer::chord::Chord;

/// Coalesces bursts of edits into a single save. Failures are logged, never
/// surfaced: losing one save must not interrupt editing or playback.
pub struct DebouncedSaver {
    store: Box<dyn ChordStore>,
    session_id: String,
    delay: Duration,
    pending: Option<(Vec<Chord>, Instant)>,
    saves: usize,
}

impl DebouncedSaver {
    pub fn new(store: Box<dyn ChordStore>, session_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            delay,
            pending: None,
            saves: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of successful writes so far
    pub fn save_count(&self) -> usize {
        self.saves
    }

    /// Queue `chords` for saving; restarts the quiet period
    pub fn request(&mut self, chords: &[Chord], now: Instant) {
        self.pending = Some((chords.to_vec(), now + self.delay));
    }

    /// Save if the quiet period has elapsed. Returns true if a write happened.
    pub fn poll(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some((_, due)) if *due <= now => self.flush(),
            _ => false,
        }
    }

    /// Save pending chords immediately
    pub fn flush(&mut self) -> bool {
        let Some((chords, _)) = self.pending.take() else {
            return false;
        };
        match self.store.save(&self.session_id, &chords) {
            Ok(()) => {
                self.saves += 1;
                true
            }
            Err(e) => {
                tracing::warn!("Failed to save chords for '{}': {}", self.session_id, e);
                false
            }
        }
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        self.flush();
    }
}
