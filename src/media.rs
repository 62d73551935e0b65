// Media loading - Fetch, decode and parse a session's assets
//
// Loading is the only slow transport operation. It runs either inline
// (`load_media`) or on a worker thread (`PendingMedia`), and is all-or-nothing:
// a failed load never replaces what is currently attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::decoder::{DecodedAudio, decode_audio};
use crate::error::MediaLoadError;
use crate::midi::file::parse_midi_notes;
use crate::sequencer::note::{MidiNote, last_note_end};

/// Source of raw media bytes
pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, MediaLoadError>;
}

/// Reads plain paths and `file://` URLs, relative ones against `base_dir`
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    base_dir: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    pub fn resolve(&self, location: &str) -> Result<PathBuf, MediaLoadError> {
        let raw = match location.strip_prefix("file://") {
            Some(path) => path,
            None if location.contains("://") => {
                return Err(MediaLoadError::UnsupportedLocation(location.to_string()));
            }
            None => location,
        };
        if raw.is_empty() {
            return Err(MediaLoadError::UnsupportedLocation(location.to_string()));
        }

        let path = Path::new(raw);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        })
    }
}

impl MediaFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, MediaLoadError> {
        let path = self.resolve(location)?;
        std::fs::read(&path).map_err(|source| MediaLoadError::Fetch {
            location: location.to_string(),
            source,
        })
    }
}

/// Summary handed back to the caller of a load
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    /// max(audio duration, end of last note)
    pub duration: f64,
    pub audio_duration: f64,
    pub notes: Vec<MidiNote>,
}

/// Fully decoded assets, ready to attach
#[derive(Debug, Clone)]
pub struct LoadedMedia {
    pub audio: DecodedAudio,
    pub notes: Vec<MidiNote>,
}

impl LoadedMedia {
    pub fn info(&self) -> MediaInfo {
        let audio_duration = self.audio.duration();
        MediaInfo {
            duration: audio_duration.max(last_note_end(&self.notes)),
            audio_duration,
            notes: self.notes.clone(),
        }
    }
}

fn extension_of(location: &str) -> Option<String> {
    Path::new(location)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Fetch and decode the audio, and the notes when a location is given
pub fn load_media(
    fetcher: &dyn MediaFetcher,
    audio_location: &str,
    notes_location: Option<&str>,
) -> Result<LoadedMedia, MediaLoadError> {
    let bytes = fetcher.fetch(audio_location)?;
    let audio = decode_audio(bytes, extension_of(audio_location).as_deref())?;

    let notes = match notes_location {
        Some(location) => parse_midi_notes(&fetcher.fetch(location)?)?,
        None => Vec::new(),
    };

    tracing::info!(
        "Loaded '{}' ({:.2}s, {} notes)",
        audio_location,
        audio.duration(),
        notes.len()
    );
    Ok(LoadedMedia { audio, notes })
}

/// A load running on a worker thread
pub struct PendingMedia {
    audio_location: String,
    handle: Option<JoinHandle<Result<LoadedMedia, MediaLoadError>>>,
}

impl PendingMedia {
    pub fn spawn(
        fetcher: Arc<dyn MediaFetcher>,
        audio_location: impl Into<String>,
        notes_location: Option<String>,
    ) -> Result<Self, MediaLoadError> {
        let audio_location = audio_location.into();
        let location = audio_location.clone();

        let handle = thread::Builder::new()
            .name("media-load".into())
            .spawn(move || load_media(fetcher.as_ref(), &location, notes_location.as_deref()))
            .map_err(|source| MediaLoadError::Fetch {
                location: audio_location.clone(),
                source,
            })?;

        Ok(Self {
            audio_location,
            handle: Some(handle),
        })
    }

    pub fn audio_location(&self) -> &str {
        &self.audio_location
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Result of the load if it is done, without blocking.
    /// Returns `None` while running and after the result was taken.
    pub fn try_take(&mut self) -> Option<Result<LoadedMedia, MediaLoadError>> {
        if !self.handle.as_ref()?.is_finished() {
            return None;
        }
        self.handle.take().map(Self::join)
    }

    /// Block until the load completes
    pub fn wait(mut self) -> Result<LoadedMedia, MediaLoadError> {
        match self.handle.take() {
            Some(handle) => Self::join(handle),
            None => Err(MediaLoadError::Interrupted),
        }
    }

    fn join(handle: JoinHandle<Result<LoadedMedia, MediaLoadError>>) -> Result<LoadedMedia, MediaLoadError> {
        handle.join().unwrap_or(Err(MediaLoadError::Interrupted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_locations() {
        let fetcher = FileFetcher::with_base_dir("/media");
        assert_eq!(fetcher.resolve("song.mp3").unwrap(), PathBuf::from("/media/song.mp3"));
        assert_eq!(
            fetcher.resolve("file:///abs/song.mp3").unwrap(),
            PathBuf::from("/abs/song.mp3")
        );
        assert!(matches!(
            fetcher.resolve("https://example.com/song.mp3"),
            Err(MediaLoadError::UnsupportedLocation(_))
        ));
        assert!(fetcher.resolve("").is_err());
    }

    #[test]
    fn test_missing_file_is_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FileFetcher::with_base_dir(dir.path());
        let err = fetcher.fetch("missing.wav").unwrap_err();
        assert!(matches!(err, MediaLoadError::Fetch { .. }));
    }

    #[test]
    fn test_extension_hint() {
        assert_eq!(extension_of("a/b/Song.MP3").as_deref(), Some("mp3"));
        assert_eq!(extension_of("noext"), None);
    }

    #[test]
    fn test_background_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher: Arc<dyn MediaFetcher> = Arc::new(FileFetcher::with_base_dir(dir.path()));
        let pending = PendingMedia::spawn(fetcher, "missing.wav", None).unwrap();
        assert!(matches!(pending.wait(), Err(MediaLoadError::Fetch { .. })));
    }
}
