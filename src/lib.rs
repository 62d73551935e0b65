// Chordplay - Synchronized playback of audio, MIDI notes and chord labels

pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod messaging;
pub mod midi;
pub mod persistence;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::output::AudioOutput;
pub use audio::waveform::{WaveformPlayer, WaveformRenderer};
pub use config::TransportConfig;
pub use error::{MediaLoadError, MidiOutputError, TransportError, TransportResult};
pub use media::{FileFetcher, MediaFetcher, MediaInfo};
pub use messaging::{ChordChange, NoteEvent, Subscription};
pub use midi::output::{InstrumentOutput, MidiOutputManager};
pub use persistence::{ChordStore, DebouncedSaver, JsonChordStore};
pub use sequencer::{
    Chord, Clock, ManualTimeSource, MidiNote, PlaybackState, Selection, TimeSource,
    TimelineEditor, Transport,
};
