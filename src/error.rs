// Error taxonomy for media loading and transport wiring
//
// Clock, Scheduler and TimelineEditor never fail: they are pure state
// transitions. Only loading and device wiring produce errors.

use thiserror::Error;

/// Failure while fetching, decoding or parsing a media asset.
///
/// A failed load leaves the transport Stopped with its previous media untouched.
#[derive(Debug, Error)]
pub enum MediaLoadError {
    #[error("Failed to fetch '{location}': {source}")]
    Fetch {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported media location: {0}")]
    UnsupportedLocation(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio stream contains no playable track")]
    NoAudioTrack,

    #[error("Failed to parse MIDI file: {0}")]
    MidiParse(String),

    #[error("Background load was interrupted")]
    Interrupted,
}

/// Errors surfaced by the transport facade and its device wiring
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    MediaLoad(#[from] MediaLoadError),

    /// No instrument output could be attached. Callers usually downgrade
    /// this to a warning: note events still reach in-process subscribers.
    #[error("Instrument output unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Failures of the external instrument connection
#[derive(Debug, Error)]
pub enum MidiOutputError {
    #[error("Failed to initialize MIDI output: {0}")]
    Init(String),

    #[error("MIDI output port '{0}' not found")]
    PortNotFound(String),

    #[error("No MIDI output ports available")]
    NoPorts,

    #[error("Failed to connect to '{port}': {reason}")]
    Connect { port: String, reason: String },

    #[error("Failed to send MIDI message: {0}")]
    Send(String),
}

impl From<MidiOutputError> for TransportError {
    fn from(err: MidiOutputError) -> Self {
        TransportError::DeviceUnavailable(err.to_string())
    }
}
