// MIDI module - Instrument output and Standard MIDI File import

pub mod event;
pub mod file;
pub mod output;

pub use event::MidiEvent;
pub use file::parse_midi_notes;
pub use output::{InstrumentOutput, MidiOutputInfo, MidiOutputManager, MidirOutput, RecordingOutput};
