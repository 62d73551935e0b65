// MIDI output - Connection to the external instrument
//
// The event player only knows the `InstrumentOutput` trait. Running without
// any instrument is a valid configuration: note events still reach in-process
// subscribers.

use std::sync::{Arc, Mutex};

use midir::{MidiOutput as MidirOutputClient, MidiOutputConnection};

use crate::error::MidiOutputError;
use crate::midi::event::MidiEvent;

/// Sink for raw three-byte channel-voice messages
pub trait InstrumentOutput: Send {
    fn name(&self) -> &str;

    fn send(&mut self, message: &[u8]) -> Result<(), MidiOutputError>;

    fn send_event(&mut self, event: MidiEvent) -> Result<(), MidiOutputError> {
        self.send(&event.to_bytes())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MidiOutputInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Open midir output connection
pub struct MidirOutput {
    name: String,
    connection: MidiOutputConnection,
}

impl InstrumentOutput for MidirOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, message: &[u8]) -> Result<(), MidiOutputError> {
        self.connection
            .send(message)
            .map_err(|e| MidiOutputError::Send(e.to_string()))
    }
}

impl std::fmt::Debug for MidirOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidirOutput").field("name", &self.name).finish()
    }
}

/// Enumerates and opens MIDI output ports
pub struct MidiOutputManager {
    client_name: String,
}

impl MidiOutputManager {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }

    fn client(&self) -> Result<MidirOutputClient, MidiOutputError> {
        MidirOutputClient::new(&self.client_name).map_err(|e| MidiOutputError::Init(e.to_string()))
    }

    /// List all available output ports. Ids are `midi_out_<index>`.
    pub fn list_output_ports(&self) -> Vec<MidiOutputInfo> {
        let Ok(midi_out) = self.client() else {
            return Vec::new();
        };

        midi_out
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                let name = midi_out.port_name(port).ok()?;
                Some(MidiOutputInfo {
                    id: format!("midi_out_{}", index),
                    name,
                    // First port is treated as default
                    is_default: index == 0,
                })
            })
            .collect()
    }

    /// Connect to a port by id (`midi_out_<n>`) or exact name
    pub fn connect(&self, id_or_name: &str) -> Result<MidirOutput, MidiOutputError> {
        let midi_out = self.client()?;
        let ports = midi_out.ports();

        let by_id = id_or_name
            .strip_prefix("midi_out_")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|index| ports.get(index));

        let port = match by_id {
            Some(port) => port,
            None => ports
                .iter()
                .find(|p| {
                    midi_out
                        .port_name(p)
                        .map(|name| name == id_or_name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| MidiOutputError::PortNotFound(id_or_name.to_string()))?,
        };

        let name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());
        let connection = midi_out
            .connect(port, "chordplay-output")
            .map_err(|e| MidiOutputError::Connect {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Connected to MIDI output: {}", name);
        Ok(MidirOutput { name, connection })
    }

    /// Connect to the first available port
    pub fn connect_default(&self) -> Result<MidirOutput, MidiOutputError> {
        let first = self
            .list_output_ports()
            .into_iter()
            .next()
            .ok_or(MidiOutputError::NoPorts)?;
        self.connect(&first.id)
    }
}

impl Default for MidiOutputManager {
    fn default() -> Self {
        Self::new("chordplay")
    }
}

/// In-memory output that keeps every message it receives.
/// Clones share the same log, so a test can keep one and hand the other
/// to the transport.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<MidiEvent> {
        self.messages()
            .iter()
            .filter_map(|m| MidiEvent::from_bytes(m))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl InstrumentOutput for RecordingOutput {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&mut self, message: &[u8]) -> Result<(), MidiOutputError> {
        self.messages
            .lock()
            .map_err(|_| MidiOutputError::Send("recording log poisoned".to_string()))?
            .push(message.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_output_shares_log() {
        let recorder = RecordingOutput::new();
        let mut handle = recorder.clone();

        handle
            .send_event(MidiEvent::NoteOn {
                note: 60,
                velocity: 90,
            })
            .unwrap();
        handle.send(&[0xB0, 123, 0]).unwrap();

        assert_eq!(recorder.messages(), vec![vec![0x90, 60, 90], vec![0xB0, 123, 0]]);
        assert!(recorder.events()[1].is_all_notes_off());

        recorder.clear();
        assert!(recorder.messages().is_empty());
    }

    #[test]
    fn test_unknown_port_is_reported() {
        // Works with or without a MIDI backend: either init fails or the port is missing
        let manager = MidiOutputManager::new("chordplay-test");
        assert!(manager.connect("definitely-not-a-real-port").is_err());
    }
}
