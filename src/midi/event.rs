// MIDI channel-voice messages sent to the external instrument

/// Controller number of the "All Notes Off" channel-mode message
pub const ALL_NOTES_OFF_CONTROLLER: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
}

impl MidiEvent {
    pub fn all_notes_off() -> Self {
        MidiEvent::ControlChange {
            controller: ALL_NOTES_OFF_CONTROLLER,
            value: 0,
        }
    }

    pub fn is_all_notes_off(&self) -> bool {
        matches!(
            self,
            MidiEvent::ControlChange {
                controller: ALL_NOTES_OFF_CONTROLLER,
                ..
            }
        )
    }

    /// Raw three-byte message on channel 1
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiEvent::NoteOn { note, velocity } => [0x90, note & 0x7F, velocity & 0x7F],
            MidiEvent::NoteOff { note } => [0x80, note & 0x7F, 0],
            MidiEvent::ControlChange { controller, value } => {
                [0xB0, controller & 0x7F, value & 0x7F]
            }
        }
    }

    /// Parse a raw MIDI message (any channel)
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let [status, data1, data2] = *bytes.get(..3)? else {
            return None;
        };

        match status & 0xF0 {
            // Velocity 0 = Note Off
            0x90 if data2 == 0 => Some(MidiEvent::NoteOff { note: data1 }),
            0x90 => Some(MidiEvent::NoteOn {
                note: data1,
                velocity: data2,
            }),
            0x80 => Some(MidiEvent::NoteOff { note: data1 }),
            0xB0 => Some(MidiEvent::ControlChange {
                controller: data1,
                value: data2,
            }),
            _ => None,
        }
    }
}
