// Note representation for the event player
// A note is a pitch with a start time, duration and velocity, all in seconds
// and normalized units rather than raw MIDI ticks.

use serde::{Deserialize, Serialize};

/// Unique identifier for notes, derived from (tick, pitch)
pub type NoteId = u64;

/// Which hand plays the note, when the source distinguishes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

/// A scheduled note. Immutable once loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MidiNote {
    pub id: NoteId,

    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Start time in seconds
    pub start_time: f64,

    /// Duration in seconds (> 0)
    pub duration: f64,

    /// Normalized velocity (0.0 - 1.0)
    pub velocity: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand: Option<Hand>,
}

/// Deterministic id: the same (tick, pitch) always yields the same note id,
/// which keeps rescheduling idempotent
pub fn note_id(tick: u64, pitch: u8) -> NoteId {
    (tick << 7) | (pitch as u64 & 0x7F)
}

impl MidiNote {
    /// Creates a new note starting at `tick` in the source sequence
    pub fn new(tick: u64, pitch: u8, start_time: f64, duration: f64, velocity: f32) -> Self {
        assert!(pitch <= 127, "MIDI pitch must be 0-127");
        assert!(duration > 0.0, "Note duration must be > 0");

        Self {
            id: note_id(tick, pitch),
            pitch,
            start_time,
            duration,
            velocity: velocity.clamp(0.0, 1.0),
            hand: None,
        }
    }

    pub fn with_hand(mut self, hand: Hand) -> Self {
        self.hand = Some(hand);
        self
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// True if the note sounds at `time`
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    /// Velocity scaled to the 1-127 range of a note-on message.
    /// Zero is avoided since a note-on with velocity 0 means note-off.
    pub fn midi_velocity(&self) -> u8 {
        ((self.velocity.clamp(0.0, 1.0) * 127.0).round() as u8).max(1)
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        const NOTE_NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];

        let octave = (self.pitch / 12) as i32 - 1;
        let note_index = (self.pitch % 12) as usize;

        format!("{}{}", NOTE_NAMES[note_index], octave)
    }
}

/// End time of the last note, 0 for an empty sequence
pub fn last_note_end(notes: &[MidiNote]) -> f64 {
    notes.iter().map(MidiNote::end_time).fold(0.0, f64::max)
}
