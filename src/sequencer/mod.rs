// Sequencer module
// Virtual clock, cue scheduling, note/chord playback and chord timeline editing

pub mod chord;
pub mod clock;
pub mod note;
pub mod player;
pub mod scheduler;
pub mod timeline;
pub mod transport;

pub use chord::{Chord, chord_at};
pub use clock::{
    Clock, ClockEvent, ClockEventKind, ClockListener, ClockSnapshot, ManualTimeSource,
    PlaybackState, SystemTimeSource, TimeSource,
};
pub use note::{Hand, MidiNote, NoteId, last_note_end};
pub use player::{EventPlayer, PlayerEvent};
pub use scheduler::{Due, ScheduleHandle, Scheduler};
pub use timeline::{Boundary, InsertSide, Selection, TimelineEditor};
pub use transport::Transport;
