// Messaging - Event fan-out from the transport to the application

pub mod observers;

pub use observers::{ChordChange, NoteEvent, Observers, Subscription, Topic};
