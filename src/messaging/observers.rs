// Observer registry - Typed subscriptions to transport events
//
// Listeners are plain closures stored per event type. Subscribing returns a
// handle; dropping the handle does nothing, unsubscribing is explicit.

use crate::sequencer::chord::Chord;
use crate::sequencer::note::MidiNote;

/// Which registry a subscription belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Time,
    Notes,
    Chords,
}

/// Handle returned by `Transport::subscribe_*`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) topic: Topic,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Note-on / note-off notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    On(MidiNote),
    Off(MidiNote),
}

impl NoteEvent {
    pub fn note(&self) -> &MidiNote {
        match self {
            NoteEvent::On(note) | NoteEvent::Off(note) => note,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, NoteEvent::On(_))
    }
}

/// Current chord changed; `None` when no chord covers the position
pub type ChordChange = Option<Chord>;

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Listeners for one event type
pub struct Observers<E> {
    listeners: Vec<(u64, Listener<E>)>,
    next_id: u64,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + Send + 'static) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Call every listener in subscription order
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}
