// Event player - Fires note and chord cues against the transport clock
//
// Notes and chords are immutable `Arc<[T]>` snapshots. Cues reference them by
// index, so replacing a snapshot always goes together with rescheduling.
// Note-ons and chord boundaries are cued in virtual time; a note-off is cued
// on a hardware timer of `duration / rate` from its note-on, and re-cued in
// virtual time if the rate changes while the note sounds.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use super::chord::{Chord, chord_at};
use super::clock::{ClockEvent, ClockEventKind, ClockListener, ClockSnapshot, TimeSource};
use super::note::{MidiNote, NoteId};
use super::scheduler::{ScheduleHandle, Scheduler};
use crate::midi::event::MidiEvent;
use crate::midi::output::InstrumentOutput;

const BOUNDARY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cue {
    NoteOn(usize),
    NoteOff(usize),
    ChordStart(usize),
    ChordEnd(usize),
}

/// What the player reports to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    NoteOn(MidiNote),
    NoteOff(MidiNote),
    ChordChange(Option<Chord>),
}

pub struct EventPlayer {
    time: Arc<dyn TimeSource>,
    notes: Arc<[MidiNote]>,
    chords: Arc<[Chord]>,
    scheduler: Scheduler<Cue>,
    snapshot: ClockSnapshot,
    /// Sounding notes: id -> index into `notes`
    active: HashMap<NoteId, usize>,
    chord_handles: Vec<ScheduleHandle>,
    current_chord: Option<Chord>,
    output: Option<Box<dyn InstrumentOutput>>,
    warned_missing_output: bool,
    send_failed: bool,
    /// Events produced outside `drain` (transitions, edits)
    pending: Vec<PlayerEvent>,
}

impl EventPlayer {
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            time,
            notes: Arc::from(Vec::new()),
            chords: Arc::from(Vec::new()),
            scheduler: Scheduler::new(),
            snapshot: ClockSnapshot::stopped(),
            active: HashMap::new(),
            chord_handles: Vec::new(),
            current_chord: None,
            output: None,
            warned_missing_output: false,
            send_failed: false,
            pending: Vec::new(),
        }
    }

    pub fn notes(&self) -> Arc<[MidiNote]> {
        Arc::clone(&self.notes)
    }

    pub fn chords(&self) -> Arc<[Chord]> {
        Arc::clone(&self.chords)
    }

    pub fn current_chord(&self) -> Option<&Chord> {
        self.current_chord.as_ref()
    }

    /// Number of notes currently sounding
    pub fn active_note_count(&self) -> usize {
        self.active.len()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// Replace both sequences. Anything sounding is silenced first.
    pub fn load(&mut self, notes: Vec<MidiNote>, chords: Vec<Chord>) {
        self.scheduler.cancel_all();
        self.chord_handles.clear();
        if !self.active.is_empty() {
            self.silence();
        }

        let mut notes = notes;
        notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        self.notes = notes.into();
        self.chords = chords.into();

        let now = self.time.now();
        let position = self.snapshot.position_at(now);
        if self.snapshot.state.is_playing() {
            self.schedule_notes(|start| start >= position);
            self.schedule_chords(position);
        }
        if !self.snapshot.state.is_stopped() || self.current_chord.is_some() {
            self.refresh_chord(position);
        }
    }

    pub fn set_notes(&mut self, notes: Vec<MidiNote>) {
        let chords = self.chords.to_vec();
        self.load(notes, chords);
    }

    /// Install an edited chord snapshot. Pending note cues are untouched;
    /// chord cues are re-derived from the new snapshot.
    pub fn set_chords(&mut self, chords: impl Into<Arc<[Chord]>>) {
        for handle in self.chord_handles.drain(..) {
            self.scheduler.cancel(handle);
        }
        self.chords = chords.into();

        let position = self.snapshot.position_at(self.time.now());
        if self.snapshot.state.is_playing() {
            self.schedule_chords(position);
        }
        if !self.snapshot.state.is_stopped() || self.current_chord.is_some() {
            self.refresh_chord(position);
        }
    }

    /// Attach or detach the external instrument. The previous output gets an
    /// all-notes-off so nothing hangs on it.
    pub fn set_output(&mut self, output: Option<Box<dyn InstrumentOutput>>) {
        if let Some(mut previous) = self.output.take() {
            if let Err(e) = previous.send_event(MidiEvent::all_notes_off()) {
                tracing::warn!("Failed to silence '{}': {}", previous.name(), e);
            }
        }
        if let Some(output) = &output {
            tracing::info!("Instrument output: {}", output.name());
        }
        self.output = output;
        self.warned_missing_output = false;
        self.send_failed = false;
    }

    /// Fire every cue due now, in deadline order
    pub fn drain(&mut self) -> Vec<PlayerEvent> {
        let now = self.time.now();
        self.drain_at(now);
        mem::take(&mut self.pending)
    }

    fn drain_at(&mut self, now: f64) {
        // Note-offs cued while draining can already be due
        loop {
            let due = self.scheduler.drain_due(now);
            if due.is_empty() {
                break;
            }
            for cue in due {
                match cue.payload {
                    Cue::NoteOn(index) => self.fire_note_on(index, cue.deadline),
                    Cue::NoteOff(index) => self.fire_note_off(index),
                    Cue::ChordStart(index) => {
                        let chord = self.chords.get(index).cloned();
                        self.set_current_chord(chord);
                    }
                    Cue::ChordEnd(index) => {
                        if self.chords.get(index) == self.current_chord.as_ref() {
                            self.set_current_chord(None);
                        }
                    }
                }
            }
        }
    }

    fn fire_note_on(&mut self, index: usize, deadline: f64) {
        let Some(note) = self.notes.get(index).copied() else {
            return;
        };
        self.send(MidiEvent::NoteOn {
            note: note.pitch,
            velocity: note.midi_velocity(),
        });
        self.active.insert(note.id, index);
        self.pending.push(PlayerEvent::NoteOn(note));

        let length = note.duration / self.snapshot.rate;
        self.scheduler
            .schedule_after(deadline, length, Cue::NoteOff(index));
    }

    fn fire_note_off(&mut self, index: usize) {
        let Some(note) = self.notes.get(index).copied() else {
            return;
        };
        // Already silenced by a transition
        if self.active.remove(&note.id).is_none() {
            return;
        }
        self.send(MidiEvent::NoteOff { note: note.pitch });
        self.pending.push(PlayerEvent::NoteOff(note));
    }

    fn schedule_notes(&mut self, include: impl Fn(f64) -> bool) {
        let notes = Arc::clone(&self.notes);
        let first = notes.partition_point(|n| !include(n.start_time));
        for (index, note) in notes.iter().enumerate().skip(first) {
            if include(note.start_time) {
                self.scheduler.schedule_at(note.start_time, Cue::NoteOn(index));
            }
        }
    }

    fn schedule_chords(&mut self, position: f64) {
        let chords = Arc::clone(&self.chords);
        for (index, chord) in chords.iter().enumerate() {
            if chord.start_time > position {
                if let Some(handle) = self.scheduler.schedule_at(chord.start_time, Cue::ChordStart(index)) {
                    self.chord_handles.push(handle);
                }
            }

            let end = chord.end_time();
            let next_starts_at_end = chords
                .get(index + 1)
                .is_some_and(|next| (next.start_time - end).abs() < BOUNDARY_EPSILON);
            if end > position && !next_starts_at_end {
                if let Some(handle) = self.scheduler.schedule_at(end, Cue::ChordEnd(index)) {
                    self.chord_handles.push(handle);
                }
            }
        }
    }

    /// Re-cue note-offs of sounding notes at their virtual end
    fn schedule_active_note_offs(&mut self) {
        let active: Vec<usize> = self.active.values().copied().collect();
        for index in active {
            let Some(note) = self.notes.get(index).copied() else {
                continue;
            };
            if self
                .scheduler
                .schedule_at(note.end_time(), Cue::NoteOff(index))
                .is_none()
            {
                self.fire_note_off(index);
            }
        }
    }

    fn refresh_chord(&mut self, position: f64) {
        let chord = chord_at(&self.chords, position).map(|i| self.chords[i].clone());
        self.set_current_chord(chord);
    }

    fn set_current_chord(&mut self, chord: Option<Chord>) {
        if self.current_chord != chord {
            self.current_chord = chord.clone();
            self.pending.push(PlayerEvent::ChordChange(chord));
        }
    }

    /// Unconditional all-notes-off. Subscribers get a note-off for every
    /// sounding note; the device only gets the all-notes-off.
    fn silence(&mut self) {
        self.send(MidiEvent::all_notes_off());
        let mut sounding: Vec<usize> = self.active.drain().map(|(_, index)| index).collect();
        sounding.sort_unstable();
        for index in sounding {
            if let Some(note) = self.notes.get(index).copied() {
                self.pending.push(PlayerEvent::NoteOff(note));
            }
        }
    }

    fn send(&mut self, event: MidiEvent) {
        match self.output.as_mut() {
            Some(output) => match output.send_event(event) {
                Ok(()) => self.send_failed = false,
                Err(e) => {
                    if !self.send_failed {
                        tracing::warn!("Instrument output '{}' failed: {}", output.name(), e);
                    }
                    self.send_failed = true;
                }
            },
            None => {
                if !self.warned_missing_output {
                    tracing::warn!("No instrument output attached, note events stay in-process");
                    self.warned_missing_output = true;
                }
            }
        }
    }
}

impl ClockListener for EventPlayer {
    fn on_clock_event(&mut self, event: &ClockEvent) {
        let position = event.position();

        match event.kind {
            ClockEventKind::Start => {
                self.snapshot = event.snapshot;
                self.scheduler.rebase(event.snapshot);
                self.chord_handles.clear();
                self.schedule_notes(|start| start >= position);
                self.schedule_chords(position);
                self.refresh_chord(position);
            }
            ClockEventKind::Pause => {
                self.snapshot = event.snapshot;
                self.scheduler.rebase(event.snapshot);
                self.chord_handles.clear();
                self.silence();
            }
            ClockEventKind::Stop => {
                self.snapshot = event.snapshot;
                self.scheduler.rebase(event.snapshot);
                self.chord_handles.clear();
                self.silence();
                self.set_current_chord(None);
            }
            ClockEventKind::Seek { resumed } => {
                self.snapshot = event.snapshot;
                self.scheduler.rebase(event.snapshot);
                self.chord_handles.clear();
                if !self.active.is_empty() {
                    self.silence();
                }
                self.refresh_chord(position);
                if resumed {
                    self.schedule_notes(|start| start >= position);
                    self.schedule_chords(position);
                }
            }
            ClockEventKind::RateChange => {
                // Cues due under the old rate fire first
                if self.snapshot.state.is_playing() {
                    self.drain_at(event.at);
                }
                self.snapshot = event.snapshot;
                self.scheduler.rebase(event.snapshot);
                self.chord_handles.clear();
                if event.snapshot.state.is_playing() {
                    self.schedule_notes(|start| start > position);
                    self.schedule_chords(position);
                    self.schedule_active_note_offs();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::output::RecordingOutput;
    use crate::sequencer::clock::{Clock, ManualTimeSource};

    struct Rig {
        clock: Clock,
        time: ManualTimeSource,
        player: EventPlayer,
        output: RecordingOutput,
    }

    impl Rig {
        fn new(notes: Vec<MidiNote>, chords: Vec<Chord>) -> Self {
            let time = ManualTimeSource::new(0.0);
            let source: Arc<dyn TimeSource> = Arc::new(time.clone());
            let clock = Clock::new(Arc::clone(&source));
            let mut player = EventPlayer::new(source);
            let output = RecordingOutput::new();
            player.set_output(Some(Box::new(output.clone())));
            player.load(notes, chords);
            Self {
                clock,
                time,
                player,
                output,
            }
        }

        fn dispatch(&mut self, event: Option<ClockEvent>) {
            if let Some(event) = event {
                self.player.on_clock_event(&event);
            }
        }

        fn run_until(&mut self, t: f64) -> Vec<PlayerEvent> {
            let mut events = Vec::new();
            while self.time.now() < t - 1e-12 {
                self.time.advance(0.01f64.min(t - self.time.now()));
                events.extend(self.player.drain());
            }
            events
        }
    }

    fn note(tick: u64, pitch: u8, start: f64, duration: f64) -> MidiNote {
        MidiNote::new(tick, pitch, start, duration, 0.8)
    }

    fn pitches_on(events: &[PlayerEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::NoteOn(n) => Some(n.pitch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_notes_fire_in_order_with_note_offs() {
        let mut rig = Rig::new(
            vec![note(0, 60, 0.0, 0.5), note(480, 62, 1.0, 0.5)],
            Vec::new(),
        );
        let start = rig.clock.start();
        rig.dispatch(start);

        let events = rig.run_until(2.0);
        assert_eq!(pitches_on(&events), vec![60, 62]);
        assert_eq!(
            rig.output.messages(),
            vec![
                vec![0x90, 60, 102],
                vec![0x80, 60, 0],
                vec![0x90, 62, 102],
                vec![0x80, 62, 0],
            ]
        );
    }

    #[test]
    fn test_notes_before_start_position_are_skipped() {
        let mut rig = Rig::new(
            vec![note(0, 60, 1.0, 0.5), note(1, 64, 5.0, 0.5), note(2, 67, 6.0, 0.5)],
            Vec::new(),
        );
        let seek = rig.clock.seek(5.0);
        rig.dispatch(seek);
        let start = rig.clock.start();
        rig.dispatch(start);

        let events = rig.run_until(2.0);
        assert_eq!(pitches_on(&events), vec![64, 67]);
    }

    #[test]
    fn test_stop_sends_all_notes_off_and_no_late_note_off() {
        let mut rig = Rig::new(vec![note(0, 60, 0.0, 2.0)], Vec::new());
        let start = rig.clock.start();
        rig.dispatch(start);
        rig.run_until(0.5);
        assert_eq!(rig.player.active_note_count(), 1);

        let stop = rig.clock.stop();
        rig.dispatch(Some(stop));
        rig.run_until(3.0);

        let messages = rig.output.messages();
        assert_eq!(messages, vec![vec![0x90, 60, 102], vec![0xB0, 123, 0]]);
    }

    #[test]
    fn test_pause_reports_note_off_for_held_notes() {
        let mut rig = Rig::new(vec![note(0, 60, 0.0, 2.0), note(1, 64, 0.0, 2.0)], Vec::new());
        let start = rig.clock.start();
        rig.dispatch(start);
        rig.run_until(0.5);

        let pause = rig.clock.pause();
        rig.dispatch(pause);
        let offs: Vec<u8> = rig
            .player
            .drain()
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::NoteOff(n) => Some(n.pitch),
                _ => None,
            })
            .collect();
        assert_eq!(offs, vec![60, 64]);
        assert_eq!(rig.player.active_note_count(), 0);

        // Only the all-notes-off reaches the device
        assert_eq!(rig.output.messages().last(), Some(&vec![0xB0, 123, 0]));
        assert!(!rig.output.messages().contains(&vec![0x80, 60, 0]));

        rig.time.advance(5.0);
        assert!(rig.player.drain().is_empty());
    }

    #[test]
    fn test_pause_always_sends_all_notes_off() {
        let mut rig = Rig::new(Vec::new(), Vec::new());
        let start = rig.clock.start();
        rig.dispatch(start);
        let pause = rig.clock.pause();
        rig.dispatch(pause);
        assert_eq!(rig.output.messages(), vec![vec![0xB0, 123, 0]]);
    }

    #[test]
    fn test_rate_change_reschedules_pending_notes() {
        let mut rig = Rig::new(vec![note(0, 60, 2.0, 0.5)], Vec::new());
        let start = rig.clock.start();
        rig.dispatch(start);
        let rate = rig.clock.set_rate(2.0);
        rig.dispatch(rate);

        assert!(rig.run_until(0.99).is_empty());
        let events = rig.run_until(1.01);
        assert_eq!(pitches_on(&events), vec![60]);
    }

    #[test]
    fn test_rate_change_moves_sounding_note_off() {
        let mut rig = Rig::new(vec![note(0, 60, 0.0, 2.0)], Vec::new());
        let start = rig.clock.start();
        rig.dispatch(start);
        rig.run_until(1.0);

        // One virtual second left, now at double speed
        let rate = rig.clock.set_rate(2.0);
        rig.dispatch(rate);
        let before = rig.run_until(1.49);
        assert!(before.iter().all(|e| !matches!(e, PlayerEvent::NoteOff(_))));
        let after = rig.run_until(1.51);
        assert!(after.iter().any(|e| matches!(e, PlayerEvent::NoteOff(_))));
    }

    #[test]
    fn test_chord_changes_follow_timeline() {
        let mut rig = Rig::new(
            Vec::new(),
            vec![Chord::new("C", 0.0, 1.0), Chord::new("F", 1.0, 1.0)],
        );
        let start = rig.clock.start();
        rig.dispatch(start);
        assert_eq!(rig.player.current_chord().map(|c| c.label.as_str()), Some("C"));

        let events = rig.run_until(1.5);
        let labels: Vec<Option<String>> = events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::ChordChange(c) => Some(c.as_ref().map(|c| c.label.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec![Some("C".to_string()), Some("F".to_string())]);

        let events = rig.run_until(2.5);
        assert_eq!(events, vec![PlayerEvent::ChordChange(None)]);
    }

    #[test]
    fn test_edit_mid_playback_takes_effect() {
        let mut rig = Rig::new(
            Vec::new(),
            vec![Chord::new("C", 0.0, 1.0), Chord::new("F", 1.0, 1.0)],
        );
        let start = rig.clock.start();
        rig.dispatch(start);
        rig.run_until(0.5);

        rig.player
            .set_chords(vec![Chord::new("C", 0.0, 0.6), Chord::new("G", 0.6, 1.4)]);
        let events = rig.run_until(0.7);
        assert!(events.contains(&PlayerEvent::ChordChange(Some(Chord::new("G", 0.6, 1.4)))));
        assert_eq!(rig.player.current_chord().map(|c| c.label.as_str()), Some("G"));
    }

    #[test]
    fn test_stop_clears_current_chord() {
        let mut rig = Rig::new(Vec::new(), vec![Chord::new("C", 0.0, 4.0)]);
        let start = rig.clock.start();
        rig.dispatch(start);
        rig.player.drain();

        let stop = rig.clock.stop();
        rig.dispatch(Some(stop));
        assert_eq!(rig.player.current_chord(), None);
        assert_eq!(rig.player.drain(), vec![PlayerEvent::ChordChange(None)]);
    }

    #[test]
    fn test_missing_output_still_reports_events() {
        let time = ManualTimeSource::new(0.0);
        let source: Arc<dyn TimeSource> = Arc::new(time.clone());
        let mut clock = Clock::new(Arc::clone(&source));
        let mut player = EventPlayer::new(source);
        player.load(vec![note(0, 60, 0.0, 0.1)], Vec::new());

        if let Some(event) = clock.start() {
            player.on_clock_event(&event);
        }
        let events = player.drain();
        assert_eq!(pitches_on(&events), vec![60]);
    }
}
