// Transport - Facade over the clock, the waveform and the event player
//
// Every control call goes to the clock; the resulting event is broadcast to
// each ClockListener. The transport never drives a component's playback
// directly. `tick()` is the single place where time moves forward for
// cue firing, late media attachment, drift control and subscriber updates.

use std::sync::Arc;

use super::chord::Chord;
use super::clock::{Clock, ClockEvent, ClockListener, PlaybackState, SystemTimeSource, TimeSource};
use super::note::{MidiNote, last_note_end};
use super::player::{EventPlayer, PlayerEvent};
use crate::audio::waveform::{WaveformPlayer, WaveformRenderer};
use crate::config::TransportConfig;
use crate::error::{MediaLoadError, TransportResult};
use crate::media::{LoadedMedia, MediaFetcher, MediaInfo, PendingMedia, load_media};
use crate::messaging::observers::{ChordChange, NoteEvent, Observers, Subscription, Topic};
use crate::midi::output::{InstrumentOutput, MidiOutputManager};

pub struct Transport {
    config: TransportConfig,
    clock: Clock,
    waveform: WaveformPlayer,
    events: EventPlayer,
    pending_media: Option<PendingMedia>,
    time_observers: Observers<f64>,
    note_observers: Observers<NoteEvent>,
    chord_observers: Observers<ChordChange>,
}

impl Transport {
    /// Create a transport on `time`. The returned renderer belongs on the
    /// audio thread (see `AudioOutput::start`).
    pub fn new(config: TransportConfig, time: Arc<dyn TimeSource>) -> (Self, WaveformRenderer) {
        let clock = Clock::with_rate_bounds(Arc::clone(&time), config.min_rate, config.max_rate);
        let (waveform, renderer) = WaveformPlayer::new(&config);
        let events = EventPlayer::new(time);

        let transport = Self {
            config,
            clock,
            waveform,
            events,
            pending_media: None,
            time_observers: Observers::new(),
            note_observers: Observers::new(),
            chord_observers: Observers::new(),
        };
        (transport, renderer)
    }

    pub fn with_system_clock(config: TransportConfig) -> (Self, WaveformRenderer) {
        Self::new(config, Arc::new(SystemTimeSource::new()))
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    // ---- Playback control ----

    pub fn play(&mut self) {
        if let Some(event) = self.clock.start() {
            tracing::debug!("Play from {:.3}s", event.position());
            self.broadcast(event);
        }
    }

    pub fn pause(&mut self) {
        if let Some(event) = self.clock.pause() {
            tracing::debug!("Pause at {:.3}s", event.position());
            self.broadcast(event);
        }
    }

    pub fn stop(&mut self) {
        let event = self.clock.stop();
        tracing::debug!("Stop");
        self.broadcast(event);
    }

    /// Jump to `seconds`, clamped to [0, duration] once a duration is known
    pub fn seek(&mut self, seconds: f64) {
        let duration = self.duration();
        let target = if duration > 0.0 {
            seconds.min(duration)
        } else {
            seconds
        };
        if let Some(event) = self.clock.seek(target) {
            self.broadcast(event);
        }
    }

    /// Playback rate, clamped to the configured bounds
    pub fn set_rate(&mut self, rate: f64) {
        if let Some(event) = self.clock.set_rate(rate) {
            tracing::debug!("Rate {:.2}x", event.snapshot.rate);
            self.broadcast(event);
        }
    }

    pub fn rate(&self) -> f64 {
        self.clock.rate()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.waveform.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.waveform.volume()
    }

    /// Mute the waveform while another audio source is authoritative
    pub fn set_muted(&mut self, muted: bool) {
        self.waveform.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.waveform.is_muted()
    }

    pub fn state(&self) -> PlaybackState {
        self.clock.state()
    }

    pub fn position(&self) -> f64 {
        self.clock.position()
    }

    /// Longest of the audio and the note sequence
    pub fn duration(&self) -> f64 {
        self.waveform.duration().max(last_note_end(&self.events.notes()))
    }

    // ---- Media ----

    /// Load and attach media, blocking until decoded. The transport is stopped
    /// first; on failure the previous media stays attached.
    pub fn load_media(
        &mut self,
        fetcher: &dyn MediaFetcher,
        audio_location: &str,
        notes_location: Option<&str>,
    ) -> Result<MediaInfo, MediaLoadError> {
        self.stop();
        self.pending_media = None;
        let media = load_media(fetcher, audio_location, notes_location)?;
        Ok(self.attach_media(media))
    }

    /// Start loading on a worker thread. `play()` may be called right away:
    /// the clock runs and the audio joins in at the clock position once
    /// `tick()` sees the load finish.
    pub fn load_media_in_background(
        &mut self,
        fetcher: Arc<dyn MediaFetcher>,
        audio_location: &str,
        notes_location: Option<&str>,
    ) -> Result<(), MediaLoadError> {
        self.stop();
        let pending = PendingMedia::spawn(
            fetcher,
            audio_location,
            notes_location.map(str::to_string),
        )?;
        self.pending_media = Some(pending);
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.pending_media.is_some()
    }

    /// Attach decoded media. When playing, rendering starts at the current
    /// clock position.
    pub fn attach_media(&mut self, media: LoadedMedia) -> MediaInfo {
        let info = media.info();
        self.waveform.attach(media.audio);
        self.waveform
            .resync(&self.clock.snapshot(), self.clock.now());
        self.events.set_notes(media.notes);
        self.dispatch_player_events();
        info
    }

    /// Replace the note sequence without touching the audio
    pub fn load_notes(&mut self, notes: Vec<MidiNote>) {
        self.events.set_notes(notes);
        self.dispatch_player_events();
    }

    pub fn notes(&self) -> Arc<[MidiNote]> {
        self.events.notes()
    }

    // ---- Chords ----

    /// Install an edited chord sequence. Takes effect immediately when playing.
    pub fn set_chords(&mut self, chords: Vec<Chord>) {
        self.events.set_chords(chords);
        self.dispatch_player_events();
    }

    pub fn chords(&self) -> Arc<[Chord]> {
        self.events.chords()
    }

    pub fn current_chord(&self) -> Option<&Chord> {
        self.events.current_chord()
    }

    // ---- Instrument ----

    pub fn set_output(&mut self, output: Option<Box<dyn InstrumentOutput>>) {
        self.events.set_output(output);
    }

    /// Connect the instrument output by port id or name
    pub fn connect_output(&mut self, id_or_name: &str) -> TransportResult<()> {
        let manager = MidiOutputManager::new(self.config.midi_client_name.clone());
        let output = manager.connect(id_or_name)?;
        self.set_output(Some(Box::new(output)));
        Ok(())
    }

    pub fn has_output(&self) -> bool {
        self.events.has_output()
    }

    // ---- Subscriptions ----

    /// Position updates in seconds, on every tick while playing and on every
    /// transition
    pub fn subscribe_time(&mut self, listener: impl FnMut(&f64) + Send + 'static) -> Subscription {
        Subscription {
            id: self.time_observers.subscribe(listener),
            topic: Topic::Time,
        }
    }

    pub fn subscribe_notes(
        &mut self,
        listener: impl FnMut(&NoteEvent) + Send + 'static,
    ) -> Subscription {
        Subscription {
            id: self.note_observers.subscribe(listener),
            topic: Topic::Notes,
        }
    }

    pub fn subscribe_chords(
        &mut self,
        listener: impl FnMut(&ChordChange) + Send + 'static,
    ) -> Subscription {
        Subscription {
            id: self.chord_observers.subscribe(listener),
            topic: Topic::Chords,
        }
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        match subscription.topic {
            Topic::Time => self.time_observers.unsubscribe(subscription.id),
            Topic::Notes => self.note_observers.unsubscribe(subscription.id),
            Topic::Chords => self.chord_observers.unsubscribe(subscription.id),
        }
    }

    // ---- Driving ----

    /// Advance the timeline. Call every `tick_interval`.
    pub fn tick(&mut self) {
        self.poll_pending_media();
        self.waveform.reclaim();

        // Cues due by now fire before an end-of-media stop cancels them
        self.dispatch_player_events();

        let duration = self.duration();
        if self.state().is_playing() && duration > 0.0 && self.position() >= duration {
            tracing::info!("End of media reached");
            self.stop();
            return;
        }

        if self.state().is_playing() {
            let now = self.clock.now();
            self.waveform.correct_drift(&self.clock.snapshot(), now);
            let position = self.clock.position();
            self.time_observers.emit(&position);
        }
    }

    fn poll_pending_media(&mut self) {
        let Some(result) = self.pending_media.as_mut().and_then(PendingMedia::try_take) else {
            return;
        };
        self.pending_media = None;
        match result {
            Ok(media) => {
                let info = self.attach_media(media);
                tracing::info!("Background load finished ({:.2}s)", info.duration);
            }
            Err(e) => tracing::error!("Background load failed: {}", e),
        }
    }

    fn broadcast(&mut self, event: ClockEvent) {
        let listeners: [&mut dyn ClockListener; 2] = [&mut self.waveform, &mut self.events];
        for listener in listeners {
            listener.on_clock_event(&event);
        }
        self.dispatch_player_events();
        self.time_observers.emit(&event.position());
    }

    fn dispatch_player_events(&mut self) {
        for event in self.events.drain() {
            match event {
                PlayerEvent::NoteOn(note) => self.note_observers.emit(&NoteEvent::On(note)),
                PlayerEvent::NoteOff(note) => self.note_observers.emit(&NoteEvent::Off(note)),
                PlayerEvent::ChordChange(chord) => self.chord_observers.emit(&chord),
            }
        }
    }
}
