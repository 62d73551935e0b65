// Clock - Virtual playback time derived from a monotonic hardware time source
//
// The clock never integrates time. It keeps an anchor (hardware time, virtual
// time) plus a rate and recomputes the position on every read, so pausing,
// seeking and rate changes can't accumulate drift.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic hardware time in seconds
pub trait TimeSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Production time source backed by `Instant`
#[derive(Debug, Clone)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Settable time source for deterministic tests and offline rendering.
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    seconds: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: f64) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Relaxed))
    }
}

/// Playback state (exactly one active at a time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Paused,
    Playing,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PlaybackState::Stopped)
    }
}

/// Everything needed to derive the virtual position at any hardware time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSnapshot {
    pub state: PlaybackState,
    pub anchor_hardware_time: f64,
    pub anchor_virtual_time: f64,
    pub rate: f64,
}

impl ClockSnapshot {
    pub fn stopped() -> Self {
        Self {
            state: PlaybackState::Stopped,
            anchor_hardware_time: 0.0,
            anchor_virtual_time: 0.0,
            rate: 1.0,
        }
    }

    /// Virtual position at hardware time `now`
    pub fn position_at(&self, now: f64) -> f64 {
        match self.state {
            PlaybackState::Playing => {
                self.anchor_virtual_time + (now - self.anchor_hardware_time) * self.rate
            }
            _ => self.anchor_virtual_time,
        }
    }

    /// Hardware time at which `virtual_time` will be reached.
    /// `None` unless playing, since a frozen clock never gets there.
    pub fn hardware_time_for(&self, virtual_time: f64) -> Option<f64> {
        if !self.state.is_playing() {
            return None;
        }
        Some(self.anchor_hardware_time + (virtual_time - self.anchor_virtual_time) / self.rate)
    }
}

impl Default for ClockSnapshot {
    fn default() -> Self {
        Self::stopped()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEventKind {
    Start,
    Pause,
    Stop,
    /// `resumed` is true when the clock was playing and keeps playing
    /// from the new position.
    Seek { resumed: bool },
    RateChange,
}

/// A state transition, carrying the snapshot that is valid after it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockEvent {
    pub kind: ClockEventKind,
    pub snapshot: ClockSnapshot,
    /// Hardware time of the transition
    pub at: f64,
}

impl ClockEvent {
    /// Virtual position right after the transition
    pub fn position(&self) -> f64 {
        self.snapshot.position_at(self.at)
    }
}

/// Consumers of clock transitions (waveform renderer, event player).
/// The clock itself knows nothing about audio or MIDI.
pub trait ClockListener {
    fn on_clock_event(&mut self, event: &ClockEvent);
}

/// Transport clock
pub struct Clock {
    source: Arc<dyn TimeSource>,
    snapshot: ClockSnapshot,
    min_rate: f64,
    max_rate: f64,
}

impl Clock {
    pub const DEFAULT_MIN_RATE: f64 = 0.25;
    pub const DEFAULT_MAX_RATE: f64 = 2.0;

    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self::with_rate_bounds(source, Self::DEFAULT_MIN_RATE, Self::DEFAULT_MAX_RATE)
    }

    pub fn with_rate_bounds(source: Arc<dyn TimeSource>, min_rate: f64, max_rate: f64) -> Self {
        Self {
            source,
            snapshot: ClockSnapshot::stopped(),
            min_rate,
            max_rate,
        }
    }

    /// Current hardware time
    pub fn now(&self) -> f64 {
        self.source.now()
    }

    pub fn state(&self) -> PlaybackState {
        self.snapshot.state
    }

    pub fn rate(&self) -> f64 {
        self.snapshot.rate
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        self.snapshot
    }

    /// Current virtual position in seconds
    pub fn position(&self) -> f64 {
        self.snapshot.position_at(self.now())
    }

    /// Start or resume. No-op when already playing.
    pub fn start(&mut self) -> Option<ClockEvent> {
        if self.snapshot.state.is_playing() {
            return None;
        }
        let now = self.now();
        self.snapshot.anchor_hardware_time = now;
        self.snapshot.state = PlaybackState::Playing;
        Some(self.emit(ClockEventKind::Start, now))
    }

    /// Freeze the position. Only valid while playing.
    pub fn pause(&mut self) -> Option<ClockEvent> {
        if !self.snapshot.state.is_playing() {
            return None;
        }
        let now = self.now();
        self.snapshot.anchor_virtual_time = self.snapshot.position_at(now);
        self.snapshot.anchor_hardware_time = now;
        self.snapshot.state = PlaybackState::Paused;
        Some(self.emit(ClockEventKind::Pause, now))
    }

    /// Return to zero. Valid from any state and always emitted, so
    /// listeners get a chance to silence their outputs.
    pub fn stop(&mut self) -> ClockEvent {
        let now = self.now();
        self.snapshot.anchor_virtual_time = 0.0;
        self.snapshot.anchor_hardware_time = now;
        self.snapshot.state = PlaybackState::Stopped;
        self.emit(ClockEventKind::Stop, now)
    }

    /// Jump to `time` (clamped at 0). While playing this is a single
    /// re-anchoring, seen by listeners as one `Seek { resumed: true }`.
    pub fn seek(&mut self, time: f64) -> Option<ClockEvent> {
        if !time.is_finite() {
            return None;
        }
        let now = self.now();
        let resumed = self.snapshot.state.is_playing();
        self.snapshot.anchor_virtual_time = time.max(0.0);
        self.snapshot.anchor_hardware_time = now;
        Some(self.emit(ClockEventKind::Seek { resumed }, now))
    }

    /// Change the playback rate, clamped to the configured bounds.
    /// Re-anchors first so the position never jumps.
    pub fn set_rate(&mut self, rate: f64) -> Option<ClockEvent> {
        if !rate.is_finite() {
            return None;
        }
        let rate = rate.clamp(self.min_rate, self.max_rate);
        if rate == self.snapshot.rate {
            return None;
        }
        let now = self.now();
        self.snapshot.anchor_virtual_time = self.snapshot.position_at(now);
        self.snapshot.anchor_hardware_time = now;
        self.snapshot.rate = rate;
        Some(self.emit(ClockEventKind::RateChange, now))
    }

    fn emit(&self, kind: ClockEventKind, at: f64) -> ClockEvent {
        ClockEvent {
            kind,
            snapshot: self.snapshot,
            at,
        }
    }
}
