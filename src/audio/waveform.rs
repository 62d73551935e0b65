// Waveform player - Decoded audio rendered in lockstep with the transport clock
//
// The controller (`WaveformPlayer`) lives on the transport thread and reacts to
// clock events. The renderer (`WaveformRenderer`) lives inside the audio
// callback. They only talk through a lock-free command queue and a few atomics:
//
//   controller --RenderCommand--> renderer
//   controller --gain/mute------> renderer
//   renderer   --position/ack---> controller (drift control)
//   renderer   --DecodedAudio---> controller (replaced buffers, freed off the audio thread)

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::{FromSample, Sample};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::audio::decoder::{DecodedAudio, decode_audio};
use crate::audio::dsp_utils::{OnePoleSmoother, flush_denormals_to_zero, hard_clip};
use crate::audio::parameters::{AtomicF32, AtomicF64, AtomicFlag};
use crate::config::TransportConfig;
use crate::error::MediaLoadError;
use crate::sequencer::clock::{ClockEvent, ClockListener, ClockSnapshot};

/// Gain smoothing time constant
const GAIN_SMOOTHING_MS: f32 = 10.0;

/// Messages from the controller to the audio thread
#[derive(Debug)]
pub enum RenderCommand {
    /// Replace the rendered buffer. Rendering halts at offset 0.
    Attach(DecodedAudio),
    Detach,
    /// Render from `offset` seconds at `rate`. `generation` is echoed back
    /// once the renderer has applied it.
    Start {
        offset: f64,
        rate: f64,
        generation: u64,
    },
    /// Stop rendering and park at `offset` seconds
    Halt { offset: f64 },
}

/// Audio-thread half. Move it into the output callback.
pub struct WaveformRenderer {
    commands: HeapCons<RenderCommand>,
    retired: HeapProd<DecodedAudio>,
    audio: Option<DecodedAudio>,
    playing: bool,
    /// Fractional source frame
    cursor: f64,
    rate: f64,
    output_sample_rate: u32,
    gain: AtomicF32,
    muted: AtomicFlag,
    smoother: OnePoleSmoother,
    position: AtomicF64,
    acknowledged: Arc<AtomicU64>,
}

impl WaveformRenderer {
    /// Must be called before the first `render` on a new device
    pub fn set_output_sample_rate(&mut self, sample_rate: u32) {
        self.output_sample_rate = sample_rate.max(1);
        self.smoother = OnePoleSmoother::new(
            self.target_gain(),
            GAIN_SMOOTHING_MS,
            self.output_sample_rate as f32,
        );
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current render position in seconds
    pub fn position(&self) -> f64 {
        match &self.audio {
            Some(audio) if audio.sample_rate > 0 => self.cursor / audio.sample_rate as f64,
            _ => 0.0,
        }
    }

    fn target_gain(&self) -> f32 {
        if self.muted.get() { 0.0 } else { self.gain.get() }
    }

    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Attach(audio) => {
                self.retire_audio();
                self.audio = Some(audio);
                self.playing = false;
                self.cursor = 0.0;
            }
            RenderCommand::Detach => {
                self.retire_audio();
                self.playing = false;
                self.cursor = 0.0;
            }
            RenderCommand::Start {
                offset,
                rate,
                generation,
            } => {
                self.seek_to(offset);
                self.rate = rate;
                self.playing = true;
                self.acknowledged.store(generation, Ordering::Release);
            }
            RenderCommand::Halt { offset } => {
                self.seek_to(offset);
                self.playing = false;
            }
        }
    }

    /// Hand the current buffer back to the controller so the last reference
    /// is never released inside the callback. Only a full return queue
    /// (controller never reclaiming) drops it here.
    fn retire_audio(&mut self) {
        if let Some(old) = self.audio.take() {
            let _ = self.retired.try_push(old);
        }
    }

    fn seek_to(&mut self, offset: f64) {
        let sample_rate = self.audio.as_ref().map_or(0, |a| a.sample_rate) as f64;
        self.cursor = (offset.max(0.0) * sample_rate).max(0.0);
    }

    /// Fill an interleaved output buffer. Allocation-free, lock-free.
    pub fn render<T>(&mut self, data: &mut [T], channels: usize)
    where
        T: Sample + FromSample<f32>,
    {
        while let Some(command) = self.commands.try_pop() {
            self.apply(command);
        }

        let channels = channels.max(1);
        let target_gain = self.target_gain();

        let Some(audio) = self.audio.as_ref().filter(|_| self.playing) else {
            for frame in data.chunks_mut(channels) {
                self.smoother.process(target_gain);
                for out in frame.iter_mut() {
                    *out = Sample::from_sample::<f32>(0.0);
                }
            }
            self.publish_position();
            return;
        };

        let frames = audio.frames();
        let step = self.rate * audio.sample_rate as f64 / self.output_sample_rate as f64;

        for frame in data.chunks_mut(channels) {
            let gain = self.smoother.process(target_gain);

            if self.cursor >= frames as f64 {
                for out in frame.iter_mut() {
                    *out = Sample::from_sample::<f32>(0.0);
                }
                continue;
            }

            let index = self.cursor as usize;
            let frac = (self.cursor - index as f64) as f32;
            for (c, out) in frame.iter_mut().enumerate() {
                let source_channel = c % audio.channels;
                let a = audio.sample(index, source_channel);
                let b = if index + 1 < frames {
                    audio.sample(index + 1, source_channel)
                } else {
                    a
                };
                let sample = flush_denormals_to_zero(a + (b - a) * frac) * gain;
                *out = Sample::from_sample::<f32>(hard_clip(sample));
            }
            self.cursor += step;
        }

        if self.cursor >= frames as f64 {
            self.cursor = frames as f64;
            self.playing = false;
        }
        self.publish_position();
    }

    fn publish_position(&self) {
        if self.audio.is_some() {
            self.position.set(self.position());
        }
    }
}

/// Transport-thread half
pub struct WaveformPlayer {
    commands: HeapProd<RenderCommand>,
    retired: HeapCons<DecodedAudio>,
    audio: Option<DecodedAudio>,
    gain: AtomicF32,
    muted: AtomicFlag,
    position: AtomicF64,
    acknowledged: Arc<AtomicU64>,
    generation: u64,
    playing: bool,
    max_drift: f64,
    overflowed: bool,
}

impl WaveformPlayer {
    pub fn new(config: &TransportConfig) -> (Self, WaveformRenderer) {
        let capacity = config.render_command_capacity.max(4);
        let (producer, consumer) = HeapRb::<RenderCommand>::new(capacity).split();
        // Every retired buffer was sent as an Attach, so this never outgrows the command queue
        let (retired_producer, retired_consumer) = HeapRb::<DecodedAudio>::new(capacity).split();

        let gain = AtomicF32::new(config.initial_volume.clamp(0.0, 1.0));
        let muted = AtomicFlag::new(false);
        let position = AtomicF64::new(f64::NAN);
        let acknowledged = Arc::new(AtomicU64::new(0));

        let renderer = WaveformRenderer {
            commands: consumer,
            retired: retired_producer,
            audio: None,
            playing: false,
            cursor: 0.0,
            rate: 1.0,
            output_sample_rate: 44_100,
            gain: gain.clone(),
            muted: muted.clone(),
            smoother: OnePoleSmoother::new(gain.get(), GAIN_SMOOTHING_MS, 44_100.0),
            position: position.clone(),
            acknowledged: Arc::clone(&acknowledged),
        };

        let player = Self {
            commands: producer,
            retired: retired_consumer,
            audio: None,
            gain,
            muted,
            position,
            acknowledged,
            generation: 0,
            playing: false,
            max_drift: config.max_drift_secs,
            overflowed: false,
        };

        (player, renderer)
    }

    /// Decode `bytes` and attach the result. Returns the duration in seconds.
    /// On failure the previously attached buffer stays in place.
    pub fn load(&mut self, bytes: Vec<u8>, extension: Option<&str>) -> Result<f64, MediaLoadError> {
        let audio = decode_audio(bytes, extension)?;
        let duration = audio.duration();
        self.attach(audio);
        Ok(duration)
    }

    /// Hand an already decoded buffer to the renderer, parked at 0.
    /// Callers that are mid-playback follow up with `resync`.
    pub fn attach(&mut self, audio: DecodedAudio) {
        self.reclaim();
        self.audio = Some(audio.clone());
        self.playing = false;
        self.position.set(f64::NAN);
        self.send(RenderCommand::Attach(audio));
    }

    pub fn detach(&mut self) {
        self.reclaim();
        self.audio = None;
        self.playing = false;
        self.position.set(f64::NAN);
        self.send(RenderCommand::Detach);
    }

    /// Free buffers the renderer has replaced. Returns how many were released.
    pub fn reclaim(&mut self) -> usize {
        let mut released = 0;
        while let Some(audio) = self.retired.try_pop() {
            drop(audio);
            released += 1;
        }
        released
    }

    pub fn is_loaded(&self) -> bool {
        self.audio.is_some()
    }

    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, DecodedAudio::duration)
    }

    pub fn volume(&self) -> f32 {
        self.gain.get()
    }

    /// Gain in [0, 1], applied independently of transport state
    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.gain.set(volume);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    /// Silence output while another audio source is authoritative.
    /// Rendering keeps advancing so unmuting is seamless.
    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
    }

    /// Last position published by the renderer for the current start, if any
    pub fn rendered_position(&self) -> Option<f64> {
        if !self.playing || self.acknowledged.load(Ordering::Acquire) != self.generation {
            return None;
        }
        let position = self.position.get();
        position.is_finite().then_some(position)
    }

    /// Bring the renderer in line with `snapshot`
    pub fn resync(&mut self, snapshot: &ClockSnapshot, now: f64) {
        let offset = snapshot.position_at(now);
        if snapshot.state.is_playing() {
            self.start_at(offset, snapshot.rate);
        } else {
            self.halt_at(offset);
        }
    }

    /// Restart the renderer at the clock position when they diverge by more
    /// than the allowed drift. Returns the measured drift when corrected.
    pub fn correct_drift(&mut self, snapshot: &ClockSnapshot, now: f64) -> Option<f64> {
        let rendered = self.rendered_position()?;
        let expected = snapshot.position_at(now);
        if expected >= self.duration() {
            return None;
        }
        let drift = rendered - expected;
        if drift.abs() <= self.max_drift {
            return None;
        }
        tracing::debug!("Waveform drift {:+.3}s, resyncing at {:.3}s", drift, expected);
        self.start_at(expected, snapshot.rate);
        Some(drift)
    }

    fn start_at(&mut self, offset: f64, rate: f64) {
        self.playing = true;
        if self.audio.is_none() {
            return;
        }
        self.generation += 1;
        self.position.set(f64::NAN);
        self.send(RenderCommand::Start {
            offset,
            rate,
            generation: self.generation,
        });
    }

    fn halt_at(&mut self, offset: f64) {
        self.playing = false;
        if self.audio.is_none() {
            return;
        }
        self.send(RenderCommand::Halt { offset });
    }

    fn send(&mut self, command: RenderCommand) {
        match self.commands.try_push(command) {
            Ok(()) => self.overflowed = false,
            Err(_) => {
                if !self.overflowed {
                    tracing::warn!("Render command queue full, is the audio output running?");
                }
                self.overflowed = true;
            }
        }
    }
}

impl ClockListener for WaveformPlayer {
    /// Every transition reduces to "render from here at this rate" or
    /// "park here": stop parks at 0, pause and idle seeks park at the new
    /// position, start, resumed seeks and rate changes restart.
    fn on_clock_event(&mut self, event: &ClockEvent) {
        self.resync(&event.snapshot, event.at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::clock::{Clock, ManualTimeSource};

    fn ramp_audio(sample_rate: u32, seconds: usize) -> DecodedAudio {
        let frames = sample_rate as usize * seconds;
        let samples: Vec<f32> = (0..frames).map(|i| (i % 100) as f32 / 100.0).collect();
        DecodedAudio {
            samples: samples.into(),
            sample_rate,
            channels: 1,
        }
    }

    fn setup() -> (WaveformPlayer, WaveformRenderer, Clock, ManualTimeSource) {
        let config = TransportConfig {
            initial_volume: 1.0,
            ..TransportConfig::default()
        };
        let (mut player, mut renderer) = WaveformPlayer::new(&config);
        renderer.set_output_sample_rate(1000);
        player.attach(ramp_audio(1000, 10));
        let time = ManualTimeSource::new(0.0);
        let clock = Clock::new(Arc::new(time.clone()));
        (player, renderer, clock, time)
    }

    #[test]
    fn test_silent_until_started() {
        let (_player, mut renderer, _clock, _time) = setup();
        let mut out = vec![1.0f32; 64];
        renderer.render(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!renderer.is_playing());
    }

    #[test]
    fn test_start_renders_from_clock_position() {
        let (mut player, mut renderer, mut clock, _time) = setup();
        clock.seek(2.0);
        let event = clock.start().unwrap();
        player.on_clock_event(&event);

        let mut out = vec![0.0f32; 100];
        renderer.render(&mut out, 1);
        assert!(renderer.is_playing());
        assert!((renderer.position() - 2.1).abs() < 1e-9);
        assert_eq!(player.rendered_position(), Some(renderer.position()));
    }

    #[test]
    fn test_rate_sets_playback_step() {
        let (mut player, mut renderer, mut clock, _time) = setup();
        clock.set_rate(2.0);
        player.on_clock_event(&clock.start().unwrap());

        let mut out = vec![0.0f32; 100];
        renderer.render(&mut out, 1);
        assert!((renderer.position() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_stop_parks_at_zero() {
        let (mut player, mut renderer, mut clock, time) = setup();
        player.on_clock_event(&clock.start().unwrap());
        let mut out = vec![0.0f32; 500];
        renderer.render(&mut out, 1);

        time.advance(0.5);
        player.on_clock_event(&clock.stop());
        renderer.render(&mut out, 1);
        assert!(!renderer.is_playing());
        assert_eq!(renderer.position(), 0.0);
        assert_eq!(player.rendered_position(), None);
    }

    #[test]
    fn test_mute_outputs_silence_but_advances() {
        let (mut player, mut renderer, mut clock, _time) = setup();
        player.set_muted(true);
        renderer.set_output_sample_rate(1000);
        player.on_clock_event(&clock.start().unwrap());

        let mut out = vec![0.0f32; 200];
        renderer.render(&mut out, 1);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!((renderer.position() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_channels_wrap_for_mono_source() {
        let (mut player, mut renderer, mut clock, _time) = setup();
        player.on_clock_event(&clock.start().unwrap());

        let mut out = vec![0.0f32; 20];
        renderer.render(&mut out, 2);
        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_drift_is_corrected() {
        let (mut player, mut renderer, mut clock, time) = setup();
        player.on_clock_event(&clock.start().unwrap());
        let mut out = vec![0.0f32; 100];
        renderer.render(&mut out, 1);

        // Renderer at 0.1s, clock at 0.5s
        time.advance(0.5);
        let drift = player.correct_drift(&clock.snapshot(), clock.now());
        assert!(drift.is_some_and(|d| (d + 0.4).abs() < 1e-9));
        // Sentinel until the renderer applies the restart
        assert_eq!(player.rendered_position(), None);

        let mut short = vec![0.0f32; 50];
        renderer.render(&mut short, 1);
        assert!((renderer.position() - 0.55).abs() < 1e-9);
        assert!(player.correct_drift(&clock.snapshot(), clock.now()).is_none());
    }

    #[test]
    fn test_end_of_buffer_stops_rendering() {
        let (mut player, mut renderer, mut clock, _time) = setup();
        clock.seek(9.95);
        player.on_clock_event(&clock.start().unwrap());

        let mut out = vec![0.0f32; 200];
        renderer.render(&mut out, 1);
        assert!(!renderer.is_playing());
        assert!((renderer.position() - 10.0).abs() < 1e-9);
        assert!(out[100..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_volume_is_clamped() {
        let (player, _renderer, _clock, _time) = setup();
        player.set_volume(1.5);
        assert_eq!(player.volume(), 1.0);
        player.set_volume(f32::NAN);
        assert_eq!(player.volume(), 0.0);
    }

    #[test]
    fn test_resumed_seek_restarts_at_target() {
        let (mut player, mut renderer, mut clock, time) = setup();
        player.on_clock_event(&clock.start().unwrap());
        let mut out = vec![0.0f32; 100];
        renderer.render(&mut out, 1);

        time.advance(0.1);
        let event = clock.seek(5.0).unwrap();
        assert!(event.snapshot.state.is_playing());
        player.on_clock_event(&event);

        renderer.render(&mut out, 1);
        assert!(renderer.is_playing());
        assert!((renderer.position() - 5.1).abs() < 1e-9);
        assert_eq!(player.rendered_position(), Some(renderer.position()));
    }

    #[test]
    fn test_rate_change_restarts_at_new_rate() {
        let (mut player, mut renderer, mut clock, time) = setup();
        player.on_clock_event(&clock.start().unwrap());
        let mut out = vec![0.0f32; 100];
        renderer.render(&mut out, 1);
        assert!((renderer.position() - 0.1).abs() < 1e-9);

        time.advance(0.1);
        player.on_clock_event(&clock.set_rate(2.0).unwrap());

        renderer.render(&mut out, 1);
        assert!(renderer.is_playing());
        // 100 frames at 2x from 0.1s
        assert!((renderer.position() - 0.3).abs() < 1e-9);
        assert_eq!(player.rendered_position(), Some(renderer.position()));
    }

    #[test]
    fn test_replaced_buffer_is_released_by_controller() {
        let (mut player, mut renderer, _clock, _time) = setup();
        let first = ramp_audio(1000, 1);
        let samples = Arc::clone(&first.samples);
        player.attach(first);
        let mut out = vec![0.0f32; 16];
        renderer.render(&mut out, 1);

        player.attach(ramp_audio(1000, 2));
        renderer.render(&mut out, 1);

        // Ours plus the one parked in the return queue
        assert_eq!(Arc::strong_count(&samples), 2);
        assert_eq!(player.reclaim(), 1);
        assert_eq!(Arc::strong_count(&samples), 1);
    }

    #[test]
    fn test_detach_returns_buffer() {
        let (mut player, mut renderer, _clock, _time) = setup();
        let mut out = vec![0.0f32; 16];
        renderer.render(&mut out, 1);
        player.detach();
        renderer.render(&mut out, 1);
        assert_eq!(player.reclaim(), 1);
        assert!(!player.is_loaded());
    }
}
