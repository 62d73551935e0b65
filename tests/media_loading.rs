//! Media loading integration tests
//!
//! Fixtures are synthesized on the fly: WAV with hound, Standard MIDI Files
//! with midly, written into a temporary directory.

use chordplay::error::MediaLoadError;
use chordplay::{
    FileFetcher, ManualTimeSource, MediaFetcher, PlaybackState, Transport, TransportConfig,
};
use midly::num::{u4, u7, u15, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn write_wav(path: &Path, sample_rate: u32, seconds: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (sample_rate as f64 * seconds) as usize;
    for i in 0..frames {
        let phase = i as f32 / sample_rate as f32 * 440.0 * std::f32::consts::TAU;
        writer.write_sample((phase.sin() * 8000.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn midi_event(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(0),
            message,
        },
    }
}

/// One quarter note per pitch at 120 BPM (0.5s each)
fn write_midi(path: &Path, pitches: &[u8]) {
    let mut track = Vec::new();
    for &pitch in pitches {
        let key = u7::new(pitch);
        track.push(midi_event(0, MidiMessage::NoteOn { key, vel: u7::new(100) }));
        track.push(midi_event(480, MidiMessage::NoteOff { key, vel: u7::new(0) }));
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: Timing::Metrical(u15::new(480)),
        },
        tracks: vec![track],
    };
    smf.save(path).unwrap();
}

fn transport() -> Transport {
    let time = ManualTimeSource::new(0.0);
    Transport::new(TransportConfig::default(), Arc::new(time)).0
}

#[test]
fn test_load_audio_and_notes() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("song.wav"), 8000, 1.0);
    write_midi(&dir.path().join("song.mid"), &[60, 64, 67, 72]);

    let fetcher = FileFetcher::with_base_dir(dir.path());
    let mut transport = transport();
    let info = transport
        .load_media(&fetcher, "song.wav", Some("song.mid"))
        .unwrap();

    assert!((info.audio_duration - 1.0).abs() < 1e-3);
    assert_eq!(info.notes.len(), 4);
    assert!((info.notes[3].start_time - 1.5).abs() < 1e-9);
    // Notes run past the audio
    assert!((info.duration - 2.0).abs() < 1e-9);
    assert!((transport.duration() - 2.0).abs() < 1e-9);
    assert_eq!(transport.state(), PlaybackState::Stopped);
}

#[test]
fn test_file_url_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.wav");
    write_wav(&path, 4000, 0.5);

    let fetcher = FileFetcher::new();
    let bytes = fetcher
        .fetch(&format!("file://{}", path.display()))
        .unwrap();
    assert!(!bytes.is_empty());
}

#[test]
fn test_failed_load_keeps_previous_media() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("good.wav"), 8000, 1.0);
    std::fs::write(dir.path().join("bad.wav"), b"definitely not audio").unwrap();

    let fetcher = FileFetcher::with_base_dir(dir.path());
    let mut transport = transport();
    transport.load_media(&fetcher, "good.wav", None).unwrap();
    transport.play();

    let err = transport.load_media(&fetcher, "bad.wav", None).unwrap_err();
    assert!(matches!(err, MediaLoadError::Decode(_)));
    assert_eq!(transport.state(), PlaybackState::Stopped);
    assert!((transport.duration() - 1.0).abs() < 1e-3);

    let err = transport.load_media(&fetcher, "missing.wav", None).unwrap_err();
    assert!(matches!(err, MediaLoadError::Fetch { .. }));
}

#[test]
fn test_garbage_midi_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("song.wav"), 8000, 0.5);
    std::fs::write(dir.path().join("song.mid"), b"MThd garbage").unwrap();

    let fetcher = FileFetcher::with_base_dir(dir.path());
    let err = transport()
        .load_media(&fetcher, "song.wav", Some("song.mid"))
        .unwrap_err();
    assert!(matches!(err, MediaLoadError::MidiParse(_)));
}

#[test]
fn test_background_load_attaches_on_tick() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("song.wav"), 8000, 2.0);

    let fetcher: Arc<dyn MediaFetcher> = Arc::new(FileFetcher::with_base_dir(dir.path()));
    let mut transport = transport();
    transport
        .load_media_in_background(fetcher, "song.wav", None)
        .unwrap();

    // Playing before the buffer arrives is allowed
    transport.play();
    assert_eq!(transport.state(), PlaybackState::Playing);

    let deadline = Instant::now() + Duration::from_secs(10);
    while transport.is_loading() && Instant::now() < deadline {
        transport.tick();
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(!transport.is_loading());
    assert!((transport.duration() - 2.0).abs() < 1e-3);
    assert_eq!(transport.state(), PlaybackState::Playing);
}
