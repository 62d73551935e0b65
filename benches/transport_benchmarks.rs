use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use chordplay::audio::decoder::DecodedAudio;
use chordplay::sequencer::clock::ClockSnapshot;
use chordplay::sequencer::timeline::TimelineEditor;
use chordplay::sequencer::{PlaybackState, Scheduler, chord_at};
use chordplay::{Chord, ManualTimeSource, MidiNote, Transport, TransportConfig};
use std::sync::Arc;

fn chord_sequence(count: usize) -> Vec<Chord> {
    (0..count)
        .map(|i| Chord::new(format!("c{}", i), i as f64 * 2.0, 2.0))
        .collect()
}

/// Benchmark the render callback (runs on the audio thread)
fn bench_waveform_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("waveform_render");
    let config = TransportConfig::default();

    for buffer_size in [64usize, 256, 1024] {
        let time = ManualTimeSource::new(0.0);
        let (mut transport, mut renderer) = Transport::new(config.clone(), Arc::new(time.clone()));
        renderer.set_output_sample_rate(48000);

        let samples: Vec<f32> = (0..48000 * 2 * 60).map(|i| ((i % 200) as f32 / 100.0) - 1.0).collect();
        transport.attach_media(chordplay::media::LoadedMedia {
            audio: DecodedAudio {
                samples: samples.into(),
                sample_rate: 44100,
                channels: 2,
            },
            notes: Vec::new(),
        });
        transport.set_rate(1.25);
        transport.play();

        let mut buffer = vec![0.0f32; buffer_size * 2];
        group.bench_with_input(
            BenchmarkId::from_parameter(buffer_size),
            &buffer_size,
            |b, _| {
                b.iter(|| {
                    renderer.render(black_box(&mut buffer), 2);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark scheduling and draining a dense cue list
fn bench_scheduler(c: &mut Criterion) {
    let snapshot = ClockSnapshot {
        state: PlaybackState::Playing,
        anchor_hardware_time: 0.0,
        anchor_virtual_time: 0.0,
        rate: 1.0,
    };

    c.bench_function("scheduler_schedule_drain_1000", |b| {
        b.iter(|| {
            let mut scheduler = Scheduler::new();
            scheduler.rebase(snapshot);
            for i in 0..1000 {
                scheduler.schedule_at(i as f64 * 0.01, i);
            }
            black_box(scheduler.drain_due(10.0));
        });
    });
}

/// Benchmark a full transport tick with notes and chords loaded
fn bench_transport_tick(c: &mut Criterion) {
    let time = ManualTimeSource::new(0.0);
    let (mut transport, _renderer) = Transport::new(TransportConfig::default(), Arc::new(time.clone()));
    let notes: Vec<MidiNote> = (0..10_000)
        .map(|i| MidiNote::new(i, (48 + i % 36) as u8, i as f64 * 0.05, 0.1, 0.7))
        .collect();
    transport.load_notes(notes);
    transport.set_chords(chord_sequence(250));
    transport.play();

    c.bench_function("transport_tick", |b| {
        b.iter(|| {
            time.advance(0.001);
            transport.tick();
            if !transport.state().is_playing() {
                transport.play();
            }
        });
    });
}

/// Benchmark chord edits and lookups
fn bench_timeline(c: &mut Criterion) {
    let editor = TimelineEditor::default();
    let chords = chord_sequence(500);

    c.bench_function("timeline_apply_move", |b| {
        b.iter(|| black_box(editor.apply_move(black_box(&chords), 250, 499.0, 2.5)));
    });

    c.bench_function("chord_at_lookup", |b| {
        b.iter(|| black_box(chord_at(black_box(&chords), black_box(731.3))));
    });
}

criterion_group!(
    benches,
    bench_waveform_render,
    bench_scheduler,
    bench_transport_tick,
    bench_timeline
);
criterion_main!(benches);
