// Standard MIDI File import
// Converts tick-based note events into MidiNotes in seconds, honoring the
// file's tempo map (tempo changes may live in any track).

use std::collections::{HashMap, VecDeque};

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::MediaLoadError;
use crate::sequencer::note::{Hand, MidiNote};

/// 120 BPM, the SMF default when no tempo event is present
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    seconds_per_tick: f64,
}

/// Tick to seconds conversion for one file
#[derive(Debug, Clone)]
struct TempoMap {
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn from_smf(smf: &Smf) -> Self {
        match smf.header.timing {
            Timing::Metrical(tpb) => {
                let ticks_per_beat = tpb.as_int().max(1) as f64;

                let mut changes: Vec<(u64, u32)> = Vec::new();
                for track in &smf.tracks {
                    let mut tick = 0u64;
                    for event in track {
                        tick += event.delta.as_int() as u64;
                        if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                            changes.push((tick, tempo.as_int()));
                        }
                    }
                }
                // Stable sort keeps the later event for equal ticks last
                changes.sort_by_key(|(tick, _)| *tick);

                let per_tick = |us: u32| us as f64 / 1_000_000.0 / ticks_per_beat;
                let mut segments = vec![TempoSegment {
                    tick: 0,
                    seconds: 0.0,
                    seconds_per_tick: per_tick(DEFAULT_TEMPO_US),
                }];
                for (tick, us) in changes {
                    let seconds = Self::seconds_in(&segments, tick);
                    match segments.last_mut() {
                        Some(last) if last.tick == tick => last.seconds_per_tick = per_tick(us),
                        _ => segments.push(TempoSegment {
                            tick,
                            seconds,
                            seconds_per_tick: per_tick(us),
                        }),
                    }
                }
                Self { segments }
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = (fps.as_f32() as f64 * subframes.max(1) as f64).max(1.0);
                Self {
                    segments: vec![TempoSegment {
                        tick: 0,
                        seconds: 0.0,
                        seconds_per_tick: 1.0 / ticks_per_second,
                    }],
                }
            }
        }
    }

    fn seconds_in(segments: &[TempoSegment], tick: u64) -> f64 {
        let index = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
        match segments.get(index) {
            Some(segment) => {
                segment.seconds + (tick - segment.tick.min(tick)) as f64 * segment.seconds_per_tick
            }
            None => 0.0,
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        Self::seconds_in(&self.segments, tick)
    }
}

/// Parse a Standard MIDI File into notes sorted by start time.
///
/// Note-on/note-off pairs are matched per channel and key in FIFO order.
/// Notes still held at the end of their track are dropped. When the file
/// has exactly two tracks containing notes, the first is taken as the right
/// hand and the second as the left hand.
pub fn parse_midi_notes(bytes: &[u8]) -> Result<Vec<MidiNote>, MediaLoadError> {
    let smf = Smf::parse(bytes).map_err(|e| MediaLoadError::MidiParse(e.to_string()))?;
    let tempo = TempoMap::from_smf(&smf);

    let mut per_track: Vec<Vec<MidiNote>> = Vec::new();
    for track in &smf.tracks {
        let mut notes = Vec::new();
        let mut pending: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
        let mut tick = 0u64;

        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let channel = channel.as_int();

            let (key, on_velocity) = match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    (key.as_int(), Some(vel.as_int()))
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    (key.as_int(), None)
                }
                _ => continue,
            };

            match on_velocity {
                Some(vel) => pending
                    .entry((channel, key))
                    .or_default()
                    .push_back((tick, vel)),
                None => {
                    let Some((start_tick, vel)) =
                        pending.get_mut(&(channel, key)).and_then(VecDeque::pop_front)
                    else {
                        continue;
                    };
                    let start = tempo.seconds(start_tick);
                    let duration = tempo.seconds(tick) - start;
                    if duration <= 0.0 {
                        tracing::debug!("Skipping zero-length note {} at tick {}", key, start_tick);
                        continue;
                    }
                    notes.push(MidiNote::new(
                        start_tick,
                        key,
                        start,
                        duration,
                        vel as f32 / 127.0,
                    ));
                }
            }
        }

        let dangling: usize = pending.values().map(VecDeque::len).sum();
        if dangling > 0 {
            tracing::debug!("Dropped {} unterminated notes", dangling);
        }
        if !notes.is_empty() {
            per_track.push(notes);
        }
    }

    if let [right, left] = per_track.as_mut_slice() {
        right.iter_mut().for_each(|n| n.hand = Some(Hand::Right));
        left.iter_mut().for_each(|n| n.hand = Some(Hand::Left));
    }

    let mut notes: Vec<MidiNote> = per_track.into_iter().flatten().collect();
    notes.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then(a.pitch.cmp(&b.pitch))
    });
    Ok(notes)
}
