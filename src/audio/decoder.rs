// Audio decoding - Whole-asset decode into an interleaved f32 buffer
//
// The asset is decoded exactly once at load time; the renderer only ever reads
// the resulting buffer, so seeking is a pointer move.

use std::io::Cursor;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::MediaLoadError;

/// A fully decoded asset. Cheap to clone: the sample data is shared.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in [-1, 1]
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub channels: usize,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    /// Sample of `channel` at `frame`, 0.0 outside the buffer
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples
            .get(frame * self.channels + channel)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Decode a complete audio file held in memory.
/// `extension` is an optional format hint (e.g. "mp3", "wav").
pub fn decode_audio(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio, MediaLoadError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MediaLoadError::Decode(format!("Unrecognized audio format: {}", e)))?;

    let mut format = detected.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(MediaLoadError::NoAudioTrack)?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaLoadError::Decode(format!("Decoder creation failed: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaLoadError::Decode(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("Skipping corrupt audio packet: {}", e);
                continue;
            }
            Err(e) => return Err(MediaLoadError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() || channels == 0 || sample_rate == 0 {
        return Err(MediaLoadError::Decode("stream contains no audio frames".to_string()));
    }

    let audio = DecodedAudio {
        samples: samples.into(),
        sample_rate,
        channels,
    };
    tracing::debug!(
        "Decoded {:.2}s of audio ({} Hz, {} channels)",
        audio.duration(),
        audio.sample_rate,
        audio.channels
    );
    Ok(audio)
}
