// Audio output - cpal stream driving the waveform renderer
//
// # Format Support
//
// The device's preferred sample format is detected with `sample_format()` and
// the matching stream type is built (F32, I16 or U16). The renderer always
// works in f32 and converts while writing the output buffer.
//
// # Stream Limitations
//
// On macOS (CoreAudio) the Stream is neither Send nor Sync, so an AudioOutput
// must stay on the thread that created it.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};

use crate::audio::waveform::WaveformRenderer;
use crate::error::{TransportError, TransportResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// List all output devices of the default host
pub fn list_output_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let Ok(devices) = host.output_devices() else {
        return Vec::new();
    };

    devices
        .enumerate()
        .filter_map(|(index, device)| {
            let name = device.name().ok()?;
            Some(AudioDeviceInfo {
                id: format!("audio_out_{}", index),
                is_default: name == default_name,
                name,
            })
        })
        .collect()
}

/// A running output stream. Dropping it stops playback.
pub struct AudioOutput {
    _stream: Stream,
    device_name: String,
    sample_rate: u32,
    channels: usize,
}

impl AudioOutput {
    /// Open the default output device and start rendering
    pub fn start(renderer: WaveformRenderer) -> TransportResult<Self> {
        Self::start_on(None, renderer)
    }

    /// Open the named output device (default device when `None`)
    pub fn start_on(device_name: Option<&str>, mut renderer: WaveformRenderer) -> TransportResult<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(wanted) => host
                .output_devices()
                .map_err(|e| TransportError::AudioOutput(e.to_string()))?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| {
                    TransportError::AudioOutput(format!("Audio device '{}' not found", wanted))
                })?,
            None => host
                .default_output_device()
                .ok_or_else(|| TransportError::AudioOutput("No audio device found".to_string()))?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device
            .default_output_config()
            .map_err(|e| TransportError::AudioOutput(format!("Configuration error: {}", e)))?;
        let sample_format = supported_config.sample_format();
        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels() as usize;
        let config: StreamConfig = supported_config.into();

        renderer.set_output_sample_rate(sample_rate);

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, channels, renderer),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, channels, renderer),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, channels, renderer),
            other => {
                return Err(TransportError::AudioOutput(format!(
                    "Unsupported sample format: {:?}. Supported formats: F32, I16, U16",
                    other
                )));
            }
        }?;

        stream
            .play()
            .map_err(|e| TransportError::AudioOutput(format!("Failed to start stream: {}", e)))?;

        tracing::info!(
            "Audio output started on '{}': {} Hz, {} channels, {:?}",
            device_name,
            sample_rate,
            channels,
            sample_format
        );

        Ok(Self {
            _stream: stream,
            device_name,
            sample_rate,
            channels,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        channels: usize,
        mut renderer: WaveformRenderer,
    ) -> TransportResult<Stream>
    where
        T: SizedSample + FromSample<f32> + Send + 'static,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // No allocations, no I/O, no blocking locks
                    renderer.render(data, channels);
                },
                move |err| {
                    // Runs outside the audio callback
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| TransportError::AudioOutput(format!("Stream creation failed: {}", e)))
    }
}
