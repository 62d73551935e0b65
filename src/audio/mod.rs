// Audio module - Decoding, waveform rendering and the cpal backend

pub mod decoder;
pub mod dsp_utils;
pub mod output;
pub mod parameters;
pub mod waveform;

pub use decoder::{DecodedAudio, decode_audio};
pub use output::{AudioDeviceInfo, AudioOutput, list_output_devices};
pub use waveform::{RenderCommand, WaveformPlayer, WaveformRenderer};
