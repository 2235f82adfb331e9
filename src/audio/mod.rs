//! Decoding of synthesized speech payloads
//!
//! The speech capability returns mono 16-bit little-endian PCM at 24 kHz,
//! base64 encoded. Decoding turns that into normalized per-channel samples
//! ready for an output device.

#[cfg(feature = "playback")]
mod device;
pub mod playback;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use thiserror::Error;

#[cfg(feature = "playback")]
pub use device::DeviceOutput;
pub use playback::AudioPlayer;

/// Sample rate of synthesized speech
pub const SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized speech
pub const CHANNELS: usize = 1;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("PCM payload of {len} bytes is not aligned to {channels} channel(s) of 16-bit samples")]
    Format { len: usize, channels: usize },

    #[cfg(feature = "playback")]
    #[error("Audio output unavailable: {0}")]
    Output(String),
}

/// Decoded PCM, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Frames per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }
}

/// Standard base64 to raw bytes
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, AudioError> {
    Ok(B64.decode(payload.trim())?)
}

/// Reinterpret little-endian i16 PCM as normalized, deinterleaved samples
pub fn pcm16_to_audio_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: usize,
) -> Result<AudioBuffer, AudioError> {
    if channel_count == 0 || bytes.len() % (2 * channel_count) != 0 {
        return Err(AudioError::Format {
            len: bytes.len(),
            channels: channel_count,
        });
    }

    let frames = bytes.len() / 2 / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        channels[i % channel_count].push(sample as f32 / 32768.0);
    }

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}

/// Full decode of a speech payload at the fixed speech format
pub fn decode_speech(payload: &str) -> Result<AudioBuffer, AudioError> {
    let bytes = decode_base64(payload)?;
    pcm16_to_audio_buffer(&bytes, SAMPLE_RATE, CHANNELS)
}
