//! Audio frame codec
//!
//! Converts between floating-point samples and the 16-bit little-endian PCM
//! carried by the Gemini Live API, plus the base64 text encoding used to put
//! that PCM inside JSON frames. Microphone audio goes up at 16 kHz; model
//! audio comes back at 24 kHz. Both are mono.

use base64::engine::general_purpose;
use base64::Engine;

use crate::error::{RelayError, Result};

/// Sample rate of microphone audio sent upstream.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of model audio received from upstream.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// MIME type attached to every realtime input chunk.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// A block of mono PCM16 audio at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Quantize float samples into a chunk.
    pub fn from_float(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.iter().copied().map(quantize).collect(), sample_rate)
    }

    /// Decode a base64 PCM16 payload into a chunk.
    pub fn decode(text: &str, sample_rate: u32) -> Result<Self> {
        let bytes = general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|e| RelayError::MalformedAudio(format!("invalid base64: {e}")))?;

        if bytes.len() % 2 != 0 {
            return Err(RelayError::MalformedAudio(format!(
                "odd payload length ({} bytes)",
                bytes.len()
            )));
        }

        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self::new(samples, sample_rate))
    }

    /// Base64 encoding of the little-endian PCM bytes.
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        general_purpose::STANDARD.encode(bytes)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Normalized samples in [-1, 1).
    pub fn to_float(&self) -> Vec<f32> {
        self.samples.iter().copied().map(normalize).collect()
    }
}

/// Encode float samples as base64 PCM16.
///
/// Samples are clamped to [-1, 1]. Negative values scale by 32768 and positive
/// values by 32767 so that +1.0 does not overflow.
pub fn encode(samples: &[f32]) -> String {
    AudioChunk::from_float(samples, INPUT_SAMPLE_RATE).encode()
}

/// Decode base64 PCM16 into float samples normalized by 32768.
pub fn decode(text: &str) -> Result<Vec<f32>> {
    AudioChunk::decode(text, OUTPUT_SAMPLE_RATE).map(|chunk| chunk.to_float())
}

fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    // NaN survives the clamp and casts to 0
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

fn normalize(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}
