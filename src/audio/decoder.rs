//! # Sample Decoding
//!
//! Turns raw payload bytes into the normalized `f32` samples the ASR model expects.
//!
//! ## Decoding Rules (selected by bits-per-sample):
//! - **16**: little-endian signed integers, scaled by `1 / 32768` into [-1.0, 1.0]
//! - **32**: little-endian IEEE-754 floats, passed through unscaled
//! - **anything else**: reported as unsupported, never guessed at
//!
//! Trailing bytes that do not fill a whole sample are dropped.
//! Channels are not deinterleaved: a stereo payload decodes to one flat sequence.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Scale factor for 16-bit PCM.
const PCM16_SCALE: f32 = 32768.0;

/// Outcome of decoding a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeResult {
    /// Normalized samples, one per complete sample group in the payload
    Samples(Vec<f32>),

    /// The payload's bit depth has no decoding rule
    Unsupported { bits_per_sample: u16 },
}

impl DecodeResult {
    /// Convert into a `Result`, turning the unsupported variant into its bit depth.
    pub fn into_samples(self) -> Result<Vec<f32>, u16> {
        match self {
            DecodeResult::Samples(samples) => Ok(samples),
            DecodeResult::Unsupported { bits_per_sample } => Err(bits_per_sample),
        }
    }
}

/// Decode a payload according to its declared bit depth.
pub fn decode(payload: &[u8], bits_per_sample: u16) -> DecodeResult {
    match bits_per_sample {
        16 => DecodeResult::Samples(decode_pcm16(payload)),
        32 => DecodeResult::Samples(decode_f32(payload)),
        other => DecodeResult::Unsupported {
            bits_per_sample: other,
        },
    }
}

/// Decode a headerless buffer as 16-bit little-endian PCM.
///
/// Used for anything that does not carry a RIFF/WAVE signature.
pub fn decode_raw_pcm(buffer: &[u8]) -> Vec<f32> {
    decode_pcm16(buffer)
}

fn decode_pcm16(payload: &[u8]) -> Vec<f32> {
    let mut cursor = Cursor::new(payload);
    let mut samples = Vec::with_capacity(payload.len() / 2);

    // read_i16 fails on a lone trailing byte, which ends the loop
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / PCM16_SCALE);
    }

    samples
}

fn decode_f32(payload: &[u8]) -> Vec<f32> {
    let mut cursor = Cursor::new(payload);
    let mut samples = Vec::with_capacity(payload.len() / 4);

    while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
        samples.push(sample);
    }

    samples
}

/// Quantize normalized samples into 16-bit little-endian PCM.
///
/// Inverse of the 16-bit decoding rule; out-of-range input is clamped.
#[cfg(test)]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * PCM16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32);
        bytes.extend_from_slice(&(scaled as i16).to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{test_support::wav_bytes, wav};

    #[test]
    fn test_pcm16_normalization() {
        let mut payload = Vec::new();
        for s in [0i16, 16384, -16384, i16::MAX, i16::MIN] {
            payload.extend_from_slice(&s.to_le_bytes());
        }

        let samples = decode(&payload, 16).into_samples().unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -0.5, 32767.0 / 32768.0, -1.0]);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_pcm16_drops_trailing_byte() {
        let payload = [0x00, 0x40, 0x00, 0xC0, 0x7F];
        let samples = decode(&payload, 16).into_samples().unwrap();
        assert_eq!(samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_f32_passthrough() {
        let values = [0.25f32, -0.75, 1.5, f32::MIN_POSITIVE];
        let mut payload = Vec::new();
        for v in values {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        payload.extend_from_slice(&[0xAA, 0xBB]);

        let samples = decode(&payload, 32).into_samples().unwrap();
        // Stored floats come back unscaled, even outside [-1, 1]
        assert_eq!(samples, values.to_vec());
    }

    #[test]
    fn test_unsupported_bit_depths() {
        for bits in [0u16, 8, 24, 64] {
            assert_eq!(
                decode(&[0u8; 12], bits),
                DecodeResult::Unsupported { bits_per_sample: bits }
            );
        }
        assert_eq!(decode(&[], 24).into_samples(), Err(24));
    }

    #[test]
    fn test_raw_pcm_uses_whole_buffer() {
        let buffer = b"not a wav file!";
        let samples = decode_raw_pcm(buffer);
        assert_eq!(samples.len(), buffer.len() / 2);
        assert_eq!(samples[0], i16::from_le_bytes([b'n', b'o']) as f32 / 32768.0);
    }

    #[test]
    fn test_wav_sample_count_matches_data_length() {
        let payload: Vec<u8> = (0..2000u32).map(|i| (i * 37 % 251) as u8).collect();
        let bytes = wav_bytes(1, 1, 16_000, 16, &payload);

        let layout = wav::parse(&bytes).unwrap().unwrap();
        let samples = decode(layout.data.slice(&bytes), layout.format.bits_per_sample)
            .into_samples()
            .unwrap();

        assert_eq!(samples.len(), layout.data.length / 2);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_sine_round_trip_within_quantization() {
        let sine: Vec<f32> = (0..1600)
            .map(|i| 0.8 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
            .collect();
        let bytes = wav_bytes(1, 1, 16_000, 16, &encode_pcm16(&sine));

        let layout = wav::parse(&bytes).unwrap().unwrap();
        let decoded = decode(layout.data.slice(&bytes), 16).into_samples().unwrap();

        assert_eq!(decoded.len(), sine.len());
        for (original, restored) in sine.iter().zip(decoded.iter()) {
            assert!(
                (original - restored).abs() <= 1.0 / 32768.0,
                "{} vs {}",
                original,
                restored
            );
        }
    }

    #[test]
    fn test_encode_clamps() {
        let bytes = encode_pcm16(&[2.0, -2.0]);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MIN);
    }
}
