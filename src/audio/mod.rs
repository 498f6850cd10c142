//! # Audio Input Module
//!
//! Converts an uploaded byte buffer into normalized samples for the transcription engine.
//!
//! ## Key Components:
//! - **WAV parser** (`wav`): RIFF/WAVE signature check and chunk walking
//! - **Sample decoder** (`decoder`): bit-depth specific decoding and normalization
//!
//! ## Accepted Input:
//! - WAV files with 16-bit integer or 32-bit float samples
//! - Anything else is treated as headerless 16-bit little-endian PCM
//!
//! No resampling or downmixing happens here; the model expects 16kHz mono and
//! callers are responsible for sending it.

pub mod decoder;   // Bit-depth specific sample decoding
pub mod wav;       // RIFF/WAVE container parsing

pub use wav::WavError;

/// Builders for synthetic WAV buffers used across the test suites.
#[cfg(test)]
pub(crate) mod test_support {
    /// Encode one chunk: id, little-endian size, body.
    pub fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + body.len());
        bytes.extend_from_slice(id);
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    /// Wrap pre-encoded chunks in a `RIFF....WAVE` preamble.
    pub fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body_len: usize = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(12 + body_len);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&((4 + body_len) as u32).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        for c in chunks {
            bytes.extend_from_slice(c);
        }
        bytes
    }

    /// Canonical 44-byte-header WAV: `fmt ` followed by `data`.
    pub fn wav_bytes(
        audio_format: u16,
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate * block_align as u32;

        let mut fmt = Vec::with_capacity(16);
        fmt.extend_from_slice(&audio_format.to_le_bytes());
        fmt.extend_from_slice(&channels.to_le_bytes());
        fmt.extend_from_slice(&sample_rate.to_le_bytes());
        fmt.extend_from_slice(&byte_rate.to_le_bytes());
        fmt.extend_from_slice(&block_align.to_le_bytes());
        fmt.extend_from_slice(&bits_per_sample.to_le_bytes());

        riff(&[chunk(b"fmt ", &fmt), chunk(b"data", payload)])
    }
}
