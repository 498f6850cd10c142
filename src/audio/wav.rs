//! # WAV Container Parsing
//!
//! Recognizes RIFF/WAVE containers and walks their chunk list to find the
//! format parameters and the byte range of the audio payload.
//!
//! ## Layout:
//! ```text
//! offset 0   "RIFF"  <u32 riff size>  "WAVE"
//! offset 12  <4-byte id> <u32 size> <size bytes of body>   (repeated)
//! ```
//!
//! ## Parsing Rules:
//! - Only the signature decides whether a buffer is a WAV file (no extension or MIME sniffing)
//! - Chunks are walked in order; the first `data` chunk ends the scan
//! - A `fmt ` chunk seen before `data` supplies the format, otherwise defaults apply
//! - Every chunk body is bounds-checked before it is read
//!
//! ## Known Limitation:
//! Scanning stops at `data`, so a `fmt ` chunk stored *after* the payload is never
//! consulted and the defaults (mono, 16kHz, 16-bit) are used instead.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Size of the `RIFF....WAVE` preamble.
const RIFF_HEADER_LEN: usize = 12;

/// Size of a chunk header (4-byte id + 4-byte little-endian size).
const CHUNK_HEADER_LEN: usize = 8;

/// Minimum body size of a PCM `fmt ` chunk.
const FMT_CHUNK_MIN_LEN: usize = 16;

/// Format parameters read from the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    /// 1 = integer PCM, 3 = IEEE float, anything else is recorded but not interpreted
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl Default for WavFormat {
    /// Format assumed when no `fmt ` chunk precedes the payload.
    fn default() -> Self {
        Self {
            audio_format: 1,
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
        }
    }
}

/// Byte range of the audio payload inside the original buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSpan {
    pub offset: usize,
    pub length: usize,
}

impl DataSpan {
    /// Borrow the payload bytes out of the buffer this span was parsed from.
    pub fn slice<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        &buffer[self.offset..self.offset + self.length]
    }
}

/// Result of a successful container parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub format: WavFormat,
    pub data: DataSpan,
    /// False when the format came from defaults rather than a `fmt ` chunk
    pub format_declared: bool,
}

/// A single chunk header, positioned inside the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: [u8; 4],
    pub size: usize,
    /// Offset of the first body byte
    pub body_offset: usize,
    /// Offset of the next chunk header (`body_offset + size`)
    pub next_offset: usize,
}

impl ChunkHeader {
    pub fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }
}

/// Reasons a buffer carrying the RIFF/WAVE signature could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WavError {
    /// The chunk list ended without a `data` chunk
    NoDataChunk,

    /// A chunk declared a body that runs past the end of the buffer
    ChunkOverrun {
        id: String,
        offset: usize,
        size: usize,
        buffer_len: usize,
    },

    /// The `fmt ` chunk is too short to hold the PCM fields
    MalformedFmt { size: usize },
}

impl fmt::Display for WavError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WavError::NoDataChunk => write!(f, "no data chunk found"),
            WavError::ChunkOverrun { id, offset, size, buffer_len } => write!(
                f,
                "chunk '{}' at offset {} declares {} bytes, overruns buffer of {} bytes",
                id, offset, size, buffer_len
            ),
            WavError::MalformedFmt { size } => {
                write!(f, "malformed fmt chunk: {} bytes (need at least {})", size, FMT_CHUNK_MIN_LEN)
            }
        }
    }
}

impl std::error::Error for WavError {}

/// Check for the `RIFF` / `WAVE` signature.
pub fn is_wav(buffer: &[u8]) -> bool {
    buffer.len() >= RIFF_HEADER_LEN && &buffer[0..4] == b"RIFF" && &buffer[8..12] == b"WAVE"
}

/// Read the chunk header starting at `offset`.
///
/// ## Returns:
/// - **Ok(None)**: fewer than 8 bytes remain, the chunk list is exhausted
/// - **Ok(Some(header))**: header read and its body lies entirely inside the buffer
/// - **Err(ChunkOverrun)**: the declared body would run past the end of the buffer
pub fn read_chunk_header(buffer: &[u8], offset: usize) -> Result<Option<ChunkHeader>, WavError> {
    let remaining = buffer.len().saturating_sub(offset);
    if remaining < CHUNK_HEADER_LEN {
        return Ok(None);
    }

    let mut id = [0u8; 4];
    id.copy_from_slice(&buffer[offset..offset + 4]);
    let size = LittleEndian::read_u32(&buffer[offset + 4..offset + CHUNK_HEADER_LEN]) as usize;
    let body_offset = offset + CHUNK_HEADER_LEN;

    // checked_add keeps a hostile u32 size from wrapping on 32-bit targets
    let next_offset = body_offset
        .checked_add(size)
        .filter(|end| *end <= buffer.len())
        .ok_or_else(|| WavError::ChunkOverrun {
            id: String::from_utf8_lossy(&id).into_owned(),
            offset,
            size,
            buffer_len: buffer.len(),
        })?;

    Ok(Some(ChunkHeader {
        id,
        size,
        body_offset,
        next_offset,
    }))
}

/// Parse the body of a `fmt ` chunk.
fn parse_fmt(body: &[u8]) -> Result<WavFormat, WavError> {
    if body.len() < FMT_CHUNK_MIN_LEN {
        return Err(WavError::MalformedFmt { size: body.len() });
    }

    // Offsets 8 (byte rate) and 12 (block align) are not needed for decoding
    Ok(WavFormat {
        audio_format: LittleEndian::read_u16(&body[0..2]),
        channels: LittleEndian::read_u16(&body[2..4]),
        sample_rate: LittleEndian::read_u32(&body[4..8]),
        bits_per_sample: LittleEndian::read_u16(&body[14..16]),
    })
}

/// Parse a buffer as a WAV container.
///
/// ## Returns:
/// - **Ok(None)**: the buffer does not carry the RIFF/WAVE signature
/// - **Ok(Some(layout))**: format and payload span of the first `data` chunk
/// - **Err(WavError)**: the signature is present but the chunk list is unusable
pub fn parse(buffer: &[u8]) -> Result<Option<WavLayout>, WavError> {
    if !is_wav(buffer) {
        return Ok(None);
    }

    let mut format: Option<WavFormat> = None;
    let mut offset = RIFF_HEADER_LEN;

    while let Some(chunk) = read_chunk_header(buffer, offset)? {
        match &chunk.id {
            b"fmt " => {
                format = Some(parse_fmt(&buffer[chunk.body_offset..chunk.next_offset])?);
            }
            b"data" => {
                return Ok(Some(WavLayout {
                    format: format.unwrap_or_default(),
                    data: DataSpan {
                        offset: chunk.body_offset,
                        length: chunk.size,
                    },
                    format_declared: format.is_some(),
                }));
            }
            _ => {
                tracing::trace!("Skipping '{}' chunk ({} bytes)", chunk.id_str(), chunk.size);
            }
        }
        offset = chunk.next_offset;
    }

    Err(WavError::NoDataChunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_support::{chunk, riff, wav_bytes};

    #[test]
    fn test_non_riff_buffer_is_not_wav() {
        assert_eq!(parse(b"hello world, not audio"), Ok(None));
        assert_eq!(parse(&[0u8; 4]), Ok(None));
        // RIFF without WAVE (e.g. AVI)
        assert_eq!(parse(b"RIFF\x04\x00\x00\x00AVI "), Ok(None));
    }

    #[test]
    fn test_parses_fmt_and_data() {
        let payload = [1u8, 0, 2, 0, 3, 0];
        let bytes = wav_bytes(1, 2, 44_100, 16, &payload);

        let layout = parse(&bytes).unwrap().unwrap();
        assert_eq!(layout.format.audio_format, 1);
        assert_eq!(layout.format.channels, 2);
        assert_eq!(layout.format.sample_rate, 44_100);
        assert_eq!(layout.format.bits_per_sample, 16);
        assert!(layout.format_declared);
        assert_eq!(layout.data, DataSpan { offset: 44, length: 6 });
        assert_eq!(layout.data.slice(&bytes), &payload);
    }

    #[test]
    fn test_unknown_chunks_are_skipped() {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&3u16.to_le_bytes());
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&16_000u32.to_le_bytes());
        fmt.extend_from_slice(&64_000u32.to_le_bytes());
        fmt.extend_from_slice(&4u16.to_le_bytes());
        fmt.extend_from_slice(&32u16.to_le_bytes());

        let bytes = riff(&[
            chunk(b"LIST", b"INFOISFT\x00\x00"),
            chunk(b"fmt ", &fmt),
            chunk(b"fact", &[0, 0, 0, 0]),
            chunk(b"data", &[0u8; 8]),
        ]);

        let layout = parse(&bytes).unwrap().unwrap();
        assert_eq!(layout.format.audio_format, 3);
        assert_eq!(layout.format.bits_per_sample, 32);
        assert_eq!(layout.data.length, 8);
    }

    #[test]
    fn test_missing_data_chunk() {
        let bytes = riff(&[chunk(b"fmt ", &[0u8; 16]), chunk(b"LIST", &[0u8; 4])]);
        assert_eq!(parse(&bytes), Err(WavError::NoDataChunk));

        // Signature only
        let bytes = riff(&[]);
        assert_eq!(parse(&bytes), Err(WavError::NoDataChunk));
    }

    #[test]
    fn test_data_before_fmt_uses_defaults() {
        let bytes = riff(&[chunk(b"data", &[0u8; 4]), chunk(b"fmt ", &[0u8; 16])]);

        let layout = parse(&bytes).unwrap().unwrap();
        assert_eq!(layout.format, WavFormat::default());
        assert!(!layout.format_declared);
    }

    #[test]
    fn test_chunk_size_past_end_is_an_error() {
        let mut bytes = riff(&[chunk(b"LIST", &[0u8; 4])]);
        // Inflate the LIST size far beyond the buffer
        bytes[16..20].copy_from_slice(&u32::MAX.to_le_bytes());

        match parse(&bytes) {
            Err(WavError::ChunkOverrun { id, offset, .. }) => {
                assert_eq!(id, "LIST");
                assert_eq!(offset, 12);
            }
            other => panic!("expected overrun, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_data_chunk_is_an_error() {
        let mut bytes = wav_bytes(1, 1, 16_000, 16, &[0u8; 10]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(parse(&bytes), Err(WavError::ChunkOverrun { .. })));
    }

    #[test]
    fn test_short_fmt_chunk() {
        let bytes = riff(&[chunk(b"fmt ", &[0u8; 8]), chunk(b"data", &[0u8; 2])]);
        assert_eq!(parse(&bytes), Err(WavError::MalformedFmt { size: 8 }));
    }

    #[test]
    fn test_read_chunk_header_at_end() {
        let bytes = riff(&[]);
        assert_eq!(read_chunk_header(&bytes, 12), Ok(None));
        // Partial header is treated as exhaustion
        let mut bytes = riff(&[]);
        bytes.extend_from_slice(b"dat");
        assert_eq!(read_chunk_header(&bytes, 12), Ok(None));
    }

    #[test]
    fn test_error_messages() {
        assert!(WavError::NoDataChunk.to_string().contains("no data chunk"));
        let overrun = WavError::ChunkOverrun {
            id: "data".to_string(),
            offset: 36,
            size: 100,
            buffer_len: 50,
        };
        assert!(overrun.to_string().contains("overruns buffer"));
    }
}
