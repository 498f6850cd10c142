//! # Error Handling
//!
//! Defines the transcription error taxonomy and how each error becomes an HTTP response.
//!
//! ## Error Categories:
//! - **Input errors**: the request body is unusable before any parsing (empty, too large)
//! - **Format errors**: the container or sample encoding cannot be decoded
//! - **Model errors**: the speech model failed to load or to run
//!
//! Every category is recoverable: the request fails, the process and the loaded
//! model stay usable for the next request.
//!
//! ## JSON Response Format:
//! All errors use the same body as a failed transcription:
//! ```json
//! { "success": false, "error": "unsupported bit depth: 24" }
//! ```

use crate::audio::WavError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Broad category of a transcription failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Format,
    Model,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::Format => "format",
            ErrorKind::Model => "model",
        }
    }
}

/// Everything that can go wrong between receiving an upload and returning text.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscribeError {
    /// The buffer is empty
    InvalidBuffer,

    /// The upload exceeded the configured size limit
    PayloadTooLarge { limit: usize },

    /// Reading the request body failed
    Payload(String),

    /// The RIFF/WAVE container could not be parsed
    Wav(WavError),

    /// The container declares a sample width with no decoding rule
    UnsupportedBitDepth(u16),

    /// Loading or running the speech model failed
    Model(String),
}

impl TranscribeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscribeError::InvalidBuffer
            | TranscribeError::PayloadTooLarge { .. }
            | TranscribeError::Payload(_) => ErrorKind::Input,
            TranscribeError::Wav(_) | TranscribeError::UnsupportedBitDepth(_) => ErrorKind::Format,
            TranscribeError::Model(_) => ErrorKind::Model,
        }
    }
}

impl fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscribeError::InvalidBuffer => write!(f, "invalid audio buffer"),
            TranscribeError::PayloadTooLarge { limit } => {
                write!(f, "audio upload exceeds limit of {} bytes", limit)
            }
            TranscribeError::Payload(msg) => write!(f, "failed to read audio upload: {}", msg),
            TranscribeError::Wav(err) => write!(f, "{}", err),
            TranscribeError::UnsupportedBitDepth(bits) => write!(f, "unsupported bit depth: {}", bits),
            TranscribeError::Model(msg) => write!(f, "transcription failed: {}", msg),
        }
    }
}

impl std::error::Error for TranscribeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TranscribeError::Wav(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WavError> for TranscribeError {
    fn from(err: WavError) -> Self {
        TranscribeError::Wav(err)
    }
}

/// Input and format failures are 400, oversized uploads 413, model failures 503.
impl ResponseError for TranscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            TranscribeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => match self.kind() {
                ErrorKind::Input | ErrorKind::Format => StatusCode::BAD_REQUEST,
                ErrorKind::Model => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(TranscribeError::InvalidBuffer.to_string(), "invalid audio buffer");
        assert_eq!(
            TranscribeError::UnsupportedBitDepth(24).to_string(),
            "unsupported bit depth: 24"
        );
        assert_eq!(
            TranscribeError::from(WavError::NoDataChunk).to_string(),
            "no data chunk found"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TranscribeError::InvalidBuffer.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            TranscribeError::UnsupportedBitDepth(8).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            TranscribeError::PayloadTooLarge { limit: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            TranscribeError::Model("boom".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(TranscribeError::Payload("eof".into()).kind(), ErrorKind::Input);
        assert_eq!(TranscribeError::Wav(WavError::NoDataChunk).kind(), ErrorKind::Format);
        assert_eq!(TranscribeError::Model("x".into()).kind().as_str(), "model");
    }
}
