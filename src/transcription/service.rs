//! # Transcription Service
//!
//! The single entry point the HTTP layer calls: raw upload bytes in, a
//! `TranscriptionResult` out. Nothing fails past this boundary; every error is
//! folded into the result.
//!
//! ## Pipeline:
//! 1. Reject an empty buffer before touching the parser or the model
//! 2. Sniff the container: RIFF/WAVE is parsed, anything else is raw 16-bit PCM
//! 3. Decode the payload by bit depth
//! 4. Load the model if this is the first request, then run recognition

use crate::audio::{decoder, wav};
use crate::error::TranscribeError;
use crate::transcription::engine::{EngineState, TranscriptionEngine};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one transcription request.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionResult {
    Success { text: String },
    Failure { error: TranscribeError },
}

impl TranscriptionResult {
    pub fn error(&self) -> Option<&TranscribeError> {
        match self {
            TranscriptionResult::Success { .. } => None,
            TranscriptionResult::Failure { error } => Some(error),
        }
    }
}

impl From<Result<String, TranscribeError>> for TranscriptionResult {
    fn from(result: Result<String, TranscribeError>) -> Self {
        match result {
            Ok(text) => TranscriptionResult::Success { text },
            Err(error) => TranscriptionResult::Failure { error },
        }
    }
}

/// Serializes to `{"success":true,"data":{"transcription":..}}` or `{"success":false,"error":..}`.
impl Serialize for TranscriptionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        struct Data<'a> {
            transcription: &'a str,
        }

        let mut state = serializer.serialize_struct("TranscriptionResult", 2)?;
        match self {
            TranscriptionResult::Success { text } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", &Data { transcription: text })?;
            }
            TranscriptionResult::Failure { error } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", &error.to_string())?;
            }
        }
        state.end()
    }
}

/// Decoded audio plus a note of where it came from, for logging.
struct DecodedAudio {
    samples: Vec<f32>,
    container: &'static str,
    sample_rate: u32,
    channels: u16,
}

/// Turn an upload into normalized samples.
fn decode_upload(buffer: &[u8]) -> Result<DecodedAudio, TranscribeError> {
    if buffer.is_empty() {
        return Err(TranscribeError::InvalidBuffer);
    }

    match wav::parse(buffer)? {
        Some(layout) => {
            if !layout.format_declared {
                tracing::warn!("WAV data chunk precedes fmt chunk, assuming 16kHz mono 16-bit");
            }
            let bits = layout.format.bits_per_sample;
            let samples = decoder::decode(layout.data.slice(buffer), bits)
                .into_samples()
                .map_err(TranscribeError::UnsupportedBitDepth)?;

            Ok(DecodedAudio {
                samples,
                container: "wav",
                sample_rate: layout.format.sample_rate,
                channels: layout.format.channels,
            })
        }
        None => Ok(DecodedAudio {
            samples: decoder::decode_raw_pcm(buffer),
            container: "raw_pcm16",
            sample_rate: 16_000,
            channels: 1,
        }),
    }
}

/// Façade over decoding and the shared engine.
pub struct TranscriptionService {
    engine: Arc<TranscriptionEngine>,
}

impl TranscriptionService {
    pub fn new(engine: Arc<TranscriptionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn model_name(&self) -> String {
        self.engine.model_name()
    }

    /// Loader invocations so far, including failed ones.
    pub fn load_attempts(&self) -> usize {
        self.engine.load_count()
    }

    /// Load the model now instead of on the first request.
    pub async fn warm_up(&self) -> Result<(), TranscribeError> {
        self.engine
            .ensure_loaded()
            .await
            .map(|_| ())
            .map_err(|e| TranscribeError::Model(format!("{:#}", e)))
    }

    /// Transcribe an uploaded buffer. Never panics on malformed input and never errors.
    pub async fn transcribe(&self, buffer: &[u8]) -> TranscriptionResult {
        let start_time = Instant::now();
        let result = TranscriptionResult::from(self.run(buffer).await);

        match &result {
            TranscriptionResult::Success { text } => tracing::info!(
                bytes = buffer.len(),
                chars = text.len(),
                duration_ms = start_time.elapsed().as_millis() as u64,
                "Transcription completed"
            ),
            TranscriptionResult::Failure { error } => tracing::warn!(
                bytes = buffer.len(),
                kind = error.kind().as_str(),
                error = %error,
                "Transcription failed"
            ),
        }

        result
    }

    async fn run(&self, buffer: &[u8]) -> Result<String, TranscribeError> {
        let audio = decode_upload(buffer)?;
        tracing::debug!(
            container = audio.container,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            samples = audio.samples.len(),
            "Decoded audio upload"
        );

        self.engine
            .infer(&audio.samples)
            .await
            .map_err(|e| TranscribeError::Model(format!("{:#}", e)))
    }
}
