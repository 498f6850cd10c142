//! # Transcription Module
//!
//! Speech-to-text for uploaded audio, using Whisper models via the Candle-rs framework.
//!
//! ## Key Components:
//! - **Service** (`service`): the façade the HTTP layer calls; never fails past its boundary
//! - **Engine** (`engine`): lazily loads the one shared model, at most once
//! - **Model** (`model`): Whisper download, construction and greedy decoding
//! - **Mel** (`mel`): filter bank for the log-mel front end
//!
//! ## Whisper Model Sizes:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, good balance for development
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good technical vocabulary
//! - **large**: ~1550MB, best accuracy but slowest

pub mod engine;      // Lazy, single-flight model ownership
pub mod mel;         // Mel filter bank
pub mod model;       // Whisper model loading and inference
pub mod service;     // Upload → text façade

pub use engine::{EngineState, TranscriptionEngine};
pub use model::{ModelSize, WhisperLoader};
pub use service::{TranscriptionResult, TranscriptionService};
