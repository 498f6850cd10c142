//! # Whisper Model
//!
//! The concrete speech recognizer behind the transcription engine, built on Candle-rs.
//!
//! ## Loading Process:
//! 1. Download config, tokenizer and safetensors weights from HuggingFace (cached locally)
//! 2. Build the mel filter bank for the checkpoint's mel bin count
//! 3. Memory-map the weights and construct the model on the selected device
//!
//! ## Inference:
//! Samples are converted to a log-mel spectrogram and processed in 30-second windows,
//! each decoded greedily until the end-of-text token. Inference is CPU/GPU bound and
//! runs on tokio's blocking pool so it never stalls the async executor.

use crate::device::{device_label, DevicePreference};
use crate::transcription::engine::{ModelLoader, SpeechRecognizer};
use crate::transcription::mel::mel_filter_bank;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokenizers::Tokenizer;

/// Available Whisper checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    TinyEn,
    Base,
    BaseEn,
    Small,
    SmallEn,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::TinyEn => "openai/whisper-tiny.en",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::BaseEn => "openai/whisper-base.en",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::SmallEn => "openai/whisper-small.en",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// English-only checkpoints have no language tokens.
    pub fn is_multilingual(&self) -> bool {
        !matches!(self, ModelSize::TinyEn | ModelSize::BaseEn | ModelSize::SmallEn)
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "tiny.en" => Ok(ModelSize::TinyEn),
            "base" => Ok(ModelSize::Base),
            "base.en" => Ok(ModelSize::BaseEn),
            "small" => Ok(ModelSize::Small),
            "small.en" => Ok(ModelSize::SmallEn),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::TinyEn => "tiny.en",
            ModelSize::Base => "base",
            ModelSize::BaseEn => "base.en",
            ModelSize::Small => "small",
            ModelSize::SmallEn => "small.en",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Local paths of a downloaded checkpoint.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// Special token ids resolved from the tokenizer once at load time.
struct SpecialTokens {
    sot: u32,
    eot: u32,
    transcribe: u32,
    no_timestamps: u32,
    language: Option<u32>,
    /// Every `<|xx|>` language token; non-empty only when the language is auto-detected
    language_candidates: Vec<u32>,
}

/// Ids of the language tokens (`<|en|>`, `<|haw|>`, ...) in a multilingual vocabulary.
fn language_token_ids(tokenizer: &Tokenizer) -> Vec<u32> {
    let mut ids: Vec<u32> = tokenizer
        .get_vocab(true)
        .into_iter()
        .filter(|(token, _)| {
            token
                .strip_prefix("<|")
                .and_then(|t| t.strip_suffix("|>"))
                .map_or(false, |code| {
                    (2..=3).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_lowercase())
                })
        })
        .map(|(_, id)| id)
        .collect();
    ids.sort_unstable();
    ids
}

fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("tokenizer has no id for {}", token))
}

/// A loaded Whisper model ready for inference.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    tokens: SpecialTokens,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Download the checkpoint files for `size` through the HuggingFace hub cache.
    ///
    /// Honors `HF_TOKEN` and `HF_HUB_CACHE` / `HF_HOME` like the hub's own clients.
    async fn download(size: ModelSize) -> Result<ModelFiles> {
        use hf_hub::api::tokio::ApiBuilder;

        let mut builder = ApiBuilder::new()
            .with_progress(false)
            .with_token(std::env::var("HF_TOKEN").ok());

        if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
            builder = builder.with_cache_dir(cache_dir.into());
        } else if let Ok(hf_home) = std::env::var("HF_HOME") {
            builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
        }

        let api = builder.build().context("failed to initialize HuggingFace API client")?;
        let repo = api.model(size.repo_name().to_string());

        tracing::info!("Fetching Whisper files from {}", size.repo_name());
        let config = repo
            .get("config.json")
            .await
            .with_context(|| format!("failed to download config.json from {}", size.repo_name()))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .with_context(|| format!("failed to download tokenizer.json from {}", size.repo_name()))?;
        let weights = repo
            .get("model.safetensors")
            .await
            .with_context(|| format!("failed to download model.safetensors from {}", size.repo_name()))?;

        Ok(ModelFiles {
            config,
            tokenizer,
            weights,
        })
    }

    /// Build the model from downloaded files. CPU heavy; call from a blocking context.
    fn build(files: ModelFiles, multilingual: bool, language: Option<&str>, device: Device) -> Result<Self> {
        let config: Config = serde_json::from_reader(std::fs::File::open(&files.config)?)
            .context("invalid Whisper config.json")?;
        tracing::debug!("Model config: {:?}", config);

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let language = match language {
            Some(lang) => {
                let id = tokenizer.token_to_id(&format!("<|{}|>", lang));
                if id.is_none() {
                    tracing::warn!("Language '{}' has no token in this checkpoint, auto-detecting", lang);
                }
                id
            }
            None => None,
        };
        let language_candidates = if multilingual && language.is_none() {
            language_token_ids(&tokenizer)
        } else {
            Vec::new()
        };
        let tokens = SpecialTokens {
            sot: token_id(&tokenizer, m::SOT_TOKEN)?,
            eot: token_id(&tokenizer, m::EOT_TOKEN)?,
            transcribe: token_id(&tokenizer, m::TRANSCRIBE_TOKEN)?,
            no_timestamps: token_id(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?,
            language,
            language_candidates,
        };

        let mel_filters = mel_filter_bank(m::SAMPLE_RATE, m::N_FFT, config.num_mel_bins);

        // Safety: the weights file is owned by the hub cache and not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            tokens,
            mel_filters,
        })
    }

    /// Prompt prefix for every window.
    fn prompt(&self, language: Option<u32>) -> Vec<u32> {
        let mut prompt = vec![self.tokens.sot];
        if let Some(language) = language {
            prompt.push(language);
        }
        prompt.push(self.tokens.transcribe);
        prompt.push(self.tokens.no_timestamps);
        prompt
    }

    /// Pick the most likely language token from one decoder step after start-of-transcript.
    fn detect_language(&mut self, audio_features: &Tensor) -> Result<u32> {
        let input = Tensor::new(&[self.tokens.sot], &self.device)?.unsqueeze(0)?;
        let ys = self.model.decoder.forward(&input, audio_features, true)?;
        let logits = self.model.decoder.final_linear(&ys.i((..1, ..1))?)?.i(0)?.i(0)?;

        let candidates = Tensor::new(self.tokens.language_candidates.as_slice(), &self.device)?;
        let best = logits.index_select(&candidates, 0)?.argmax(0)?.to_scalar::<u32>()? as usize;
        let language = self.tokens.language_candidates[best];

        tracing::debug!(
            "Detected language {}",
            self.tokenizer.id_to_token(language).unwrap_or_default()
        );
        Ok(language)
    }

    /// Greedily decode one mel window into token ids (prompt excluded).
    ///
    /// An undetermined `language` is detected on this window and written back.
    fn decode_window(&mut self, mel: &Tensor, language: &mut Option<u32>) -> Result<Vec<u32>> {
        let audio_features = self.model.encoder.forward(mel, true)?;
        if language.is_none() && !self.tokens.language_candidates.is_empty() {
            *language = Some(self.detect_language(&audio_features)?);
        }
        let prompt = self.prompt(*language);
        let mut tokens = prompt.clone();
        let max_len = self.config.max_target_positions / 2;

        for step in 0..max_len {
            let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&input, &audio_features, step == 0)?;
            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;
            let next = logits.argmax(0)?.to_scalar::<u32>()?;

            if next == self.tokens.eot || tokens.len() >= self.config.max_target_positions {
                break;
            }
            tokens.push(next);
        }

        Ok(tokens.split_off(prompt.len()))
    }

    /// Transcribe normalized 16kHz mono samples to text.
    pub fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        let start_time = Instant::now();

        let mel = audio::pcm_to_mel(&self.config, samples, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let mel_len = mel.len();
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;
        let (_, _, content_frames) = mel.dims3()?;

        let mut segments = Vec::new();
        let mut language = self.tokens.language;
        let mut seek = 0;
        while seek < content_frames {
            let segment_size = usize::min(content_frames - seek, m::N_FRAMES);
            let window = mel.narrow(2, seek, segment_size)?;
            let tokens = self.decode_window(&window, &mut language)?;
            let text = self
                .tokenizer
                .decode(&tokens, true)
                .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;
            let text = text.trim();
            if !text.is_empty() {
                segments.push(text.to_string());
            }
            seek += segment_size;
        }

        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s",
            samples.len() as f64 / m::SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64()
        );

        Ok(segments.join(" "))
    }
}

/// Shares one `WhisperModel` between requests; inference holds the lock on a blocking thread.
pub struct WhisperRecognizer {
    model: Arc<Mutex<WhisperModel>>,
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn recognize(&self, samples: &[f32]) -> Result<String> {
        let model = Arc::clone(&self.model);
        let samples = samples.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
            model.transcribe(&samples)
        })
        .await
        .map_err(|e| anyhow!("inference task failed: {}", e))?
    }
}

/// Loads a `WhisperRecognizer` for the configured checkpoint and device.
#[derive(Debug, Clone)]
pub struct WhisperLoader {
    pub size: ModelSize,
    pub language: Option<String>,
    pub device: DevicePreference,
}

#[async_trait]
impl ModelLoader for WhisperLoader {
    async fn load(&self) -> Result<Arc<dyn SpeechRecognizer>> {
        tracing::info!("Loading Whisper {} model...", self.size);
        let start_time = Instant::now();

        let files = WhisperModel::download(self.size).await?;

        let multilingual = self.size.is_multilingual();
        let language = if multilingual { self.language.clone() } else { None };
        let preference = self.device;
        let model = tokio::task::spawn_blocking(move || {
            let device = preference.resolve();
            tracing::info!("Building model on {}", device_label(&device));
            WhisperModel::build(files, multilingual, language.as_deref(), device)
        })
        .await
        .map_err(|e| anyhow!("model build task failed: {}", e))??;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            self.size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Arc::new(WhisperRecognizer {
            model: Arc::new(Mutex::new(model)),
        }))
    }

    fn describe(&self) -> String {
        format!("whisper-{}", self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("medium".parse::<ModelSize>().unwrap(), ModelSize::Medium);
        assert_eq!("TINY.EN".parse::<ModelSize>().unwrap(), ModelSize::TinyEn);
        assert!("huge".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_display_round_trips() {
        for size in [ModelSize::Tiny, ModelSize::BaseEn, ModelSize::Large] {
            assert_eq!(size.to_string().parse::<ModelSize>().unwrap(), size);
        }
    }

    #[test]
    fn test_language_token_ids() {
        let json = r#"{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": null,
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": {
                    "<unk>": 0,
                    "<|en|>": 1,
                    "<|haw|>": 2,
                    "<|transcribe|>": 3,
                    "<|EN|>": 4,
                    "hello": 5,
                    "<|de|>": 6
                },
                "unk_token": "<unk>"
            }
        }"#;
        let tokenizer: Tokenizer = json.parse().unwrap();
        assert_eq!(language_token_ids(&tokenizer), vec![1, 2, 6]);
    }

    #[test]
    fn test_english_only_checkpoints() {
        assert!(!ModelSize::BaseEn.is_multilingual());
        assert!(ModelSize::Base.is_multilingual());
        assert_eq!(ModelSize::SmallEn.repo_name(), "openai/whisper-small.en");
    }
}
