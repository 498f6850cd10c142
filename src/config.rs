//! # Configuration Management
//!
//! This module handles loading application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (set by most deployment platforms)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_MODELS__WHISPER_MODEL`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore so that field names
//! containing underscores (`whisper_model`, `max_upload_bytes`) stay intact.

use crate::device::DevicePreference;
use crate::transcription::{ModelSize, WhisperLoader};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub audio: AudioConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Speech model configuration.
///
/// ## Fields:
/// - `whisper_model`: checkpoint to load ("tiny", "base.en", "small", "medium", "large", ...)
/// - `language`: ISO 639-1 hint such as "en"; "auto" detects it per upload (English-only checkpoints ignore it)
/// - `device`: "auto", "cpu", "cuda" or "metal"
/// - `preload`: start loading the model at startup instead of on the first request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub language: String,
    pub device: String,
    pub preload: bool,
}

/// Upload handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Largest request body accepted by the transcription endpoint
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                whisper_model: "base".to_string(),
                language: "en".to_string(),
                device: "auto".to_string(),
                preload: false,
            },
            audio: AudioConfig {
                max_upload_bytes: 25 * 1024 * 1024, // ~13 minutes of 16kHz 16-bit mono
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_MODELS__WHISPER_MODEL=small.en`: Override whisper model
    /// - `APP_MODELS__PRELOAD=true`: Load the model at startup
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        self.model_size()?;

        self.models
            .device
            .parse::<DevicePreference>()
            .map_err(|e| anyhow!(e))?;

        if self.audio.max_upload_bytes == 0 {
            return Err(anyhow!("Max upload size must be greater than 0"));
        }

        Ok(())
    }

    pub fn model_size(&self) -> Result<ModelSize> {
        self.models.whisper_model.parse()
    }

    /// Language hint for the model, `None` for auto-detection.
    pub fn language(&self) -> Option<String> {
        match self.models.language.trim() {
            "" | "auto" => None,
            lang => Some(lang.to_lowercase()),
        }
    }

    /// Build the loader for the configured checkpoint.
    pub fn whisper_loader(&self) -> Result<WhisperLoader> {
        Ok(WhisperLoader {
            size: self.model_size()?,
            language: self.language(),
            device: self
                .models
                .device
                .parse::<DevicePreference>()
                .map_err(|e| anyhow!(e))?,
        })
    }
}
