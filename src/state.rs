//! # Application State Management
//!
//! Shared state handed to every HTTP request handler.
//!
//! ## What lives here:
//! - **Configuration**: read-only after startup, so a plain `Arc` is enough
//! - **Metrics**: updated by every request, behind `Arc<RwLock<..>>`
//! - **Transcription service**: owns the lazily-loaded model; its
//!   engine coordinates the first load, so no lock is needed here
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: Multiple ownership (every actix worker holds a clone of the state)
//! - **RwLock**: Many readers or one writer at a time
//! - Lock poisoning is ignored: counters stay meaningful even if a holder panicked

use crate::config::AppConfig;
use crate::error::TranscribeError;
use crate::transcription::{TranscriptionEngine, TranscriptionService};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration (immutable at runtime)
    pub config: Arc<AppConfig>,

    /// Performance metrics, updated by the middleware and the transcription handler
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Upload → text façade shared by all workers
    pub transcriber: Arc<TranscriptionService>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Transcriptions that returned text
    pub transcriptions_succeeded: u64,

    /// Transcriptions that returned a failure result, keyed by error kind
    pub transcriptions_failed: HashMap<&'static str, u64>,

    /// Bytes of audio accepted by the transcription endpoint
    pub audio_bytes_received: u64,

    /// Key: endpoint name (e.g., "POST /api/v1/transcribe")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Build state with a Whisper engine for the configured checkpoint.
    ///
    /// The model is not loaded here; see `TranscriptionService::warm_up`.
    pub fn new(config: AppConfig) -> Result<Self> {
        let engine = TranscriptionEngine::new(config.whisper_loader()?);
        Ok(Self::with_engine(config, engine))
    }

    /// Build state around an already-constructed engine.
    pub fn with_engine(config: AppConfig, engine: TranscriptionEngine) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            transcriber: Arc::new(TranscriptionService::new(Arc::new(engine))),
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    /// Increment the total error counter (4xx and 5xx responses).
    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Record the outcome of one transcription request.
    pub fn record_transcription(&self, bytes: usize, error: Option<&TranscribeError>) {
        let mut metrics = self.metrics_write();
        metrics.audio_bytes_received += bytes as u64;
        match error {
            None => metrics.transcriptions_succeeded += 1,
            Some(e) => *metrics.transcriptions_failed.entry(e.kind().as_str()).or_default() += 1,
        }
    }

    /// Get a snapshot of current metrics so no lock is held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn transcriptions_failed_total(&self) -> u64 {
        self.transcriptions_failed.values().sum()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
