//! # Transcription Engine
//!
//! Owns the one speech model the process uses and loads it lazily on first demand.
//!
//! ## Lifecycle:
//! ```text
//! Unloaded ──first request──▶ Loading ──load ok──▶ Ready
//!     ▲                          │
//!     └────────load failed───────┘
//! ```
//! - Concurrent first callers all await the single in-flight load and share its outcome
//! - Once `Ready`, the handle is never replaced
//! - A failed load leaves the engine `Unloaded`; only callers arriving afterwards retry
//!
//! ## Seams:
//! `ModelLoader` produces a `SpeechRecognizer`. Production uses the Whisper
//! implementations in `model.rs`; tests plug in counting stubs.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque speech recognition capability: normalized samples in, text out.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, samples: &[f32]) -> Result<String>;
}

/// Produces the recognizer. Called at most once per successful engine lifetime.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn SpeechRecognizer>>;

    /// Short human-readable name for logs and health output.
    fn describe(&self) -> String;
}

/// Observable lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
}

type LoadResult = Result<Arc<dyn SpeechRecognizer>, Arc<anyhow::Error>>;

/// Where the engine is in its lifecycle, with the data each phase needs.
enum Slot {
    Unloaded,
    /// The one in-flight load; every caller that finds it awaits a clone
    Loading(Shared<BoxFuture<'static, LoadResult>>),
    Ready(Arc<dyn SpeechRecognizer>),
}

/// Lazily-initialized holder for the process-wide recognizer.
pub struct TranscriptionEngine {
    loader: Arc<dyn ModelLoader>,

    /// Held only to inspect or swap the phase, never across an await
    slot: Mutex<Slot>,

    /// Number of load attempts started (successful or not)
    load_attempts: AtomicUsize,
}

impl TranscriptionEngine {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            slot: Mutex::new(Slot::Unloaded),
            load_attempts: AtomicUsize::new(0),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> EngineState {
        match *self.slot() {
            Slot::Unloaded => EngineState::Unloaded,
            Slot::Loading(_) => EngineState::Loading,
            Slot::Ready(_) => EngineState::Ready,
        }
    }

    pub fn load_count(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn model_name(&self) -> String {
        self.loader.describe()
    }

    /// Start a load. Caller holds the slot lock and stores the returned future.
    fn start_load(&self) -> Shared<BoxFuture<'static, LoadResult>> {
        let loader = Arc::clone(&self.loader);
        let attempt = self.load_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        async move {
            let model = loader.describe();
            tracing::info!(model = %model, attempt, "Loading speech model");
            match loader.load().await {
                Ok(recognizer) => {
                    tracing::info!(model = %model, "Speech model ready");
                    Ok(recognizer)
                }
                Err(e) => {
                    tracing::error!(model = %model, error = %e, "Speech model failed to load");
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Return the recognizer, loading it first if this is the first call.
    ///
    /// Callers arriving during a load await that same load and all see its
    /// outcome, success or failure. After a failure the engine is `Unloaded`
    /// again and the next caller starts a fresh attempt.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn SpeechRecognizer>> {
        let load = {
            let mut slot = self.slot();
            let in_flight = match &*slot {
                Slot::Ready(recognizer) => return Ok(Arc::clone(recognizer)),
                Slot::Loading(load) => Some(load.clone()),
                Slot::Unloaded => None,
            };
            match in_flight {
                Some(load) => load,
                None => {
                    let load = self.start_load();
                    *slot = Slot::Loading(load.clone());
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut slot = self.slot();
        // Only the load that is still current may settle the slot
        if matches!(&*slot, Slot::Loading(current) if current.ptr_eq(&load)) {
            *slot = match &result {
                Ok(recognizer) => Slot::Ready(Arc::clone(recognizer)),
                Err(_) => Slot::Unloaded,
            };
        }

        result.map_err(|e| anyhow!("{:#}", e))
    }

    /// Run recognition, loading the model first if needed.
    ///
    /// Samples are passed through untouched; an empty sequence is the model's problem.
    pub async fn infer(&self, samples: &[f32]) -> Result<String> {
        let recognizer = self.ensure_loaded().await?;
        recognizer.recognize(samples).await
    }
}

/// Test doubles shared by the engine, service, and handler tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Echoes the number of samples it was given, and remembers each call.
    #[derive(Default)]
    pub struct StubRecognizer {
        pub calls: Mutex<Vec<Vec<f32>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl SpeechRecognizer for StubRecognizer {
        async fn recognize(&self, samples: &[f32]) -> Result<String> {
            self.calls.lock().unwrap().push(samples.to_vec());
            if self.fail {
                anyhow::bail!("stub inference failure");
            }
            if samples.iter().all(|s| *s == 0.0) {
                return Ok(String::new());
            }
            Ok(format!("{} samples", samples.len()))
        }
    }

    /// Counts loads; optionally sleeps to widen the race window and fails the first N loads.
    #[derive(Clone)]
    pub struct CountingLoader {
        pub loads: Arc<AtomicUsize>,
        pub delay: Duration,
        pub failures_before_success: usize,
        pub recognizer: Arc<StubRecognizer>,
    }

    impl CountingLoader {
        pub fn new() -> Self {
            Self {
                loads: Arc::new(AtomicUsize::new(0)),
                delay: Duration::from_millis(0),
                failures_before_success: 0,
                recognizer: Arc::new(StubRecognizer::default()),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn failing(mut self, times: usize) -> Self {
            self.failures_before_success = times;
            self
        }

        pub fn with_recognizer(mut self, recognizer: StubRecognizer) -> Self {
            self.recognizer = Arc::new(recognizer);
            self
        }
    }

    #[async_trait]
    impl ModelLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn SpeechRecognizer>> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if n < self.failures_before_success {
                anyhow::bail!("stub load failure #{}", n + 1);
            }
            let recognizer: Arc<dyn SpeechRecognizer> = self.recognizer.clone();
            Ok(recognizer)
        }

        fn describe(&self) -> String {
            "stub".to_string()
        }
    }
}
