//! # ATS Transcriber - Main Application Entry Point
//!
//! HTTP service that turns uploaded interview audio into text.
//!
//! ## Application Architecture:
//! - **audio**: WAV container parsing and sample decoding
//! - **transcription**: lazily-loaded Whisper engine and the upload → text façade
//! - **config**: configuration (TOML file + environment variables)
//! - **state**: shared application state and metrics
//! - **health**: health and metrics endpoints
//! - **middleware**: request logging and metrics collection
//! - **handlers**: transcription, warm-up and config endpoints
//! - **error**: transcription error taxonomy and HTTP mapping

mod audio;        // WAV parsing and PCM decoding (audio/ directory)
mod config;       // Configuration management (config.rs)
mod device;       // CPU/GPU selection (device.rs)
mod error;        // Error types (error.rs)
mod handlers;     // HTTP request handlers (handlers/ directory)
mod health;       // Health check endpoints (health.rs)
mod middleware;   // Custom middleware (middleware/ directory)
mod state;        // Application state management (state.rs)
mod transcription; // Speech model and façade (transcription/ directory)

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Creates shared application state**; the speech model is not loaded yet
/// 4. **Optionally starts warming up the model** in the background
/// 5. **Serves HTTP** until SIGINT/SIGTERM, then shuts down gracefully
#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{} (whisper model: {}, device: {})",
        config.server.host, config.server.port, config.models.whisper_model, config.models.device
    );

    let app_state = AppState::new(config.clone())?;
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    if config.models.preload {
        let transcriber = app_state.transcriber.clone();
        actix_web::rt::spawn(async move {
            // Requests that arrive mid-load join this load instead of starting another
            if let Err(e) = transcriber.warm_up().await {
                warn!("Model preload failed, will retry on first request: {}", e);
            }
        });
    }

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/transcribe", web::post().to(handlers::transcribe_audio))
                    .route("/models/whisper/warmup", web::post().to(handlers::warm_up_model)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing.
///
/// `RUST_LOG` controls verbosity; defaults to `ats_transcriber=debug,actix_web=info`.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ats_transcriber=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve when SIGINT (Ctrl+C) or, on Unix, SIGTERM arrives.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
