//! # Transcription REST API Handlers
//!
//! ## Available Endpoints:
//! - `POST /transcribe` - Raw audio body (WAV or headerless 16-bit PCM) → text
//! - `POST /models/whisper/warmup` - Load the speech model ahead of the first request
//!
//! The request's Content-Type and any filename are ignored; the format is
//! determined from the bytes alone.

use crate::error::TranscribeError;
use crate::state::AppState;
use crate::transcription::TranscriptionResult;
use actix_web::{web, HttpResponse, ResponseError};
use futures_util::stream::StreamExt;
use serde_json::json;

/// Collect the request body, enforcing the configured upload limit.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut, TranscribeError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| TranscribeError::Payload(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(TranscribeError::PayloadTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Transcribe an uploaded audio buffer.
///
/// ## Endpoint: `POST /api/v1/transcribe`
///
/// ## Response:
/// ```json
/// { "success": true, "data": { "transcription": "thanks for joining the interview" } }
/// ```
/// or, with a 400/413/503 status:
/// ```json
/// { "success": false, "error": "no data chunk found" }
/// ```
pub async fn transcribe_audio(state: web::Data<AppState>, payload: web::Payload) -> HttpResponse {
    let limit = state.get_config().audio.max_upload_bytes;

    let body = match read_body(payload, limit).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected audio upload");
            state.record_transcription(0, Some(&e));
            return e.error_response();
        }
    };

    let result = state.transcriber.transcribe(&body).await;
    state.record_transcription(body.len(), result.error());

    match &result {
        TranscriptionResult::Success { .. } => HttpResponse::Ok().json(&result),
        TranscriptionResult::Failure { error } => HttpResponse::build(error.status_code()).json(&result),
    }
}

/// Load the speech model now. Joins an in-flight load if one is running.
///
/// ## Endpoint: `POST /api/v1/models/whisper/warmup`
pub async fn warm_up_model(state: web::Data<AppState>) -> Result<HttpResponse, TranscribeError> {
    state.transcriber.warm_up().await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "model": state.transcriber.model_name(),
            "state": state.transcriber.engine_state(),
        }
    })))
}
