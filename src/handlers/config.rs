use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Report the effective configuration (after file and environment overrides).
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config,
        "resolved": {
            "language": config.language(),
            "model_repo": config.model_size().ok().map(|size| size.repo_name()),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::stub_state;
    use crate::transcription::engine::test_support::CountingLoader;
    use actix_web::{test, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_get_config() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(stub_state(CountingLoader::new())))
                .route("/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/config").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["server"]["port"], 8080);
        assert_eq!(body["config"]["models"]["whisper_model"], "base");
        assert_eq!(body["resolved"]["model_repo"], "openai/whisper-base");
        assert_eq!(body["resolved"]["language"], "en");
    }
}
