use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{HealthResponse, SpeakRequest, StatusResponse};
use crate::api::routes::AppState;
use crate::error::AppError;

const MAX_TEXT_LEN: usize = 10_000;

pub async fn speak(
    State(state): State<Arc<AppState>>,
    request: Option<Json<SpeakRequest>>,
) -> Result<Response, AppError> {
    let Some(Json(request)) = request else {
        return Err(AppError::BadRequest("Missing JSON body".into()));
    };

    // Validate input
    if request.text.is_empty() {
        return Err(AppError::BadRequest("No text provided".into()));
    }

    if request.text.len() > MAX_TEXT_LEN {
        return Err(AppError::BadRequest(
            "Text too long (max 10000 chars)".into(),
        ));
    }

    let speed = request.speed.unwrap_or(1.0);
    if !speed.is_finite() || speed <= 0.0 {
        return Err(AppError::BadRequest(
            "Speed must be a positive number".into(),
        ));
    }

    // An empty voice means no voice was requested
    let voice = request.voice.as_deref().filter(|v| !v.is_empty());

    // Generate audio
    let wav = state
        .tts
        .speak(&request.text, voice, speed, request.model_id.as_deref())?;

    // Return audio as a file download
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "audio/wav"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"speech.wav\"",
            ),
        ],
        wav,
    )
        .into_response())
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let models_dir = state.tts.models_dir().display().to_string();

    let snapshot = match state.tts.multi_speaker() {
        Some(engine) => StatusResponse {
            status: "ready".to_string(),
            models_dir,
            voices: engine.speakers(),
            device: Some("cpu".to_string()),
            model: Some(engine.model_name().to_string()),
        },
        None => StatusResponse {
            status: "ready".to_string(),
            models_dir,
            voices: vec!["system_default".to_string()],
            device: None,
            model: None,
        },
    };

    Json(snapshot)
}

pub async fn voices(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    let speakers = state
        .tts
        .multi_speaker()
        .map(|engine| engine.speakers())
        .unwrap_or_default();

    Json(speakers)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::routes::create_router;
    use crate::tts::TtsService;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn scratch_models_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "speech-gateway-test-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_app(models_dir: PathBuf) -> axum::Router {
        let state = Arc::new(AppState {
            tts: TtsService::new(models_dir, None),
        });
        create_router(state)
    }

    fn speak_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/speak")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rejects_empty_text() {
        let app = test_app(scratch_models_dir("empty-text"));
        let response = app
            .oneshot(speak_request(r#"{"text": ""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_missing_text_field() {
        let app = test_app(scratch_models_dir("missing-text"));
        let response = app.oneshot(speak_request("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_missing_body() {
        let app = test_app(scratch_models_dir("missing-body"));
        let request = Request::builder()
            .method("POST")
            .uri("/speak")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_non_positive_speed() {
        let app = test_app(scratch_models_dir("bad-speed"));
        let response = app
            .oneshot(speak_request(r#"{"text": "hi", "speed": 0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unresolved_piper_model_is_404_with_listing() {
        let dir = scratch_models_dir("no-model");
        std::fs::write(dir.join("notes.txt"), "not a model").unwrap();

        let app = test_app(dir);
        let response = app
            .oneshot(speak_request(
                r#"{"text": "hello", "model_id": "piper-en-missing"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_string(response).await;
        assert!(body.contains("piper-en-missing"));
        assert!(body.contains("notes.txt"));
    }

    #[tokio::test]
    async fn status_reports_models_dir() {
        let dir = scratch_models_dir("status");
        let app = test_app(dir.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["models_dir"], dir.display().to_string());
        assert_eq!(body["voices"][0], "system_default");
    }

    #[tokio::test]
    async fn voices_is_empty_without_multi_speaker_model() {
        let app = test_app(scratch_models_dir("voices"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/voices")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "[]");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_app(scratch_models_dir("health"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    #[ignore = "requires the platform speech command (say/espeak-ng)"]
    async fn native_speak_round_trip() {
        let app = test_app(scratch_models_dir("native"));
        let response = app
            .oneshot(speak_request(r#"{"text": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/wav"
        );

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"RIFF"));
    }
}
