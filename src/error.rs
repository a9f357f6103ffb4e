use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Model '{model_id}' not found in {models_dir}. Files present: [{listing}]")]
    ModelNotFound {
        model_id: String,
        models_dir: String,
        listing: String,
    },

    #[error("Engine not available: {0}")]
    EngineUnavailable(String),

    #[error("TTS generation failed: {0}")]
    TtsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::ModelNotFound { .. } => (StatusCode::NOT_FOUND, "MODEL_NOT_FOUND"),
            AppError::EngineUnavailable(_) => {
                (StatusCode::NOT_IMPLEMENTED, "ENGINE_UNAVAILABLE")
            }
            AppError::TtsError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TTS_ERROR"),
            AppError::IoError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            AppError::JsonError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "JSON_ERROR"),
        };

        let message = self.to_string();
        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
