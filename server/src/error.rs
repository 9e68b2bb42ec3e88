use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::{SharedError, SynthesisError};

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("TTS error: {0}")]
    Synthesis(SharedError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<SharedError> for ApiError {
    fn from(err: SharedError) -> Self {
        ApiError::Synthesis(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Synthesis(e) if matches!(**e, SynthesisError::NotConfigured) => {
                StatusCode::NOT_IMPLEMENTED
            }
            ApiError::Synthesis(_) | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            ApiError::InvalidInput(msg) => msg.clone(),
            ApiError::Synthesis(e) => {
                if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
                    tracing::error!("TTS error: {}", e);
                }
                e.to_string()
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg.clone()
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
