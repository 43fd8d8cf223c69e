use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::SourceKind;

/// /remove-bg 请求处理过程中的错误
#[derive(Debug, Error)]
pub enum RemoveBgError {
    #[error("Unsupported content type. Use multipart/form-data or application/json.")]
    UnsupportedContentType,

    #[error("No image source provided.")]
    NoImageSource,

    #[error("Error reading {kind}: {reason}")]
    InvalidSource { kind: SourceKind, reason: String },

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Payload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Segmentation model is not loaded")]
    ModelUnavailable,

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Failed to encode output image: {0}")]
    Encode(String),
}

impl RemoveBgError {
    pub fn invalid_source(kind: SourceKind, reason: impl ToString) -> Self {
        RemoveBgError::InvalidSource {
            kind,
            reason: reason.to_string(),
        }
    }
}

impl ResponseError for RemoveBgError {
    fn status_code(&self) -> StatusCode {
        match self {
            RemoveBgError::UnsupportedContentType
            | RemoveBgError::NoImageSource
            | RemoveBgError::InvalidSource { .. }
            | RemoveBgError::InvalidBody(_)
            | RemoveBgError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            RemoveBgError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RemoveBgError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RemoveBgError::Inference(_) | RemoveBgError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
