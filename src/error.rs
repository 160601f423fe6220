use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

/// Errors surfaced by the JSON API. Everything maps onto a status code and
/// a `{"success": false, "error": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid or expired code")]
    InvalidCode,

    #[error("{reason}")]
    BotDetected { reason: String, score: f64 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Provider(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InvalidCode | ApiError::BotDetected { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Provider(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::Database(err) => {
                log::error!("Database error: {err}");
                json!({ "success": false, "error": "internal error" })
            }
            ApiError::BotDetected { reason, score } => {
                json!({ "success": false, "score": score, "error": reason })
            }
            other => json!({ "success": false, "error": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure of a single call to an external provider (SMS gateway, email API,
/// bot-score API). Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway rejected message: {0}")]
    Rejected(String),

    #[error("{0}")]
    NotConfigured(&'static str),
}
