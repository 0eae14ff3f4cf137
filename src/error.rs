use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error taxonomy for the dispatcher. Variants map 1:1 onto the outcomes a
/// caller of the request surface or a channel worker can observe; the
/// distinction between `AdapterTransient` and `AdapterPermanent` drives the
/// retry-vs-dead-letter decision in the worker pool (§4.5).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("recipient missing for channel: {0}")]
    RecipientMissing(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("template render failed: {0}")]
    TemplateRender(String),

    #[error("channel adapter reported a transient failure: {0}")]
    AdapterTransient(String),

    #[error("channel adapter reported a permanent failure: {0}")]
    AdapterPermanent(String),

    #[error("notification store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("channel work queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("malformed event: {0}")]
    EventMalformed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether a worker should requeue with backoff (`true`) or move the
    /// notification straight to the dead letter state (`false`).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::AdapterTransient(_) | AppError::StoreUnavailable(_) | AppError::QueueUnavailable(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg.clone()),
            AppError::RecipientMissing(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "RECIPIENT_MISSING", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::TemplateRender(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "TEMPLATE_RENDER_FAILED", msg.clone())
            }
            AppError::AdapterTransient(msg) => (StatusCode::BAD_GATEWAY, "ADAPTER_TRANSIENT", msg.clone()),
            AppError::AdapterPermanent(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ADAPTER_PERMANENT", msg.clone())
            }
            AppError::StoreUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", msg.clone())
            }
            AppError::QueueUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_UNAVAILABLE", msg.clone())
            }
            AppError::EventMalformed(msg) => (StatusCode::BAD_REQUEST, "EVENT_MALFORMED", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "notification store unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
