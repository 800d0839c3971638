use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use folio_core::{FolioError, StoreError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    GatewayTimeout(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::error!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Order store unavailable".to_string())
            }
            AppError::GatewayTimeout(msg) => {
                tracing::error!("Timed out: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<FolioError> for AppError {
    fn from(err: FolioError) -> Self {
        match err {
            FolioError::ValidationError(msg) => AppError::ValidationError(msg),
            FolioError::NotFound(what) => AppError::NotFoundError(what),
            FolioError::StorageError(msg) => AppError::ServiceUnavailable(msg),
            e @ FolioError::Timeout { .. } => AppError::GatewayTimeout(e.to_string()),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

/// Malformed bodies are the caller's mistake, same as a failed validation.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        FolioError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |err: FolioError| AppError::from(err).into_response().status();

        assert_eq!(status(FolioError::ValidationError("empty".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(FolioError::StorageError("down".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(FolioError::Timeout { operation: "order store write".into(), after_ms: 10 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(status(FolioError::NotFound("order".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(FolioError::consumer("dispatch", "id", "boom")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
