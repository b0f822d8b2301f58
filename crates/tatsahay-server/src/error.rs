use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tatsahay_core::{AuthError, MediaError};
use tatsahay_shared::ValidationError;
use tatsahay_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Auth(AuthError::Unauthenticated) => StatusCode::UNAUTHORIZED,
            ServerError::Auth(AuthError::SessionLoading) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Media(MediaError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Media(MediaError::UnsupportedType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServerError::Media(MediaError::Empty) => StatusCode::BAD_REQUEST,
            ServerError::Media(MediaError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Media(_) => StatusCode::BAD_GATEWAY,
            ServerError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            ServerError::Store(e) if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = serde_json::json!({
            "error": message,
        });
        if let ServerError::Validation(e) = &self {
            body["field"] = serde_json::Value::from(e.field());
        }

        (status, axum::Json(body)).into_response()
    }
}
