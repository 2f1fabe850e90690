//! API error type and the JSON response envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use phonebook::{AuthError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

/// Response body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data,
        }
    }
}

/// Boundary errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Request lacks the session cookie an endpoint needs
    #[error("Session cookie missing")]
    MissingSession,

    /// No usable `Authorization: Bearer` header
    #[error("Please provide Authorization header")]
    MissingBearer,

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => match e.kind() {
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::MissingSession | ApiError::MissingBearer => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Auth(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "Request failed");
                }
                e.client_message()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(Envelope::new(status, message, serde_json::Value::Null)),
        )
            .into_response()
    }
}
