//! Mapping of vault errors onto HTTP responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use strongbox_vault::{ErrorKind, VaultError};

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error kind, e.g. `key_not_found`.
    pub error: String,
    /// Human-readable message. Never contains key material or plaintext.
    pub message: String,
}

/// An error returned by a handler.
#[derive(Debug)]
pub struct ApiError(VaultError);

impl ApiError {
    /// HTTP status of the error.
    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind())
    }
}

/// HTTP status for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::KeyNotFound => StatusCode::NOT_FOUND,
        ErrorKind::DecryptionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::ConfigurationError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<VaultError> for ApiError {
    fn from(e: VaultError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(VaultError::InvalidArgument(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.0.kind();

        if status.is_server_error() {
            warn!(kind = %kind, error = %self.0, "Request failed");
        } else {
            debug!(kind = %kind, error = %self.0, "Request rejected");
        }

        let body = ErrorBody {
            error: kind.as_str().to_string(),
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
