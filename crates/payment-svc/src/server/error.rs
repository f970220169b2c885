//! Mapping of internal errors onto HTTP responses.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use tracing::{error, warn};

use crate::payment::ValidationError;
use crate::rotation::RotationError;
use crate::store::{PersistenceError, StoreError};

/// Handler error: a [`ServiceError`] rendered as an [`ErrorResponse`] body.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }
        let message = match &self.0 {
            ServiceError::BadRequest(m)
            | ServiceError::NotFound(m)
            | ServiceError::Conflict(m)
            | ServiceError::CryptoFailure(m)
            | ServiceError::Unavailable(m)
            | ServiceError::Internal(m) => m.clone(),
        };
        (status, Json(ErrorResponse::new(self.0.code(), message))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self(ServiceError::BadRequest(e.to_string()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        // The rejection text can quote the body; keep only its category.
        warn!(status = %e.status(), "rejected request body");
        Self(ServiceError::BadRequest("request body is not a valid user".into()))
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        Self(match e {
            PersistenceError::Duplicate(_) | PersistenceError::Conflict(_) => {
                ServiceError::Conflict(e.to_string())
            }
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Codec(e) => Self(ServiceError::CryptoFailure(format!(
                "record {} could not be decrypted",
                e.record
            ))),
            StoreError::Persistence(e) => e.into(),
        }
    }
}

impl From<RotationError> for ApiError {
    fn from(e: RotationError) -> Self {
        Self(ServiceError::Internal(e.to_string()))
    }
}
