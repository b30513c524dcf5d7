//! Boundary error type and its HTTP mapping.

use axum::http::StatusCode;
use carevault_auth::AuthError;
use carevault_core::audit::AuditError;
use carevault_core::{CoreError, ErrorKind};
use carevault_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by [`ClinicalService`](crate::service::ClinicalService)
/// and the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("Bad request: {message}")]
    BadRequest { message: String },
    #[error("Missing identity header: {header}")]
    MissingIdentity { header: &'static str },
    #[error("Operation cancelled")]
    Cancelled,
}

impl ApiError {
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing_identity(header: &'static str) -> Self {
        Self::MissingIdentity { header }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(e) => e.kind(),
            Self::Auth(e) => e.kind(),
            Self::Core(e) => e.kind(),
            Self::Audit(AuditError::Storage(_)) => ErrorKind::StorageFailure,
            Self::Audit(AuditError::Cancelled) | Self::Cancelled => ErrorKind::Cancelled,
            Self::BadRequest { .. } => ErrorKind::Validation,
            Self::MissingIdentity { .. } => ErrorKind::PermissionDenied,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }

    pub fn status(&self) -> StatusCode {
        if matches!(self, Self::MissingIdentity { .. }) {
            return StatusCode::UNAUTHORIZED;
        }
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Concurrency => StatusCode::PRECONDITION_FAILED,
            ErrorKind::Gone => StatusCode::GONE,
            ErrorKind::PermissionDenied | ErrorKind::TenantMismatch => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Message safe to show the caller. Storage internals stay in the logs.
    pub fn public_message(&self) -> String {
        if self.is_server_error() {
            "The request could not be completed because of an internal storage failure".into()
        } else {
            self.to_string()
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::bad_request("x"), StatusCode::BAD_REQUEST),
            (StorageError::already_exists("Patient", "p").into(), StatusCode::CONFLICT),
            (StorageError::version_conflict(1, 2).into(), StatusCode::PRECONDITION_FAILED),
            (StorageError::gone("Patient", "p", 3).into(), StatusCode::GONE),
            (AuthError::forbidden("no-active-grant", "x").into(), StatusCode::FORBIDDEN),
            (AuthError::tenant_mismatch("x").into(), StatusCode::FORBIDDEN),
            (StorageError::not_found("Patient", "p").into(), StatusCode::NOT_FOUND),
            (StorageError::backend("disk").into(), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Cancelled, StatusCode::REQUEST_TIMEOUT),
            (ApiError::missing_identity("x-user-id"), StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn test_storage_failure_message_is_generic() {
        let err: ApiError = StorageError::backend("connection to 10.0.0.7 refused").into();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert!(!err.public_message().contains("10.0.0.7"));

        let err: ApiError = StorageError::not_found("Patient", "p-9").into();
        assert!(err.public_message().contains("p-9"));
    }
}
