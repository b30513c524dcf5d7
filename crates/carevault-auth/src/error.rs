//! Authorization and access grant error types.

use carevault_core::ErrorKind;

use crate::policy::engine::DenyReason;

/// Errors that can occur while granting, revoking or evaluating access.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The grant request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The authorization engine denied the operation.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Machine-readable denial code.
        code: String,
        /// Description of why access is forbidden.
        message: String,
    },

    /// Actor and target live in different tenants.
    #[error("Tenant mismatch: {message}")]
    TenantMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A patient, grant or user does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of thing was looked up.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

impl AuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a new `TenantMismatch` error.
    #[must_use]
    pub fn tenant_mismatch(message: impl Into<String>) -> Self {
        Self::TenantMismatch {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Turn a denial into the error surfaced to the caller.
    #[must_use]
    pub fn from_denial(reason: &DenyReason) -> Self {
        match reason.code.as_str() {
            DenyReason::TENANT_MISMATCH => Self::tenant_mismatch(&reason.message),
            DenyReason::PATIENT_NOT_FOUND => Self::not_found("Patient", reason.subject()),
            DenyReason::GRANT_NOT_FOUND => Self::not_found("AccessGrant", reason.subject()),
            _ => Self::forbidden(&reason.code, &reason.message),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Returns `true` if this is an authorization error.
    #[must_use]
    pub fn is_authorization_error(&self) -> bool {
        matches!(self, Self::Forbidden { .. } | Self::TenantMismatch { .. })
    }

    /// Map onto the shared error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::Validation,
            Self::Forbidden { .. } => ErrorKind::PermissionDenied,
            Self::TenantMismatch { .. } => ErrorKind::TenantMismatch,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Storage { .. } => ErrorKind::StorageFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
