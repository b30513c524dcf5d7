use thiserror::Error;

/// Core error types for CareVault operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Invalid date time: {0}")]
    InvalidDateTime(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidResourceType error
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    /// Create a new InvalidId error
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    /// Create a new InvalidDateTime error
    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }

    /// Create a new InvalidRole error
    pub fn invalid_role(role: impl Into<String>) -> Self {
        Self::InvalidRole(role.into())
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Map onto the shared error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidResourceType(_)
            | Self::InvalidId(_)
            | Self::InvalidDateTime(_)
            | Self::InvalidRole(_)
            | Self::JsonError(_) => ErrorKind::Validation,
            Self::Configuration(_) => ErrorKind::StorageFailure,
        }
    }
}

/// Machine-readable error taxonomy shared by every CareVault crate.
///
/// Each crate keeps its own error enum; `kind()` on those enums maps them
/// here so the endpoint boundary can render one consistent error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input. Never retried automatically.
    Validation,
    /// Duplicate logical id on create.
    Conflict,
    /// Optimistic version mismatch. Safe to retry after re-reading.
    Concurrency,
    /// Operation targets a soft-deleted resource.
    Gone,
    /// Authorization denied.
    PermissionDenied,
    /// Actor and target live in different tenants.
    TenantMismatch,
    /// Referenced resource, grant or actor does not exist.
    NotFound,
    /// Durable storage failed.
    StorageFailure,
    /// Caller cancelled the operation.
    Cancelled,
}

impl ErrorKind {
    /// Stable code used in API payloads and audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Concurrency => "concurrency",
            Self::Gone => "gone",
            Self::PermissionDenied => "permission_denied",
            Self::TenantMismatch => "tenant_mismatch",
            Self::NotFound => "not_found",
            Self::StorageFailure => "storage_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only optimistic-concurrency failures are worth an automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency)
    }

    /// Errors caused by the caller's input or permissions.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::StorageFailure)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
