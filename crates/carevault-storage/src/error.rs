//! Storage error types for the resource version layer.

use carevault_core::ErrorKind;

/// Errors that can occur during storage and versioning operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested resource was not found.
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: String,
        /// The ID of the resource that was not found.
        id: String,
    },

    /// The chain moved on since the caller read it.
    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// The version the caller based its change on.
        expected: u64,
        /// The current stored version.
        actual: u64,
    },

    /// Attempted to create a resource that already exists.
    #[error("Resource already exists: {resource_type}/{id}")]
    AlreadyExists {
        /// The type of resource that already exists.
        resource_type: String,
        /// The ID of the resource that already exists.
        id: String,
    },

    /// The resource has been soft-deleted.
    #[error("Resource deleted: {resource_type}/{id} (version {version})")]
    Gone {
        resource_type: String,
        id: String,
        /// Version number of the tombstone.
        version: u64,
    },

    /// The resource data is invalid.
    #[error("Invalid resource: {message}")]
    InvalidResource {
        /// Description of why the resource is invalid.
        message: String,
    },

    /// The durable backend failed.
    #[error("Storage backend error: {message}")]
    Backend {
        /// Internal detail, never shown to end users.
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("Storage operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `VersionConflict` error.
    #[must_use]
    pub fn version_conflict(expected: u64, actual: u64) -> Self {
        Self::VersionConflict { expected, actual }
    }

    /// Creates a new `AlreadyExists` error.
    #[must_use]
    pub fn already_exists(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Creates a new `Gone` error.
    #[must_use]
    pub fn gone(resource_type: impl Into<String>, id: impl Into<String>, version: u64) -> Self {
        Self::Gone {
            resource_type: resource_type.into(),
            id: id.into(),
            version,
        }
    }

    /// Creates a new `InvalidResource` error.
    #[must_use]
    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a version conflict error.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` if this is an already exists error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if the target is soft-deleted.
    #[must_use]
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Gone { .. })
    }

    /// Map onto the shared error taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::VersionConflict { .. } => ErrorKind::Concurrency,
            Self::AlreadyExists { .. } => ErrorKind::Conflict,
            Self::Gone { .. } => ErrorKind::Gone,
            Self::InvalidResource { .. } => ErrorKind::Validation,
            Self::Backend { .. } => ErrorKind::StorageFailure,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<carevault_core::CoreError> for StorageError {
    fn from(e: carevault_core::CoreError) -> Self {
        Self::invalid_resource(e.to_string())
    }
}
