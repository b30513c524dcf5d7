//! # carevault-storage
//!
//! Resource version storage for CareVault.
//!
//! This crate defines the [`ResourceStore`] contract that durable backends
//! implement and the [`VersionManager`] that is the single write path into
//! it. Backends live in separate crates.
//!
//! ## Overview
//!
//! - Every logical resource is a chain of immutable [`ResourceVersion`]s,
//!   numbered from 1 without gaps.
//! - Updates and deletes carry the version the caller read; the store's
//!   compare-and-append rejects stale writers with
//!   [`StorageError::VersionConflict`].
//! - Deletes append a tombstone; history stays readable.
//!
//! ## Example
//!
//! ```ignore
//! use carevault_storage::VersionManager;
//!
//! let created = manager.create(&tenant, ResourceType::Patient, payload, &ctx).await?;
//! let updated = manager
//!     .update(&tenant, ResourceType::Patient, &created.logical_id, created.version, changed, &ctx)
//!     .await?;
//! assert_eq!(updated.version, 2);
//! ```

mod error;
pub mod search_index;
mod traits;
mod types;
pub mod validation;
pub mod versioning;

pub use error::StorageError;
pub use search_index::SearchIndex;
pub use traits::ResourceStore;
pub use types::{ChainKey, ResourceVersion, SearchParams};
pub use validation::{AcceptAll, ResourceValidator, ValidationIssue, ValidationReport};
pub use versioning::VersionManager;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared store trait object.
pub type DynResourceStore = std::sync::Arc<dyn ResourceStore>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use carevault_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::StorageError;
    pub use crate::traits::ResourceStore;
    pub use crate::types::{ChainKey, ResourceVersion, SearchParams};
    pub use crate::validation::{ResourceValidator, ValidationReport};
    pub use crate::versioning::VersionManager;
    pub use crate::{DynResourceStore, StorageResult};
}
