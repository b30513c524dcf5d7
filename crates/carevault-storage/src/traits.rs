//! The durable resource version store contract.

use async_trait::async_trait;
use carevault_core::{Page, ResourceType, TenantId};
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::types::{ChainKey, ResourceVersion, SearchParams};

/// Durable storage of resource version chains keyed by
/// `(tenant, type, logical id, version)`.
///
/// The store owns the chains. Only [`crate::VersionManager`] appends to them;
/// read paths may call the store directly.
///
/// # Example
///
/// ```ignore
/// use carevault_storage::{ChainKey, ResourceStore, StorageError};
///
/// async fn current(store: &dyn ResourceStore, key: &ChainKey) -> Result<u64, StorageError> {
///     Ok(store.get_current(key).await?.map_or(0, |v| v.version))
/// }
/// ```
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Append `version` to its chain iff the chain's current version number
    /// equals `expected_current` (0 for an empty chain).
    ///
    /// The check and the append are one atomic step: two callers that observed
    /// the same current version can never both succeed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::VersionConflict` if the chain moved on, and
    /// `StorageError::InvalidResource` if `version.version` is not
    /// `expected_current + 1`.
    async fn compare_and_append(
        &self,
        expected_current: u64,
        version: &ResourceVersion,
    ) -> Result<(), StorageError>;

    /// The highest version of a chain regardless of its delete flag.
    async fn get_current(&self, key: &ChainKey) -> Result<Option<ResourceVersion>, StorageError>;

    /// One specific version of a chain.
    async fn get_version(
        &self,
        key: &ChainKey,
        version: u64,
    ) -> Result<Option<ResourceVersion>, StorageError>;

    /// Every version of a chain in ascending version order.
    ///
    /// Empty when the chain does not exist. Stops with
    /// `StorageError::Cancelled` once `cancel` fires.
    async fn history(
        &self,
        key: &ChainKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceVersion>, StorageError>;

    /// Current, live versions of one type in one tenant matching `params`.
    async fn search(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        params: &SearchParams,
        cancel: &CancellationToken,
    ) -> Result<Page<ResourceVersion>, StorageError>;

    /// Name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}
