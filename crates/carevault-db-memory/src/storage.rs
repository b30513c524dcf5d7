use async_trait::async_trait;
use carevault_core::{Page, ResourceType, TenantId};
use carevault_storage::{ChainKey, ResourceStore, ResourceVersion, SearchParams, StorageError};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Entries scanned between cancellation checks.
pub(crate) const CANCEL_CHECK_INTERVAL: usize = 256;

/// In-memory resource version store using a sharded `DashMap`.
///
/// Each chain lives under its own map entry. `compare_and_append` holds that
/// entry's shard lock across the version check and the push, so two writers
/// that read the same current version can never both append.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    chains: DashMap<ChainKey, Vec<ResourceVersion>>,
}

impl InMemoryResourceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store sized for roughly `capacity` chains.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chains: DashMap::with_capacity(capacity),
        }
    }

    /// Number of chains holding at least one version.
    pub fn chain_count(&self) -> usize {
        self.chains.iter().filter(|c| !c.is_empty()).count()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn compare_and_append(
        &self,
        expected_current: u64,
        version: &ResourceVersion,
    ) -> Result<(), StorageError> {
        if version.version != expected_current + 1 {
            return Err(StorageError::invalid_resource(format!(
                "version {} does not follow {expected_current}",
                version.version
            )));
        }

        let mut chain = self.chains.entry(version.key()).or_default();
        let actual = chain.last().map_or(0, |v| v.version);
        if actual != expected_current {
            tracing::debug!(
                chain = %version.key(),
                expected = expected_current,
                actual,
                "Compare-and-append lost"
            );
            return Err(StorageError::version_conflict(expected_current, actual));
        }
        chain.push(version.clone());
        Ok(())
    }

    async fn get_current(&self, key: &ChainKey) -> Result<Option<ResourceVersion>, StorageError> {
        Ok(self.chains.get(key).and_then(|chain| chain.last().cloned()))
    }

    async fn get_version(
        &self,
        key: &ChainKey,
        version: u64,
    ) -> Result<Option<ResourceVersion>, StorageError> {
        if version == 0 {
            return Ok(None);
        }
        // Chains are gap-free from 1, so version n sits at index n - 1.
        Ok(self
            .chains
            .get(key)
            .and_then(|chain| chain.get((version - 1) as usize).cloned()))
    }

    async fn history(
        &self,
        key: &ChainKey,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceVersion>, StorageError> {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        Ok(self
            .chains
            .get(key)
            .map(|chain| chain.clone())
            .unwrap_or_default())
    }

    async fn search(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        params: &SearchParams,
        cancel: &CancellationToken,
    ) -> Result<Page<ResourceVersion>, StorageError> {
        let mut matches = Vec::new();
        for (scanned, chain) in self.chains.iter().enumerate() {
            if scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            let key = chain.key();
            if &key.tenant_id != tenant || key.resource_type != resource_type {
                continue;
            }
            if let Some(current) = chain.last()
                && params.matches(current)
            {
                matches.push(current.clone());
            }
        }
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        // Stable paging order
        matches.sort_by(|a, b| a.logical_id.cmp(&b.logical_id));
        Ok(params.page.apply(matches))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
