use std::sync::Arc;

use carevault_auth::{CareDirectory, GrantStore};
use carevault_core::audit::AuditStore;
use carevault_storage::DynResourceStore;
use serde::Deserialize;

use crate::{InMemoryAuditStore, InMemoryDirectory, InMemoryGrantStore, InMemoryResourceStore};

/// Supported storage backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-memory maps, one `DashMap` per store
    #[default]
    Memory,
}

/// Storage-specific configuration options.
///
/// These are best-effort hints for the in-memory backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageOptions {
    /// Initial capacity of the resource chain map.
    #[serde(default)]
    pub preallocate_items: Option<usize>,
}

/// Factory configuration to construct the storage backends.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub options: StorageOptions,
}

/// Every store the service needs, behind trait objects.
#[derive(Clone)]
pub struct Backends {
    pub resources: DynResourceStore,
    pub grants: Arc<dyn GrantStore>,
    pub audit: Arc<dyn AuditStore>,
    pub directory: Arc<dyn CareDirectory>,
}

/// Create the storage backends described by `config`.
pub fn create_backends(config: &StorageConfig) -> Backends {
    match config.backend {
        StorageBackend::Memory => {
            let resources = match config.options.preallocate_items {
                Some(capacity) => InMemoryResourceStore::with_capacity(capacity),
                None => InMemoryResourceStore::new(),
            };
            tracing::info!(backend = "memory", "Storage backends created");
            Backends {
                resources: Arc::new(resources),
                grants: Arc::new(InMemoryGrantStore::new()),
                audit: Arc::new(InMemoryAuditStore::new()),
                directory: Arc::new(InMemoryDirectory::new()),
            }
        }
    }
}
