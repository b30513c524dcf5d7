//! In-memory storage backends for CareVault.
//!
//! This crate implements the store contracts of `carevault-storage`,
//! `carevault-auth` and `carevault-core` on top of `dashmap` sharded maps.
//! Data lives only as long as the process.
//!
//! # Example
//!
//! ```ignore
//! use carevault_db_memory::{StorageConfig, create_backends};
//!
//! let backends = create_backends(&StorageConfig::default());
//! let manager = VersionManager::new(backends.resources.clone(), validator, audit, clock);
//! ```

mod audit;
mod directory;
pub mod factory;
mod grant;
mod storage;

pub use audit::InMemoryAuditStore;
pub use directory::InMemoryDirectory;
pub use factory::{Backends, StorageBackend, StorageConfig, StorageOptions, create_backends};
pub use grant::InMemoryGrantStore;
pub use storage::InMemoryResourceStore;
