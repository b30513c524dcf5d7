//! Access grant storage trait.
//!
//! # Implementation Notes
//!
//! Implementations should:
//!
//! - Support lookup by grant id plus secondary lookup by patient id and by
//!   grantee user id
//! - Make `revoke` a single conditional write so concurrent revocations of
//!   the same grant resolve to exactly one winner

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::types::{AccessGrant, GrantFilter};

/// Revocation stamp applied by [`GrantStore::revoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub revoked_at: OffsetDateTime,
    pub revoked_by: String,
    pub reason: Option<String>,
}

/// Storage trait for access grants.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Persist a new grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant id is already taken or the write fails.
    async fn insert(&self, grant: &AccessGrant) -> AuthResult<()>;

    /// Look up a grant by id.
    async fn get(&self, grant_id: &str) -> AuthResult<Option<AccessGrant>>;

    /// Stamp the grant as revoked if, and only if, it exists and is not yet
    /// revoked.
    ///
    /// Returns `false` when the grant is missing or already revoked; the
    /// original revocation stamp is left untouched in that case.
    async fn revoke(&self, grant_id: &str, revocation: Revocation) -> AuthResult<bool>;

    /// Grants whose stored attributes match `filter`, ordered by `granted_at`.
    ///
    /// `filter.active_only` is not applied here; activity depends on the
    /// caller's clock. Stops with `AuthError::Cancelled` once `cancel` fires.
    async fn find(&self, filter: &GrantFilter, cancel: &CancellationToken) -> AuthResult<Vec<AccessGrant>>;
}
