//! In-memory access grant store.

use async_trait::async_trait;
use carevault_auth::{AccessGrant, AuthError, AuthResult, GrantFilter, GrantStore, Revocation};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;

use crate::storage::CANCEL_CHECK_INTERVAL;

/// Grants keyed by id. Patient and grantee lookups scan the map.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
    grants: DashMap<String, AccessGrant>,
}

impl InMemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
    async fn insert(&self, grant: &AccessGrant) -> AuthResult<()> {
        match self.grants.entry(grant.id.clone()) {
            Entry::Occupied(_) => Err(AuthError::storage(format!(
                "access grant {} already exists",
                grant.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(grant.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, grant_id: &str) -> AuthResult<Option<AccessGrant>> {
        Ok(self.grants.get(grant_id).map(|g| g.clone()))
    }

    async fn revoke(&self, grant_id: &str, revocation: Revocation) -> AuthResult<bool> {
        let Some(mut grant) = self.grants.get_mut(grant_id) else {
            return Ok(false);
        };
        if grant.revoked_at.is_some() {
            return Ok(false);
        }
        grant.revoked_at = Some(revocation.revoked_at);
        grant.revoked_by = Some(revocation.revoked_by);
        grant.revocation_reason = revocation.reason;
        Ok(true)
    }

    async fn find(&self, filter: &GrantFilter, cancel: &CancellationToken) -> AuthResult<Vec<AccessGrant>> {
        let mut found = Vec::new();
        for (scanned, grant) in self.grants.iter().enumerate() {
            if scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }
            if filter.matches_record(&grant) {
                found.push(grant.clone());
            }
        }
        found.sort_by(|a, b| a.granted_at.cmp(&b.granted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}
