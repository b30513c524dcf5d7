//! Durable audit storage contract.

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::actor::TenantId;
use crate::audit::event::AuditEvent;

/// Errors that can occur in the audit trail
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    #[error("Audit storage error: {0}")]
    Storage(String),

    #[error("Audit query cancelled")]
    Cancelled,
}

impl AuditError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

/// Chronological window for audit retrieval, both bounds inclusive.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditRange {
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
}

impl AuditRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.since.is_none_or(|s| instant >= s) && self.until.is_none_or(|u| instant <= u)
    }
}

/// Append-only store of audit events keyed by event id with a secondary
/// `(tenant, timestamp)` ordering.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Durably append one event. Events are never updated or removed.
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;

    /// Look up a single event by id.
    async fn get(&self, id: &str) -> Result<Option<AuditEvent>, AuditError>;

    /// Events of one tenant in ascending timestamp order.
    ///
    /// Stops with `AuditError::Cancelled` once `cancel` fires.
    async fn list_by_tenant(
        &self,
        tenant: &TenantId,
        range: AuditRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<AuditEvent>, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn _assert_audit_store_object_safe(_: &dyn AuditStore) {}

    #[test]
    fn test_range_bounds_are_inclusive() {
        let range = AuditRange {
            since: Some(datetime!(2024-01-01 00:00:00 UTC)),
            until: Some(datetime!(2024-01-02 00:00:00 UTC)),
        };
        assert!(range.contains(datetime!(2024-01-01 00:00:00 UTC)));
        assert!(range.contains(datetime!(2024-01-02 00:00:00 UTC)));
        assert!(!range.contains(datetime!(2023-12-31 23:59:59 UTC)));
        assert!(AuditRange::all().contains(datetime!(1999-01-01 00:00:00 UTC)));
    }
}
