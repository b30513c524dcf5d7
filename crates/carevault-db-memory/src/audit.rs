//! In-memory append-only audit store.

use std::collections::HashMap;

use async_trait::async_trait;
use carevault_core::TenantId;
use carevault_core::audit::{AuditError, AuditEvent, AuditRange, AuditStore};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::storage::CANCEL_CHECK_INTERVAL;

#[derive(Debug, Default)]
struct Ledger {
    events: Vec<AuditEvent>,
    by_id: HashMap<String, usize>,
}

/// Append-only audit store. Events can be added but never changed or removed.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    ledger: RwLock<Ledger>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ledger.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every event in append order, across tenants.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.ledger.read().events.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut ledger = self.ledger.write();
        if ledger.by_id.contains_key(&event.id) {
            return Err(AuditError::storage(format!("audit event {} already recorded", event.id)));
        }
        let index = ledger.events.len();
        ledger.by_id.insert(event.id.clone(), index);
        ledger.events.push(event.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AuditEvent>, AuditError> {
        let ledger = self.ledger.read();
        Ok(ledger.by_id.get(id).map(|&i| ledger.events[i].clone()))
    }

    async fn list_by_tenant(
        &self,
        tenant: &TenantId,
        range: AuditRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        let mut events = Vec::new();
        {
            let ledger = self.ledger.read();
            for (scanned, event) in ledger.events.iter().enumerate() {
                if scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                    return Err(AuditError::Cancelled);
                }
                if &event.tenant_id == tenant && range.contains(event.timestamp) {
                    events.push(event.clone());
                }
            }
        }
        // Stable sort keeps append order for equal timestamps.
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}
