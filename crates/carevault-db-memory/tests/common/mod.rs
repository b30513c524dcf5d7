#![allow(dead_code)]

use std::sync::Arc;

use carevault_auth::{AccessGrantRegistry, AuthorizationEngine, CareDirectory, PatientRecord};
use carevault_core::audit::{AuditAction, AuditEvent, AuditLog};
use carevault_core::{Actor, DynClock, ManualClock, RequestContext, ResourceType, Role, TenantId};
use carevault_db_memory::{
    InMemoryAuditStore, InMemoryDirectory, InMemoryGrantStore, InMemoryResourceStore,
};
use carevault_storage::{AcceptAll, VersionManager};
use time::macros::datetime;

pub const T1: &str = "tenant-1";
pub const T2: &str = "tenant-2";

/// Every store and service wired together over in-memory backends.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub audit_store: Arc<InMemoryAuditStore>,
    pub resources: Arc<InMemoryResourceStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub audit: AuditLog,
    pub manager: Arc<VersionManager>,
    pub registry: AccessGrantRegistry,
    pub engine: AuthorizationEngine,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 09:00:00 UTC)));
        let dyn_clock: DynClock = clock.clone();
        let audit_store = Arc::new(InMemoryAuditStore::new());
        let resources = Arc::new(InMemoryResourceStore::new());
        let directory = Arc::new(InMemoryDirectory::new());

        let audit = AuditLog::inline(audit_store.clone(), dyn_clock.clone());
        let manager = VersionManager::new(resources.clone(), Arc::new(AcceptAll), audit.clone(), dyn_clock.clone())
            .with_client_assigned_ids([ResourceType::Practitioner]);
        let registry =
            AccessGrantRegistry::new(Arc::new(InMemoryGrantStore::new()), audit.clone(), dyn_clock);
        let engine = AuthorizationEngine::new(registry.clone(), directory.clone(), audit.clone());

        Self {
            clock,
            audit_store,
            resources,
            directory,
            audit,
            manager: Arc::new(manager),
            registry,
            engine,
        }
    }

    pub async fn register_patient(&self, patient_id: &str, tenant: &str, provider: Option<&str>) {
        self.directory
            .register_patient(
                patient_id,
                PatientRecord::new(TenantId::new(tenant), provider.map(str::to_string)),
            )
            .await
            .unwrap();
    }

    pub async fn register_user(&self, actor: &Actor) {
        self.directory.register_user(&actor.user_id, &actor.tenant_id).await.unwrap();
    }

    pub fn events(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.audit_store
            .snapshot()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

pub fn ctx(actor: &Actor) -> RequestContext {
    RequestContext::new(actor.clone())
}

pub fn admin(tenant: &str) -> Actor {
    Actor::new("admin", Role::SystemAdministrator, tenant)
}

pub fn provider(user: &str, tenant: &str, practitioner: &str) -> Actor {
    Actor::new(user, Role::HealthcareProvider, tenant).with_practitioner(practitioner)
}

pub fn nurse(user: &str, tenant: &str) -> Actor {
    Actor::new(user, Role::Nurse, tenant)
}
