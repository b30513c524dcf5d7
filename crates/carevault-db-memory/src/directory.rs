//! In-memory patient and user directory.

use async_trait::async_trait;
use carevault_auth::{AuthResult, CareDirectory, PatientRecord};
use carevault_core::TenantId;
use dashmap::DashMap;

/// Patient tenancy and provider-of-record, plus user tenancy.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    patients: DashMap<(TenantId, String), PatientRecord>,
    /// Secondary lookup: patient id to the tenants that registered it.
    tenants_by_patient: DashMap<String, Vec<TenantId>>,
    users: DashMap<String, TenantId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CareDirectory for InMemoryDirectory {
    async fn patient(&self, tenant: &TenantId, patient_id: &str) -> AuthResult<Option<PatientRecord>> {
        Ok(self
            .patients
            .get(&(tenant.clone(), patient_id.to_string()))
            .map(|r| r.clone()))
    }

    async fn patient_tenants(&self, patient_id: &str) -> AuthResult<Vec<TenantId>> {
        Ok(self
            .tenants_by_patient
            .get(patient_id)
            .map(|t| t.clone())
            .unwrap_or_default())
    }

    async fn register_patient(&self, patient_id: &str, record: PatientRecord) -> AuthResult<()> {
        tracing::debug!(patient = %patient_id, tenant = %record.tenant_id, "Registering patient");
        let tenant = record.tenant_id.clone();
        self.patients.insert((tenant.clone(), patient_id.to_string()), record);
        let mut tenants = self.tenants_by_patient.entry(patient_id.to_string()).or_default();
        if !tenants.contains(&tenant) {
            tenants.push(tenant);
        }
        Ok(())
    }

    async fn user_tenant(&self, user_id: &str) -> AuthResult<Option<TenantId>> {
        Ok(self.users.get(user_id).map(|t| t.clone()))
    }

    async fn register_user(&self, user_id: &str, tenant: &TenantId) -> AuthResult<()> {
        // Hot path: the service registers the actor on every request.
        if self.users.get(user_id).is_some_and(|t| *t == *tenant) {
            return Ok(());
        }
        self.users.insert(user_id.to_string(), tenant.clone());
        Ok(())
    }
}
