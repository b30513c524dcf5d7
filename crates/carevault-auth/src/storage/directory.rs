//! Care directory lookups.
//!
//! The directory answers the questions the authorization engine cannot
//! answer from grants alone: which tenant a patient or user belongs to and
//! who the patient's provider-of-record is.
//!
//! Patient ids are scoped to a tenant, like resource version chains: two
//! tenants may each register their own `p-1`.

use async_trait::async_trait;
use carevault_core::TenantId;
use serde::{Deserialize, Serialize};

use crate::AuthResult;

/// Directory entry of a registered patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub tenant_id: TenantId,
    /// Practitioner id of the designated provider-of-record.
    pub provider_of_record: Option<String>,
}

impl PatientRecord {
    pub fn new(tenant_id: TenantId, provider_of_record: Option<String>) -> Self {
        Self {
            tenant_id,
            provider_of_record,
        }
    }

    pub fn is_provider_of_record(&self, practitioner_id: Option<&str>) -> bool {
        match (practitioner_id, self.provider_of_record.as_deref()) {
            (Some(actor), Some(designated)) => actor == designated,
            _ => false,
        }
    }
}

#[async_trait]
pub trait CareDirectory: Send + Sync {
    /// Look up a patient registered in `tenant`.
    async fn patient(&self, tenant: &TenantId, patient_id: &str) -> AuthResult<Option<PatientRecord>>;

    /// Every tenant that has registered `patient_id`.
    async fn patient_tenants(&self, patient_id: &str) -> AuthResult<Vec<TenantId>>;

    /// Register or refresh a patient's entry in `record.tenant_id`.
    async fn register_patient(&self, patient_id: &str, record: PatientRecord) -> AuthResult<()>;

    /// Tenant a user belongs to, if the user is known.
    async fn user_tenant(&self, user_id: &str) -> AuthResult<Option<TenantId>>;

    /// Record the tenant of an authenticated user.
    async fn register_user(&self, user_id: &str, tenant: &TenantId) -> AuthResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_care_directory_object_safe(_: &dyn CareDirectory) {}

    #[test]
    fn test_provider_of_record_match() {
        let record = PatientRecord::new(TenantId::new("t"), Some("dr-1".into()));
        assert!(record.is_provider_of_record(Some("dr-1")));
        assert!(!record.is_provider_of_record(Some("dr-2")));
        assert!(!record.is_provider_of_record(None));
        assert!(!PatientRecord::new(TenantId::new("t"), None).is_provider_of_record(Some("dr-1")));
    }
}
