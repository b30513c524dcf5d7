//! Access grant records.

use carevault_core::TenantId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::access::AccessLevel;

/// Authorization for one user to one patient's data at one level.
///
/// Grants are never hard-deleted. Revocation stamps `revoked_at`; expiry is
/// computed from the clock and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub id: String,
    /// Tenant of the patient when the grant was issued.
    pub tenant_id: TenantId,
    pub patient_id: String,
    pub grantee_user_id: String,
    pub level: AccessLevel,
    pub granted_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub granted_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// Derived lifecycle state of a grant at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GrantState {
    Active,
    Expired,
    Revoked,
}

impl AccessGrant {
    /// `revoked_at` unset and `expires_at` unset or strictly in the future.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|expires| expires > now)
    }

    pub fn state(&self, now: OffsetDateTime) -> GrantState {
        if self.revoked_at.is_some() {
            GrantState::Revoked
        } else if self.is_active(now) {
            GrantState::Active
        } else {
            GrantState::Expired
        }
    }
}

/// What the grant operation is asked to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    pub patient_id: String,
    pub grantee_user_id: String,
    pub level: AccessLevel,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl GrantRequest {
    pub fn new(patient_id: impl Into<String>, grantee_user_id: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            patient_id: patient_id.into(),
            grantee_user_id: grantee_user_id.into(),
            level,
            expires_at: None,
            justification: None,
            purpose: None,
        }
    }

    #[must_use]
    pub fn expires_at(mut self, at: OffsetDateTime) -> Self {
        self.expires_at = Some(at);
        self
    }

    #[must_use]
    pub fn justification(mut self, text: impl Into<String>) -> Self {
        self.justification = Some(text.into());
        self
    }

    #[must_use]
    pub fn purpose(mut self, text: impl Into<String>) -> Self {
        self.purpose = Some(text.into());
        self
    }
}

/// Grant listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantFilter {
    pub patient_id: Option<String>,
    pub user_id: Option<String>,
    pub level: Option<AccessLevel>,
    #[serde(default)]
    pub active_only: bool,
}

impl GrantFilter {
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Self::default()
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: AccessLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Stored-attribute match. Activity is checked separately against the clock.
    pub fn matches_record(&self, grant: &AccessGrant) -> bool {
        self.patient_id.as_deref().is_none_or(|p| p == grant.patient_id)
            && self.user_id.as_deref().is_none_or(|u| u == grant.grantee_user_id)
            && self.level.is_none_or(|l| l == grant.level)
    }
}
