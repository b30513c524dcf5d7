//! Request actor identity.
//!
//! The identity/claims provider is external; by the time an [`Actor`] is built
//! its fields are already validated. Core operations take the actor as an
//! explicit parameter instead of reading ambient request state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Tenant isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Role claim of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    SystemAdministrator,
    HealthcareProvider,
    Nurse,
    Researcher,
    Patient,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdministrator => "SystemAdministrator",
            Role::HealthcareProvider => "HealthcareProvider",
            Role::Nurse => "Nurse",
            Role::Researcher => "Researcher",
            Role::Patient => "Patient",
            Role::Staff => "Staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SystemAdministrator" => Ok(Role::SystemAdministrator),
            "HealthcareProvider" => Ok(Role::HealthcareProvider),
            "Nurse" => Ok(Role::Nurse),
            "Researcher" => Ok(Role::Researcher),
            "Patient" => Ok(Role::Patient),
            "Staff" => Ok(Role::Staff),
            _ => Err(CoreError::invalid_role(s)),
        }
    }
}

/// The already-authenticated caller of a core operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub tenant_id: TenantId,
    /// Practitioner resource id for provider roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_id: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role, tenant_id: impl Into<TenantId>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            tenant_id: tenant_id.into(),
            practitioner_id: None,
        }
    }

    #[must_use]
    pub fn with_practitioner(mut self, practitioner_id: impl Into<String>) -> Self {
        self.practitioner_id = Some(practitioner_id.into());
        self
    }

    pub fn is_system_administrator(&self) -> bool {
        self.role == Role::SystemAdministrator
    }

    pub fn is_provider(&self) -> bool {
        self.role == Role::HealthcareProvider
    }

    pub fn same_tenant(&self, tenant: &TenantId) -> bool {
        &self.tenant_id == tenant
    }
}

/// Per-call context threaded explicitly through every core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Actor,
    /// Cross-references audit records with the response the caller saw.
    pub correlation_id: Option<String>,
}

impl RequestContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("HealthcareProvider").unwrap(), Role::HealthcareProvider);
        assert!(Role::from_str("Wizard").is_err());
    }

    #[test]
    fn test_actor_builder() {
        let actor = Actor::new("u-1", Role::HealthcareProvider, "tenant-a").with_practitioner("dr-1");
        assert!(actor.is_provider());
        assert!(!actor.is_system_administrator());
        assert_eq!(actor.practitioner_id.as_deref(), Some("dr-1"));
        assert!(actor.same_tenant(&TenantId::new("tenant-a")));
        assert!(!actor.same_tenant(&TenantId::new("tenant-b")));
    }

    #[test]
    fn test_request_context_correlation() {
        let ctx = RequestContext::new(Actor::new("u-1", Role::Staff, "t")).with_correlation_id("req-7");
        assert_eq!(ctx.correlation_id(), Some("req-7"));
        assert_eq!(ctx.actor.user_id, "u-1");
    }

    #[test]
    fn test_tenant_id_serializes_transparently() {
        let json = serde_json::to_string(&TenantId::new("acme")).unwrap();
        assert_eq!(json, "\"acme\"");
    }
}
