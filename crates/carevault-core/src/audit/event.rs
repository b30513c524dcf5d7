//! Audit event model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::actor::{Actor, RequestContext, Role, TenantId};
use crate::error::ErrorKind;

/// What was decided or done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Authorization decisions
    AuthorizePatientAccess,
    AuthorizeSharedAccess,
    AuthorizeRegisterPatient,
    AuthorizeGrant,
    AuthorizeRevoke,
    AuthorizeProviderChange,
    AuthorizeAuditTrail,

    // Resource version mutations
    ResourceCreate,
    ResourceUpdate,
    ResourceDelete,

    // Access grant mutations
    GrantCreate,
    GrantRevoke,

    // Durable storage failed while serving a request
    StorageFailure,
}

impl AuditAction {
    /// Returns the subtype code for the audit record
    pub fn to_subtype_code(&self) -> &'static str {
        match self {
            AuditAction::AuthorizePatientAccess => "authz.patient_access",
            AuditAction::AuthorizeSharedAccess => "authz.shared_access",
            AuditAction::AuthorizeRegisterPatient => "authz.register_patient",
            AuditAction::AuthorizeGrant => "authz.grant",
            AuditAction::AuthorizeRevoke => "authz.revoke",
            AuditAction::AuthorizeProviderChange => "authz.provider_of_record",
            AuditAction::AuthorizeAuditTrail => "authz.audit_trail",
            AuditAction::ResourceCreate => "resource.create",
            AuditAction::ResourceUpdate => "resource.update",
            AuditAction::ResourceDelete => "resource.delete",
            AuditAction::GrantCreate => "grant.create",
            AuditAction::GrantRevoke => "grant.revoke",
            AuditAction::StorageFailure => "system.storage_failure",
        }
    }

    /// True for records of an authorization decision, as opposed to a mutation.
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            AuditAction::AuthorizePatientAccess
                | AuditAction::AuthorizeSharedAccess
                | AuditAction::AuthorizeRegisterPatient
                | AuditAction::AuthorizeGrant
                | AuditAction::AuthorizeRevoke
                | AuditAction::AuthorizeProviderChange
                | AuditAction::AuthorizeAuditTrail
        )
    }
}

/// Outcome of the audited decision or operation.
///
/// Committed mutations are recorded as `Allowed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Allowed,
    Denied,
    Error,
}

/// The thing acted upon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<String>,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: String,
    pub tenant_id: TenantId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_role: Option<Role>,
    pub action: AuditAction,
    pub entity: AuditEntity,
    pub outcome: AuditOutcome,
    /// Denial or error reason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error kind for `Error` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Decision inputs or operation detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Builder for audit events
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    tenant_id: TenantId,
    action: AuditAction,
    actor_id: String,
    actor_role: Option<Role>,
    outcome: AuditOutcome,
    reason: Option<String>,
    error_kind: Option<ErrorKind>,
    entity: AuditEntity,
    correlation_id: Option<String>,
    details: Option<Value>,
}

impl AuditEventBuilder {
    /// Create a builder for an event in `tenant`.
    pub fn new(tenant_id: TenantId, action: AuditAction) -> Self {
        Self {
            tenant_id,
            action,
            actor_id: "system".to_string(),
            actor_role: None,
            outcome: AuditOutcome::Allowed,
            reason: None,
            error_kind: None,
            entity: AuditEntity::default(),
            correlation_id: None,
            details: None,
        }
    }

    /// Create a builder for an event performed by `actor` in the actor's tenant.
    pub fn for_actor(actor: &Actor, action: AuditAction) -> Self {
        Self::new(actor.tenant_id.clone(), action).actor(actor)
    }

    /// Attribute the event to the context's actor and correlation id.
    pub fn context(self, ctx: &RequestContext) -> Self {
        self.actor(&ctx.actor).correlation_id(ctx.correlation_id())
    }

    pub fn actor(mut self, actor: &Actor) -> Self {
        self.actor_id = actor.user_id.clone();
        self.actor_role = Some(actor.role);
        self
    }

    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Mark the event as an error of the given kind.
    pub fn error(mut self, kind: ErrorKind, reason: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Error;
        self.error_kind = Some(kind);
        self.reason = Some(reason.into());
        self
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: Option<String>) -> Self {
        self.entity.resource_type = Some(resource_type.into());
        self.entity.resource_id = resource_id;
        self
    }

    pub fn version(mut self, version: u64) -> Self {
        self.entity.version = Some(version);
        self
    }

    pub fn patient(mut self, patient_id: impl Into<String>) -> Self {
        self.entity.patient_id = Some(patient_id.into());
        self
    }

    pub fn grant(mut self, grant_id: impl Into<String>) -> Self {
        self.entity.grant_id = Some(grant_id.into());
        self
    }

    pub fn correlation_id(mut self, id: Option<&str>) -> Self {
        self.correlation_id = id.map(String::from);
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Stamp the event with a fresh id and the given instant.
    pub fn build(self, timestamp: OffsetDateTime) -> AuditEvent {
        AuditEvent {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id,
            timestamp,
            actor_id: self.actor_id,
            actor_role: self.actor_role,
            action: self.action,
            entity: self.entity,
            outcome: self.outcome,
            reason: self.reason,
            error_kind: self.error_kind.map(|k| k.as_str().to_string()),
            correlation_id: self.correlation_id,
            details: self.details,
        }
    }
}
