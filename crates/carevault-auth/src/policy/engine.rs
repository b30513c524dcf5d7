//! Authorization decision engine.
//!
//! [`AuthorizationEngine`] is the single policy point every read, write and
//! grant operation passes through. It composes the actor's role, tenant
//! membership, provider-of-record status and active access grants into a
//! structured [`AccessDecision`], and records exactly one audit event per
//! call, whether the answer is allow, deny or an error.
//!
//! # Example
//!
//! ```ignore
//! use carevault_auth::{AuthorizationEngine, PatientOperation};
//!
//! let decision = engine
//!     .can_access_patient(&ctx, "p-1", PatientOperation::Read)
//!     .await?;
//! if decision.is_allowed() {
//!     // Proceed with request
//! }
//! ```

use std::sync::Arc;

use carevault_core::audit::{AuditAction, AuditEventBuilder, AuditLog, AuditOutcome};
use carevault_core::{Actor, RequestContext, ResourceType, TenantId};
use serde::Serialize;
use serde_json::{Value, json};

use crate::registry::AccessGrantRegistry;
use crate::storage::{CareDirectory, PatientRecord};
use crate::types::access::PROVIDER_OF_RECORD;
use crate::types::{AccessLevel, OperationSet, PatientOperation};
use crate::{AuthError, AuthResult};

// =============================================================================
// Access Decision
// =============================================================================

/// Result of an authorization check.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    /// Access is granted.
    Allow,
    /// Access is denied with a reason.
    Deny(DenyReason),
}

impl AccessDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns `true` if access was denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    /// Get the deny reason if access was denied.
    #[must_use]
    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Self::Deny(reason) => Some(reason),
            Self::Allow => None,
        }
    }

    /// Convert a denial into the matching [`AuthError`].
    pub fn into_result(self) -> AuthResult<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(AuthError::from_denial(&reason)),
        }
    }
}

// =============================================================================
// Deny Reason
// =============================================================================

/// Reason for access denial.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DenyReason {
    /// Error code for programmatic handling.
    pub code: String,

    /// Human-readable error message.
    pub message: String,

    /// Additional details about the denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl DenyReason {
    pub const TENANT_MISMATCH: &'static str = "tenant-mismatch";
    pub const PATIENT_NOT_FOUND: &'static str = "patient-not-found";
    pub const GRANT_NOT_FOUND: &'static str = "grant-not-found";
    pub const NO_ACTIVE_GRANT: &'static str = "no-active-grant";
    pub const INSUFFICIENT_LEVEL: &'static str = "insufficient-level";
    pub const PRIVILEGE_ESCALATION: &'static str = "privilege-escalation";
    pub const NOT_GRANTER: &'static str = "not-granter";
    pub const ROLE_NOT_PERMITTED: &'static str = "role-not-permitted";
    pub const PATIENT_SCOPE_REQUIRED: &'static str = "patient-scope-required";

    fn new(code: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details,
        }
    }

    /// Actor and target belong to different tenants.
    #[must_use]
    pub fn tenant_mismatch(actor_tenant: &str, target_tenant: &str) -> Self {
        Self::new(
            Self::TENANT_MISMATCH,
            "Actor and target belong to different tenants",
            Some(json!({ "actorTenant": actor_tenant, "targetTenant": target_tenant })),
        )
    }

    #[must_use]
    pub fn patient_not_found(patient_id: &str) -> Self {
        Self::new(
            Self::PATIENT_NOT_FOUND,
            format!("Patient {patient_id} is not registered"),
            Some(json!({ "id": patient_id })),
        )
    }

    #[must_use]
    pub fn grant_not_found(grant_id: &str) -> Self {
        Self::new(
            Self::GRANT_NOT_FOUND,
            format!("Access grant {grant_id} does not exist"),
            Some(json!({ "id": grant_id })),
        )
    }

    #[must_use]
    pub fn no_active_grant(operation: PatientOperation) -> Self {
        Self::new(
            Self::NO_ACTIVE_GRANT,
            "No active access grant covers this patient",
            Some(json!({ "operation": operation })),
        )
    }

    #[must_use]
    pub fn insufficient_level(operation: PatientOperation, effective: OperationSet) -> Self {
        Self::new(
            Self::INSUFFICIENT_LEVEL,
            format!("Active access does not permit {operation}"),
            Some(json!({ "operation": operation, "effective": effective })),
        )
    }

    /// Granting `level` would hand out more than the granter holds.
    #[must_use]
    pub fn privilege_escalation(level: AccessLevel, effective: OperationSet) -> Self {
        Self::new(
            Self::PRIVILEGE_ESCALATION,
            format!("Cannot grant {level} beyond own effective access"),
            Some(json!({ "requested": level, "effective": effective })),
        )
    }

    #[must_use]
    pub fn not_granter() -> Self {
        Self::new(
            Self::NOT_GRANTER,
            "Only the original granter or an administrator may revoke this grant",
            None,
        )
    }

    #[must_use]
    pub fn role_not_permitted(role: &str, action: &str) -> Self {
        Self::new(
            Self::ROLE_NOT_PERMITTED,
            format!("Role {role} may not {action}"),
            Some(json!({ "role": role })),
        )
    }

    /// Only the current provider-of-record or an administrator may hand the
    /// patient to another provider.
    #[must_use]
    pub fn provider_reassignment(current: Option<&str>, requested: Option<&str>) -> Self {
        Self::new(
            Self::PRIVILEGE_ESCALATION,
            "Only the provider-of-record or an administrator may change the provider-of-record",
            Some(json!({ "current": current, "requested": requested })),
        )
    }

    /// Searching a patient compartment type without naming the patient.
    #[must_use]
    pub fn patient_scope_required(resource_type: &str) -> Self {
        Self::new(
            Self::PATIENT_SCOPE_REQUIRED,
            format!("Searching {resource_type} requires a patient parameter"),
            None,
        )
    }

    /// Returns `true` for the stricter cross-tenant denial.
    #[must_use]
    pub fn is_tenant_mismatch(&self) -> bool {
        self.code == Self::TENANT_MISMATCH
    }

    /// The id the denial is about, when there is one.
    pub fn subject(&self) -> &str {
        self.details
            .as_ref()
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Why an allow decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Basis {
    SystemAdministrator,
    ProviderOfRecord,
    Grant,
    Granter,
    Role,
}

impl Basis {
    fn as_str(&self) -> &'static str {
        match self {
            Self::SystemAdministrator => "system-administrator",
            Self::ProviderOfRecord => "provider-of-record",
            Self::Grant => "grant",
            Self::Granter => "granter",
            Self::Role => "role",
        }
    }
}

/// Operations an actor holds on one patient, and where they come from.
#[derive(Debug, Default)]
struct EffectiveAccess {
    operations: OperationSet,
    provider_of_record: bool,
    grant_ids: Vec<String>,
}

impl EffectiveAccess {
    fn basis_for(&self, required: OperationSet) -> Basis {
        if self.provider_of_record && required.is_subset_of(&PROVIDER_OF_RECORD) {
            Basis::ProviderOfRecord
        } else {
            Basis::Grant
        }
    }
}

/// Outcome of one evaluation before it is audited.
struct Evaluation {
    decision: AccessDecision,
    /// Tenant the decision is recorded under.
    tenant: TenantId,
    basis: Option<Basis>,
    patient_id: Option<String>,
    grant_ids: Vec<String>,
}

impl Evaluation {
    fn allow(tenant: TenantId, basis: Basis) -> Self {
        Self {
            decision: AccessDecision::Allow,
            tenant,
            basis: Some(basis),
            patient_id: None,
            grant_ids: Vec::new(),
        }
    }

    fn deny(tenant: TenantId, reason: DenyReason) -> Self {
        Self {
            decision: AccessDecision::Deny(reason),
            tenant,
            basis: None,
            patient_id: None,
            grant_ids: Vec::new(),
        }
    }

    fn tenant_mismatch(actor: &Actor, target: &TenantId) -> Self {
        Self::deny(
            target.clone(),
            DenyReason::tenant_mismatch(actor.tenant_id.as_str(), target.as_str()),
        )
    }

    fn patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    fn grants(mut self, grant_ids: Vec<String>) -> Self {
        self.grant_ids = grant_ids;
        self
    }
}

/// Entity an authorization call is about, recorded on its audit event.
#[derive(Default)]
struct Target<'a> {
    patient_id: Option<&'a str>,
    grant_id: Option<&'a str>,
    resource_type: Option<ResourceType>,
}

// =============================================================================
// Authorization Engine
// =============================================================================

/// Central allow/deny policy point.
///
/// Decision order for patient data:
///
/// 1. `SystemAdministrator` is allowed unconditionally
/// 2. any other actor must share the patient's tenant
/// 3. a `HealthcareProvider` who is the patient's provider-of-record holds Read and Write
/// 4. otherwise the union of the actor's active grants on the patient decides
#[derive(Clone)]
pub struct AuthorizationEngine {
    registry: AccessGrantRegistry,
    directory: Arc<dyn CareDirectory>,
    audit: AuditLog,
}

impl AuthorizationEngine {
    /// Create a new authorization engine.
    #[must_use]
    pub fn new(registry: AccessGrantRegistry, directory: Arc<dyn CareDirectory>, audit: AuditLog) -> Self {
        Self {
            registry,
            directory,
            audit,
        }
    }

    pub fn registry(&self) -> &AccessGrantRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &Arc<dyn CareDirectory> {
        &self.directory
    }

    /// May the actor perform `operation` on `patient_id`'s data?
    pub async fn can_access_patient(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        operation: PatientOperation,
    ) -> AuthResult<AccessDecision> {
        let result = self.evaluate_patient_access(&ctx.actor, patient_id, operation).await;
        let target = Target {
            patient_id: Some(patient_id),
            ..Target::default()
        };
        self.finish(ctx, AuditAction::AuthorizePatientAccess, target, json!({ "operation": operation }), result)
            .await
    }

    /// May the actor grant `level` on `patient_id` to `grantee_user_id`?
    ///
    /// A provider needs Write on the patient and may only hand out a level
    /// whose permitted operations are a subset of their own.
    pub async fn can_grant_access(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        grantee_user_id: &str,
        level: AccessLevel,
    ) -> AuthResult<AccessDecision> {
        let result = self.evaluate_grant(&ctx.actor, patient_id, grantee_user_id, level).await;
        let target = Target {
            patient_id: Some(patient_id),
            ..Target::default()
        };
        let inputs = json!({ "grantee": grantee_user_id, "level": level });
        self.finish(ctx, AuditAction::AuthorizeGrant, target, inputs, result).await
    }

    /// May the actor revoke `grant_id`? Only administrators and the original granter may.
    pub async fn can_revoke_access(&self, ctx: &RequestContext, grant_id: &str) -> AuthResult<AccessDecision> {
        let result = self.evaluate_revoke(&ctx.actor, grant_id).await;
        let target = Target {
            grant_id: Some(grant_id),
            ..Target::default()
        };
        self.finish(ctx, AuditAction::AuthorizeRevoke, target, Value::Null, result).await
    }

    /// May the actor register a new patient in `tenant`?
    pub async fn can_register_patient(&self, ctx: &RequestContext, tenant: &TenantId) -> AuthResult<AccessDecision> {
        let actor = &ctx.actor;
        let evaluation = if actor.is_system_administrator() {
            Evaluation::allow(tenant.clone(), Basis::SystemAdministrator)
        } else if !actor.same_tenant(tenant) {
            Evaluation::tenant_mismatch(actor, tenant)
        } else if actor.is_provider() {
            Evaluation::allow(tenant.clone(), Basis::Role)
        } else {
            Evaluation::deny(
                tenant.clone(),
                DenyReason::role_not_permitted(actor.role.as_str(), "register patients"),
            )
        };
        let target = Target {
            resource_type: Some(ResourceType::Patient),
            ..Target::default()
        };
        self.finish(ctx, AuditAction::AuthorizeRegisterPatient, target, Value::Null, Ok(evaluation))
            .await
    }

    /// May the actor perform `operation` on a shared, non-patient resource in `tenant`?
    pub async fn can_access_shared(
        &self,
        ctx: &RequestContext,
        tenant: &TenantId,
        resource_type: ResourceType,
        operation: PatientOperation,
    ) -> AuthResult<AccessDecision> {
        let actor = &ctx.actor;
        let evaluation = if actor.is_system_administrator() {
            Evaluation::allow(tenant.clone(), Basis::SystemAdministrator)
        } else if !actor.same_tenant(tenant) {
            Evaluation::tenant_mismatch(actor, tenant)
        } else {
            let permitted = shared_operations(actor);
            if permitted.contains(operation) {
                Evaluation::allow(tenant.clone(), Basis::Role)
            } else {
                Evaluation::deny(
                    tenant.clone(),
                    DenyReason::role_not_permitted(
                        actor.role.as_str(),
                        &format!("{operation} {resource_type}"),
                    ),
                )
            }
        };
        let target = Target {
            resource_type: Some(resource_type),
            ..Target::default()
        };
        self.finish(ctx, AuditAction::AuthorizeSharedAccess, target, json!({ "operation": operation }), Ok(evaluation))
            .await
    }

    /// May the actor make `provider` (or nobody) the patient's provider-of-record?
    ///
    /// Write access is not sufficient: only the current provider-of-record
    /// or an administrator may reassign the patient.
    pub async fn can_assign_provider(
        &self,
        ctx: &RequestContext,
        patient_id: &str,
        provider: Option<&str>,
    ) -> AuthResult<AccessDecision> {
        let result = self.evaluate_provider_change(&ctx.actor, patient_id, provider).await;
        let target = Target {
            patient_id: Some(patient_id),
            ..Target::default()
        };
        self.finish(ctx, AuditAction::AuthorizeProviderChange, target, json!({ "provider": provider }), result)
            .await
    }

    /// May the actor read the audit trail of `tenant`? Administrators only.
    pub async fn can_read_audit(&self, ctx: &RequestContext, tenant: &TenantId) -> AuthResult<AccessDecision> {
        let actor = &ctx.actor;
        let evaluation = if actor.is_system_administrator() {
            Evaluation::allow(tenant.clone(), Basis::SystemAdministrator)
        } else {
            Evaluation::deny(
                actor.tenant_id.clone(),
                DenyReason::role_not_permitted(actor.role.as_str(), "read the audit trail"),
            )
        };
        let inputs = json!({ "tenant": tenant.as_str() });
        self.finish(ctx, AuditAction::AuthorizeAuditTrail, Target::default(), inputs, Ok(evaluation))
            .await
    }

    /// Directory entry of `patient_id` as seen by `actor`.
    ///
    /// The actor's own tenant is searched first. Failing that, another
    /// tenant's entry is returned, which every non-administrator check turns
    /// into a tenant mismatch.
    pub async fn locate_patient(&self, actor: &Actor, patient_id: &str) -> AuthResult<Option<PatientRecord>> {
        if let Some(record) = self.directory.patient(&actor.tenant_id, patient_id).await? {
            return Ok(Some(record));
        }
        let tenants = self.directory.patient_tenants(patient_id).await?;
        let Some(other) = tenants.into_iter().find(|t| *t != actor.tenant_id) else {
            return Ok(None);
        };
        self.directory.patient(&other, patient_id).await
    }

    /// Record a denial decided outside the engine's own checks, such as an
    /// unscoped compartment search, so it is audited like any other decision.
    pub async fn deny(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        reason: DenyReason,
    ) -> AccessDecision {
        let target = Target {
            resource_type: Some(resource_type),
            ..Target::default()
        };
        let evaluation = Evaluation::deny(ctx.actor.tenant_id.clone(), reason);
        match self
            .finish(ctx, AuditAction::AuthorizePatientAccess, target, Value::Null, Ok(evaluation))
            .await
        {
            Ok(decision) => decision,
            Err(e) => AccessDecision::Deny(DenyReason::new("policy-error", e.to_string(), None)),
        }
    }

    async fn evaluate_patient_access(
        &self,
        actor: &Actor,
        patient_id: &str,
        operation: PatientOperation,
    ) -> AuthResult<Evaluation> {
        let record = self.locate_patient(actor, patient_id).await?;
        if actor.is_system_administrator() {
            let tenant = record.map_or_else(|| actor.tenant_id.clone(), |r| r.tenant_id);
            return Ok(Evaluation::allow(tenant, Basis::SystemAdministrator));
        }
        let Some(record) = record else {
            return Ok(Evaluation::deny(
                actor.tenant_id.clone(),
                DenyReason::patient_not_found(patient_id),
            ));
        };
        if !actor.same_tenant(&record.tenant_id) {
            return Ok(Evaluation::tenant_mismatch(actor, &record.tenant_id));
        }

        let effective = self.effective_access(actor, patient_id, &record).await?;
        let required = OperationSet::of(&[operation]);
        let evaluation = if effective.operations.contains(operation) {
            let basis = effective.basis_for(required);
            Evaluation::allow(record.tenant_id, basis).grants(effective.grant_ids)
        } else if effective.operations.is_empty() {
            Evaluation::deny(record.tenant_id, DenyReason::no_active_grant(operation))
        } else {
            Evaluation::deny(
                record.tenant_id,
                DenyReason::insufficient_level(operation, effective.operations),
            )
            .grants(effective.grant_ids)
        };
        Ok(evaluation)
    }

    async fn evaluate_grant(
        &self,
        actor: &Actor,
        patient_id: &str,
        grantee_user_id: &str,
        level: AccessLevel,
    ) -> AuthResult<Evaluation> {
        let Some(record) = self.locate_patient(actor, patient_id).await? else {
            return Ok(Evaluation::deny(
                actor.tenant_id.clone(),
                DenyReason::patient_not_found(patient_id),
            ));
        };
        if actor.is_system_administrator() {
            return Ok(Evaluation::allow(record.tenant_id, Basis::SystemAdministrator));
        }
        if !actor.same_tenant(&record.tenant_id) {
            return Ok(Evaluation::tenant_mismatch(actor, &record.tenant_id));
        }
        if let Some(grantee_tenant) = self.directory.user_tenant(grantee_user_id).await?
            && grantee_tenant != record.tenant_id
        {
            return Ok(Evaluation::deny(
                record.tenant_id.clone(),
                DenyReason::tenant_mismatch(grantee_tenant.as_str(), record.tenant_id.as_str()),
            ));
        }
        if !actor.is_provider() {
            return Ok(Evaluation::deny(
                record.tenant_id,
                DenyReason::role_not_permitted(actor.role.as_str(), "grant access"),
            ));
        }

        let effective = self.effective_access(actor, patient_id, &record).await?;
        if !effective.operations.contains(PatientOperation::Write) {
            return Ok(Evaluation::deny(
                record.tenant_id,
                DenyReason::insufficient_level(PatientOperation::Write, effective.operations),
            )
            .grants(effective.grant_ids));
        }
        let requested = level.permitted_operations();
        if !requested.is_subset_of(&effective.operations) {
            return Ok(Evaluation::deny(
                record.tenant_id,
                DenyReason::privilege_escalation(level, effective.operations),
            )
            .grants(effective.grant_ids));
        }
        let basis = effective.basis_for(requested);
        Ok(Evaluation::allow(record.tenant_id, basis).grants(effective.grant_ids))
    }

    async fn evaluate_provider_change(
        &self,
        actor: &Actor,
        patient_id: &str,
        provider: Option<&str>,
    ) -> AuthResult<Evaluation> {
        let Some(record) = self.locate_patient(actor, patient_id).await? else {
            return Ok(Evaluation::deny(
                actor.tenant_id.clone(),
                DenyReason::patient_not_found(patient_id),
            ));
        };
        if actor.is_system_administrator() {
            return Ok(Evaluation::allow(record.tenant_id, Basis::SystemAdministrator));
        }
        if !actor.same_tenant(&record.tenant_id) {
            return Ok(Evaluation::tenant_mismatch(actor, &record.tenant_id));
        }
        if actor.is_provider() && record.is_provider_of_record(actor.practitioner_id.as_deref()) {
            return Ok(Evaluation::allow(record.tenant_id, Basis::ProviderOfRecord));
        }
        let reason = DenyReason::provider_reassignment(record.provider_of_record.as_deref(), provider);
        Ok(Evaluation::deny(record.tenant_id, reason))
    }

    async fn evaluate_revoke(&self, actor: &Actor, grant_id: &str) -> AuthResult<Evaluation> {
        let Some(grant) = self.registry.get(grant_id).await? else {
            return Ok(Evaluation::deny(
                actor.tenant_id.clone(),
                DenyReason::grant_not_found(grant_id),
            ));
        };
        let evaluation = if actor.is_system_administrator() {
            Evaluation::allow(grant.tenant_id.clone(), Basis::SystemAdministrator)
        } else if !actor.same_tenant(&grant.tenant_id) {
            Evaluation::tenant_mismatch(actor, &grant.tenant_id)
        } else if grant.granted_by == actor.user_id {
            Evaluation::allow(grant.tenant_id.clone(), Basis::Granter)
        } else {
            Evaluation::deny(grant.tenant_id.clone(), DenyReason::not_granter())
        };
        Ok(evaluation.patient(grant.patient_id))
    }

    /// Union of provider-of-record rights and active grant levels.
    async fn effective_access(
        &self,
        actor: &Actor,
        patient_id: &str,
        record: &PatientRecord,
    ) -> AuthResult<EffectiveAccess> {
        let mut effective = EffectiveAccess::default();
        if actor.is_provider() && record.is_provider_of_record(actor.practitioner_id.as_deref()) {
            effective.provider_of_record = true;
            effective.operations = PROVIDER_OF_RECORD;
        }
        let grants = self
            .registry
            .active_grants(&actor.tenant_id, patient_id, &actor.user_id)
            .await?;
        for grant in grants {
            effective.operations = effective.operations.union(grant.level.permitted_operations());
            effective.grant_ids.push(grant.id);
        }
        Ok(effective)
    }

    /// Audit the evaluation and hand back the decision.
    async fn finish(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        target: Target<'_>,
        inputs: Value,
        result: AuthResult<Evaluation>,
    ) -> AuthResult<AccessDecision> {
        let evaluation = match result {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!(
                    action = action.to_subtype_code(),
                    actor = %ctx.actor.user_id,
                    error = %e,
                    "Authorization check failed"
                );
                let event = with_target(
                    AuditEventBuilder::new(ctx.actor.tenant_id.clone(), action).context(ctx),
                    &target,
                )
                .error(e.kind(), e.to_string());
                self.audit.record(event).await;
                return Err(e);
            }
        };

        let mut details = match inputs {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let Some(basis) = evaluation.basis {
            details.insert("basis".into(), Value::from(basis.as_str()));
        }
        if !evaluation.grant_ids.is_empty() {
            details.insert("grants".into(), json!(evaluation.grant_ids));
        }

        let mut event = with_target(
            AuditEventBuilder::new(evaluation.tenant.clone(), action).context(ctx),
            &target,
        );
        if target.patient_id.is_none()
            && let Some(patient_id) = &evaluation.patient_id
        {
            event = event.patient(patient_id);
        }

        match &evaluation.decision {
            AccessDecision::Allow => {
                tracing::debug!(
                    action = action.to_subtype_code(),
                    actor = %ctx.actor.user_id,
                    tenant = %evaluation.tenant,
                    decision = "allow",
                    basis = evaluation.basis.map(|b| b.as_str()),
                    "Authorization decision"
                );
                event = event.outcome(AuditOutcome::Allowed);
            }
            AccessDecision::Deny(reason) => {
                if reason.is_tenant_mismatch() {
                    tracing::warn!(
                        action = action.to_subtype_code(),
                        actor = %ctx.actor.user_id,
                        actor_tenant = %ctx.actor.tenant_id,
                        tenant = %evaluation.tenant,
                        "Cross-tenant access denied"
                    );
                } else {
                    tracing::debug!(
                        action = action.to_subtype_code(),
                        actor = %ctx.actor.user_id,
                        decision = "deny",
                        reason = %reason.code,
                        "Authorization decision"
                    );
                }
                if let Some(Value::Object(extra)) = &reason.details {
                    for (k, v) in extra {
                        details.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                }
                event = event.outcome(AuditOutcome::Denied).reason(&reason.code);
            }
        }

        self.audit.record(event.details(Value::Object(details))).await;
        Ok(evaluation.decision)
    }
}

fn with_target(mut event: AuditEventBuilder, target: &Target<'_>) -> AuditEventBuilder {
    if let Some(patient_id) = target.patient_id {
        event = event.patient(patient_id);
    }
    if let Some(grant_id) = target.grant_id {
        event = event.grant(grant_id);
    }
    if let Some(resource_type) = target.resource_type {
        event = event.resource(resource_type.as_str(), None);
    }
    event
}

/// Operations on shared (non-compartment) resources by role.
fn shared_operations(actor: &Actor) -> OperationSet {
    if actor.is_system_administrator() {
        OperationSet::of(&PatientOperation::ALL)
    } else if actor.is_provider() {
        PROVIDER_OF_RECORD
    } else {
        OperationSet::of(&[PatientOperation::Read])
    }
}
