//! Clinical service: every external operation authorizes through the
//! [`AuthorizationEngine`] before touching the [`VersionManager`] or the
//! [`AccessGrantRegistry`].

use std::future::Future;
use std::sync::Arc;

use carevault_auth::{
    AccessDecision, AccessGrant, AccessGrantRegistry, AuthResult, AuthorizationEngine,
    CareDirectory, DenyReason, GrantFilter, GrantRequest, PatientOperation, PatientRecord,
};
use carevault_core::audit::{AuditAction, AuditEvent, AuditLog, AuditRange};
use carevault_core::{
    ErrorKind, Page, PageRequest, RequestContext, ResourceType, TenantId, general_practitioner_of,
    patient_id_of,
};
use carevault_storage::{ResourceVersion, SearchParams, StorageError, VersionManager};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, ApiResult};

/// Tunables the service reads from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub max_update_retries: u32,
    pub default_count: u32,
    pub max_count: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_update_retries: 3,
            default_count: carevault_core::paging::DEFAULT_PAGE_COUNT,
            max_count: 100,
        }
    }
}

/// Paging as requested by a caller, before clamping.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageQuery {
    pub offset: Option<u32>,
    pub count: Option<u32>,
}

/// Outcome of a revocation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revoked {
    /// False when the grant had already been revoked.
    pub revoked: bool,
    pub grant: AccessGrant,
}

/// Entry point for every clinical operation.
#[derive(Clone)]
pub struct ClinicalService {
    engine: AuthorizationEngine,
    versions: Arc<VersionManager>,
    directory: Arc<dyn CareDirectory>,
    audit: AuditLog,
    settings: ServiceSettings,
}

impl ClinicalService {
    pub fn new(
        engine: AuthorizationEngine,
        versions: Arc<VersionManager>,
        audit: AuditLog,
        settings: ServiceSettings,
    ) -> Self {
        let directory = engine.directory().clone();
        Self {
            engine,
            versions,
            directory,
            audit,
            settings,
        }
    }

    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    pub fn registry(&self) -> &AccessGrantRegistry {
        self.engine.registry()
    }

    pub fn versions(&self) -> &Arc<VersionManager> {
        &self.versions
    }

    pub fn settings(&self) -> ServiceSettings {
        self.settings
    }

    // ---- resources ----

    /// Create a resource in the actor's tenant.
    ///
    /// Creating a `Patient` registers it in the directory with its tenant and
    /// provider-of-record.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        payload: Value,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let result = self.create_inner(ctx, resource_type, payload, cancel).await;
        self.observe(ctx, resource_type, result).await
    }

    async fn create_inner(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        payload: Value,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        self.enter(ctx).await?;
        let tenant = ctx.actor.tenant_id.clone();
        let decision = match resource_type {
            ResourceType::Patient => self.engine.can_register_patient(ctx, &tenant).await,
            rt if rt.is_patient_compartment() => {
                let patient = require_patient(rt, &payload)?;
                self.engine.can_access_patient(ctx, &patient, PatientOperation::Write).await
            }
            rt => {
                self.engine
                    .can_access_shared(ctx, &tenant, rt, PatientOperation::Write)
                    .await
            }
        };
        authorized(decision)?;
        if resource_type == ResourceType::Patient {
            self.authorize_recreate(ctx, &payload).await?;
        }

        ensure_live(cancel)?;
        let created = self.versions.create(&tenant, resource_type, payload, ctx).await?;

        if resource_type == ResourceType::Patient {
            let provider = general_practitioner_of(&created.payload)
                .or_else(|| ctx.actor.practitioner_id.clone());
            self.directory
                .register_patient(&created.logical_id, PatientRecord::new(tenant, provider))
                .await?;
        }
        tracing::info!(
            tenant = %created.tenant_id,
            actor = %ctx.actor.user_id,
            resource_type = %resource_type,
            id = %created.logical_id,
            version = created.version,
            "Resource created"
        );
        Ok(created)
    }

    /// Current version of a live resource.
    pub async fn read(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            let current = self.authorize_existing(ctx, resource_type, id, PatientOperation::Read, cancel).await?;
            live(current)
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    /// Replace a resource.
    ///
    /// With `expected_version` the write is a single compare-and-append;
    /// without it the write goes through [`ClinicalService::update_with_retry`].
    pub async fn update(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        expected_version: Option<u64>,
        payload: Value,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let Some(expected) = expected_version else {
            return self.update_with_retry(ctx, resource_type, id, payload, cancel).await;
        };
        let result: ApiResult<_> = async {
            let current = self.prepare_update(ctx, resource_type, id, &payload, cancel).await?;
            ensure_live(cancel)?;
            let updated = self
                .versions
                .update(&ctx.actor.tenant_id, resource_type, id, expected, payload, ctx)
                .await?;
            self.after_update(&current, &updated).await?;
            Ok(updated)
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    /// Update that re-reads the current version and retries when another
    /// writer got there first, up to `max_update_retries` extra attempts.
    pub async fn update_with_retry(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        payload: Value,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let result: ApiResult<_> = async {
            let current = self.prepare_update(ctx, resource_type, id, &payload, cancel).await?;
            let tenant = &ctx.actor.tenant_id;
            let mut expected = current.version;
            let mut attempt = 0;
            loop {
                ensure_live(cancel)?;
                match self
                    .versions
                    .update(tenant, resource_type, id, expected, payload.clone(), ctx)
                    .await
                {
                    Err(StorageError::VersionConflict { actual, .. })
                        if attempt < self.settings.max_update_retries =>
                    {
                        attempt += 1;
                        tracing::debug!(
                            tenant = %tenant,
                            resource_type = %resource_type,
                            id = %id,
                            expected,
                            actual,
                            attempt,
                            "Version conflict, retrying update"
                        );
                        expected = actual;
                    }
                    Err(e) => return Err(e.into()),
                    Ok(updated) => {
                        self.after_update(&current, &updated).await?;
                        return Ok(updated);
                    }
                }
            }
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    /// Soft-delete a resource. Without `expected_version` the current version is used.
    pub async fn delete(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        expected_version: Option<u64>,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            let current = self
                .authorize_existing(ctx, resource_type, id, PatientOperation::Delete, cancel)
                .await?;
            let current = live(current)?;
            ensure_live(cancel)?;
            let expected = expected_version.unwrap_or(current.version);
            let tombstone = self
                .versions
                .soft_delete(&ctx.actor.tenant_id, resource_type, id, expected, ctx)
                .await?;
            tracing::info!(
                tenant = %tombstone.tenant_id,
                actor = %ctx.actor.user_id,
                resource_type = %resource_type,
                id = %id,
                version = tombstone.version,
                "Resource deleted"
            );
            Ok(tombstone)
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    /// Every version of a resource, tombstones included, ascending.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        cancel: &CancellationToken,
    ) -> ApiResult<Vec<ResourceVersion>> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            self.authorize_existing(ctx, resource_type, id, PatientOperation::Read, cancel)
                .await?;
            cancellable(
                cancel,
                self.versions.get_history(&ctx.actor.tenant_id, resource_type, id, cancel),
            )
            .await
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    /// One historical version. A tombstone version reads as gone.
    pub async fn version(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        version: u64,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            self.authorize_existing(ctx, resource_type, id, PatientOperation::Read, cancel)
                .await?;
            let found = cancellable(
                cancel,
                self.versions.get_version(&ctx.actor.tenant_id, resource_type, id, version),
            )
            .await?
            .ok_or_else(|| {
                StorageError::not_found(resource_type.as_str(), format!("{id}/_history/{version}"))
            })?;
            live(found)
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    /// Exact-match search over current live versions in the actor's tenant.
    ///
    /// Patient-compartment searches by non-administrators must name the
    /// patient with `patient` (or `_id` for `Patient`). One authorization
    /// decision is made per search.
    pub async fn search(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        filters: Vec<(String, String)>,
        page: PageQuery,
        cancel: &CancellationToken,
    ) -> ApiResult<Page<ResourceVersion>> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            let tenant = ctx.actor.tenant_id.clone();
            let params = filters
                .into_iter()
                .fold(SearchParams::new(), |p, (k, v)| p.with_param(k, v))
                .with_page(self.page_request(page));

            let decision = if resource_type.is_patient_compartment() {
                let patient = params.get("patient").or_else(|| {
                    (resource_type == ResourceType::Patient)
                        .then(|| params.get("_id"))
                        .flatten()
                });
                match patient {
                    Some(patient) => {
                        self.engine
                            .can_access_patient(ctx, patient, PatientOperation::Read)
                            .await
                    }
                    None if ctx.actor.is_system_administrator() => {
                        self.engine
                            .can_access_shared(ctx, &tenant, resource_type, PatientOperation::Read)
                            .await
                    }
                    None => Ok(self
                        .engine
                        .deny(ctx, resource_type, DenyReason::patient_scope_required(resource_type.as_str()))
                        .await),
                }
            } else {
                self.engine
                    .can_access_shared(ctx, &tenant, resource_type, PatientOperation::Read)
                    .await
            };
            authorized(decision)?;

            cancellable(
                cancel,
                self.versions.store().search(&tenant, resource_type, &params, cancel),
            )
            .await
        }
        .await;
        self.observe(ctx, resource_type, result).await
    }

    // ---- access grants ----

    /// Issue a grant on a patient, recorded in the patient's tenant.
    pub async fn grant_access(
        &self,
        ctx: &RequestContext,
        request: GrantRequest,
        cancel: &CancellationToken,
    ) -> ApiResult<AccessGrant> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            let decision = self
                .engine
                .can_grant_access(ctx, &request.patient_id, &request.grantee_user_id, request.level)
                .await;
            authorized(decision)?;

            let record = self
                .engine
                .locate_patient(&ctx.actor, &request.patient_id)
                .await?
                .ok_or_else(|| carevault_auth::AuthError::not_found("Patient", &request.patient_id))?;
            ensure_live(cancel)?;
            Ok(self.registry().grant(ctx, &record.tenant_id, request).await?)
        }
        .await;
        self.observe(ctx, ResourceType::Patient, result).await
    }

    /// Revoke a grant. Revoking twice keeps the first revocation.
    pub async fn revoke_access(
        &self,
        ctx: &RequestContext,
        grant_id: &str,
        reason: Option<String>,
        cancel: &CancellationToken,
    ) -> ApiResult<Revoked> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            authorized(self.engine.can_revoke_access(ctx, grant_id).await)?;
            ensure_live(cancel)?;
            let revoked = self.registry().revoke(ctx, grant_id, reason).await?;
            let grant = self
                .registry()
                .get(grant_id)
                .await?
                .ok_or_else(|| carevault_auth::AuthError::not_found("AccessGrant", grant_id))?;
            Ok(Revoked { revoked, grant })
        }
        .await;
        self.observe(ctx, ResourceType::Patient, result).await
    }

    /// Page through grants.
    ///
    /// Administrators see everything. Others must either filter by a patient
    /// they may read, or list their own grants.
    pub async fn list_grants(
        &self,
        ctx: &RequestContext,
        mut filter: GrantFilter,
        page: PageQuery,
        cancel: &CancellationToken,
    ) -> ApiResult<Page<AccessGrant>> {
        let result: ApiResult<_> = async {
            self.enter(ctx).await?;
            let actor = &ctx.actor;
            if !actor.is_system_administrator() {
                if let Some(patient) = filter.patient_id.clone() {
                    let decision = self
                        .engine
                        .can_access_patient(ctx, &patient, PatientOperation::Read)
                        .await;
                    authorized(decision)?;
                } else {
                    match filter.user_id.as_deref() {
                        None => filter.user_id = Some(actor.user_id.clone()),
                        Some(user) if user == actor.user_id => {}
                        Some(_) => {
                            let reason = DenyReason::role_not_permitted(
                                actor.role.as_str(),
                                "list another user's grants",
                            );
                            let decision = self.engine.deny(ctx, ResourceType::Patient, reason).await;
                            authorized(Ok(decision))?;
                        }
                    }
                }
            }
            let page = self.page_request(page);
            cancellable(cancel, self.registry().list_grants(&filter, page, cancel)).await
        }
        .await;
        self.observe(ctx, ResourceType::Patient, result).await
    }

    // ---- audit ----

    /// Chronological audit trail of a tenant. Administrators only.
    pub async fn audit_trail(
        &self,
        ctx: &RequestContext,
        tenant: Option<TenantId>,
        range: AuditRange,
        cancel: &CancellationToken,
    ) -> ApiResult<Vec<AuditEvent>> {
        self.enter(ctx).await?;
        let tenant = tenant.unwrap_or_else(|| ctx.actor.tenant_id.clone());
        authorized(self.engine.can_read_audit(ctx, &tenant).await)?;
        cancellable(cancel, self.audit.query(&tenant, range, cancel)).await
    }

    // ---- helpers ----

    /// Record the actor's tenant so grant checks can see it.
    async fn enter(&self, ctx: &RequestContext) -> ApiResult<()> {
        self.directory
            .register_user(&ctx.actor.user_id, &ctx.actor.tenant_id)
            .await?;
        Ok(())
    }

    fn page_request(&self, page: PageQuery) -> PageRequest {
        PageRequest::new(
            page.offset.unwrap_or(0),
            page.count.unwrap_or(self.settings.default_count),
        )
        .clamped(self.settings.max_count)
    }

    /// Load the current version of an existing chain and authorize `operation` on it.
    async fn authorize_existing(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        operation: PatientOperation,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        let tenant = &ctx.actor.tenant_id;
        let current = cancellable(cancel, self.versions.get_current(tenant, resource_type, id))
            .await?
            .ok_or_else(|| StorageError::not_found(resource_type.as_str(), id))?;

        let decision = if resource_type.is_patient_compartment() {
            let patient = self.patient_of(&current).await?;
            self.engine.can_access_patient(ctx, &patient, operation).await
        } else {
            self.engine
                .can_access_shared(ctx, tenant, resource_type, operation)
                .await
        };
        authorized(decision)?;
        Ok(current)
    }

    /// Patient owning a compartment resource. Tombstones carry no payload, so
    /// the last live version answers for them.
    async fn patient_of(&self, version: &ResourceVersion) -> ApiResult<String> {
        let found = patient_id_of(version.resource_type, Some(&version.logical_id), &version.payload);
        if let Some(patient) = found {
            return Ok(patient);
        }
        if version.deleted && version.version > 1 {
            let previous = self
                .versions
                .get_version(&version.tenant_id, version.resource_type, &version.logical_id, version.version - 1)
                .await?;
            if let Some(patient) = previous.and_then(|p| {
                patient_id_of(p.resource_type, Some(&p.logical_id), &p.payload)
            }) {
                return Ok(patient);
            }
        }
        Err(StorageError::invalid_resource(format!(
            "{}/{} has no patient reference",
            version.resource_type, version.logical_id
        ))
        .into())
    }

    /// Authorize an update against the stored resource and, when the payload
    /// moves it to another patient, against the new patient too.
    async fn prepare_update(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        id: &str,
        payload: &Value,
        cancel: &CancellationToken,
    ) -> ApiResult<ResourceVersion> {
        self.enter(ctx).await?;
        let current = self
            .authorize_existing(ctx, resource_type, id, PatientOperation::Write, cancel)
            .await?;
        let current = live(current)?;

        if resource_type == ResourceType::Patient {
            let requested = general_practitioner_of(payload);
            if requested != general_practitioner_of(&current.payload) {
                let record = self.directory.patient(&current.tenant_id, id).await?;
                let designated = record.and_then(|r| r.provider_of_record);
                if requested != designated {
                    let decision = self
                        .engine
                        .can_assign_provider(ctx, id, requested.as_deref())
                        .await;
                    authorized(decision)?;
                }
            }
        } else if resource_type.is_patient_compartment() {
            let target = require_patient(resource_type, payload)?;
            let owner = self.patient_of(&current).await?;
            if target != owner {
                let decision = self
                    .engine
                    .can_access_patient(ctx, &target, PatientOperation::Write)
                    .await;
                authorized(decision)?;
            }
        }
        Ok(current)
    }

    /// Re-creating a patient over a tombstone must not hand it to a new
    /// provider without the provider-of-record decision.
    async fn authorize_recreate(&self, ctx: &RequestContext, payload: &Value) -> ApiResult<()> {
        let Some(id) = payload.get("id").and_then(Value::as_str) else {
            return Ok(());
        };
        let tenant = &ctx.actor.tenant_id;
        let current = self.versions.get_current(tenant, ResourceType::Patient, id).await?;
        if !current.is_some_and(|v| v.deleted) {
            return Ok(());
        }
        let Some(record) = self.directory.patient(tenant, id).await? else {
            return Ok(());
        };
        let requested = general_practitioner_of(payload).or_else(|| ctx.actor.practitioner_id.clone());
        if requested != record.provider_of_record {
            authorized(self.engine.can_assign_provider(ctx, id, requested.as_deref()).await)?;
        }
        Ok(())
    }

    /// Keep the directory's provider-of-record in step with `generalPractitioner`.
    /// Dropping the element clears the provider-of-record.
    async fn after_update(&self, previous: &ResourceVersion, updated: &ResourceVersion) -> ApiResult<()> {
        if updated.resource_type != ResourceType::Patient {
            return Ok(());
        }
        let provider = general_practitioner_of(&updated.payload);
        if general_practitioner_of(&previous.payload) == provider {
            return Ok(());
        }
        tracing::info!(
            tenant = %updated.tenant_id,
            patient = %updated.logical_id,
            provider = provider.as_deref().unwrap_or("none"),
            "Provider-of-record changed"
        );
        self.directory
            .register_patient(
                &updated.logical_id,
                PatientRecord::new(updated.tenant_id.clone(), provider),
            )
            .await?;
        Ok(())
    }

    /// Audit and log storage failures before handing the result back.
    async fn observe<T>(
        &self,
        ctx: &RequestContext,
        resource_type: ResourceType,
        result: ApiResult<T>,
    ) -> ApiResult<T> {
        if let Err(e) = &result
            && e.kind() == ErrorKind::StorageFailure
        {
            tracing::error!(
                tenant = %ctx.actor.tenant_id,
                actor = %ctx.actor.user_id,
                resource_type = %resource_type,
                error = %e,
                "Storage failure"
            );
            let event = self
                .audit
                .event(ctx.actor.tenant_id.clone(), AuditAction::StorageFailure)
                .context(ctx)
                .resource(resource_type.as_str(), None)
                .error(ErrorKind::StorageFailure, e.to_string());
            self.audit.record(event).await;
        }
        result
    }
}

fn authorized(decision: AuthResult<AccessDecision>) -> ApiResult<()> {
    decision?.into_result()?;
    Ok(())
}

fn live(version: ResourceVersion) -> ApiResult<ResourceVersion> {
    if version.deleted {
        return Err(StorageError::gone(
            version.resource_type.as_str(),
            &version.logical_id,
            version.version,
        )
        .into());
    }
    Ok(version)
}

fn require_patient(resource_type: ResourceType, payload: &Value) -> ApiResult<String> {
    patient_id_of(resource_type, None, payload).ok_or_else(|| {
        ApiError::bad_request(format!("{resource_type} must reference a Patient"))
    })
}

fn ensure_live(cancel: &CancellationToken) -> ApiResult<()> {
    if cancel.is_cancelled() {
        return Err(ApiError::Cancelled);
    }
    Ok(())
}

/// Race `fut` against cancellation.
async fn cancellable<T, E>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, E>>,
) -> ApiResult<T>
where
    ApiError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        result = fut => result.map_err(ApiError::from),
    }
}
