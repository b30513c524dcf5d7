//! Access grant registry.
//!
//! The registry exclusively owns [`AccessGrant`]s. It validates and issues
//! grants, revokes them with idempotent `bool` signalling, and answers
//! activity questions against the injected clock. It does not authorize:
//! callers consult the [`AuthorizationEngine`] first.
//!
//! [`AuthorizationEngine`]: crate::policy::engine::AuthorizationEngine

use std::sync::Arc;

use carevault_core::audit::{AuditAction, AuditEventBuilder, AuditLog};
use carevault_core::{DynClock, Page, PageRequest, RequestContext, TenantId, generate_id};
use serde_json::json;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::storage::{GrantStore, Revocation};
use crate::types::{AccessGrant, GrantFilter, GrantRequest};
use crate::{AuthError, AuthResult};

/// Pure activity check: not revoked and not expired at `now`.
pub fn is_active(grant: &AccessGrant, now: OffsetDateTime) -> bool {
    grant.is_active(now)
}

#[derive(Clone)]
pub struct AccessGrantRegistry {
    store: Arc<dyn GrantStore>,
    audit: AuditLog,
    clock: DynClock,
}

impl AccessGrantRegistry {
    pub fn new(store: Arc<dyn GrantStore>, audit: AuditLog, clock: DynClock) -> Self {
        Self { store, audit, clock }
    }

    pub fn clock(&self) -> &DynClock {
        &self.clock
    }

    /// Issue a new grant on a patient living in `tenant`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` when:
    /// - patient or grantee id is blank
    /// - level is `EmergencyAccess` and the justification is blank
    /// - level is anything else and the purpose is blank
    /// - `expires_at` is not in the future
    pub async fn grant(
        &self,
        ctx: &RequestContext,
        tenant: &TenantId,
        request: GrantRequest,
    ) -> AuthResult<AccessGrant> {
        let now = self.clock.now();
        validate_request(&request, now)?;

        let grant = AccessGrant {
            id: generate_id(),
            tenant_id: tenant.clone(),
            patient_id: request.patient_id,
            grantee_user_id: request.grantee_user_id,
            level: request.level,
            granted_by: ctx.actor.user_id.clone(),
            granted_at: now,
            expires_at: request.expires_at,
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
            emergency_justification: non_blank(request.justification),
            purpose: non_blank(request.purpose),
        };
        self.store.insert(&grant).await?;

        tracing::info!(
            tenant = %grant.tenant_id,
            grant_id = %grant.id,
            patient = %grant.patient_id,
            grantee = %grant.grantee_user_id,
            level = %grant.level,
            "Access grant issued"
        );

        let mut event = AuditEventBuilder::new(grant.tenant_id.clone(), AuditAction::GrantCreate)
            .context(ctx)
            .patient(&grant.patient_id)
            .grant(&grant.id)
            .details(json!({
                "grantee": grant.grantee_user_id,
                "level": grant.level,
                "expiresAt": grant.expires_at.map(carevault_core::time::format_rfc3339),
                "justification": grant.emergency_justification,
                "purpose": grant.purpose,
            }));
        if grant.level.is_emergency() {
            event = event.reason("emergency-access");
        }
        self.audit.record(event).await;

        Ok(grant)
    }

    /// Revoke a grant.
    ///
    /// Returns `false` without error when the grant is missing or already
    /// revoked; the first revocation's stamp is kept.
    pub async fn revoke(
        &self,
        ctx: &RequestContext,
        grant_id: &str,
        reason: Option<String>,
    ) -> AuthResult<bool> {
        let revocation = Revocation {
            revoked_at: self.clock.now(),
            revoked_by: ctx.actor.user_id.clone(),
            reason: non_blank(reason),
        };
        let reason_text = revocation.reason.clone();
        if !self.store.revoke(grant_id, revocation).await? {
            tracing::debug!(grant_id = %grant_id, "Grant missing or already revoked");
            return Ok(false);
        }

        let Some(grant) = self.store.get(grant_id).await? else {
            return Err(AuthError::storage(format!("revoked grant {grant_id} vanished")));
        };
        tracing::info!(
            tenant = %grant.tenant_id,
            grant_id = %grant.id,
            actor = %ctx.actor.user_id,
            "Access grant revoked"
        );

        let mut event = AuditEventBuilder::new(grant.tenant_id.clone(), AuditAction::GrantRevoke)
            .context(ctx)
            .patient(&grant.patient_id)
            .grant(&grant.id);
        if let Some(reason) = reason_text {
            event = event.reason(reason);
        }
        self.audit.record(event).await;

        Ok(true)
    }

    pub async fn get(&self, grant_id: &str) -> AuthResult<Option<AccessGrant>> {
        self.store.get(grant_id).await
    }

    /// Page through grants matching `filter`; activity is evaluated now.
    pub async fn list_grants(
        &self,
        filter: &GrantFilter,
        page: PageRequest,
        cancel: &CancellationToken,
    ) -> AuthResult<Page<AccessGrant>> {
        let now = self.clock.now();
        let grants = self.store.find(filter, cancel).await?;
        let grants = grants
            .into_iter()
            .filter(|g| !filter.active_only || g.is_active(now))
            .collect();
        Ok(page.apply(grants))
    }

    /// Whether `grant` is active right now.
    pub fn is_active(&self, grant: &AccessGrant) -> bool {
        is_active(grant, self.clock.now())
    }

    /// Active grants of `user_id` on `patient_id` issued within `tenant`.
    ///
    /// Grants recorded under another tenant are ignored.
    pub async fn active_grants(
        &self,
        tenant: &TenantId,
        patient_id: &str,
        user_id: &str,
    ) -> AuthResult<Vec<AccessGrant>> {
        let filter = GrantFilter {
            patient_id: Some(patient_id.to_string()),
            user_id: Some(user_id.to_string()),
            ..GrantFilter::default()
        };
        let now = self.clock.now();
        let grants = self.store.find(&filter, &CancellationToken::new()).await?;
        Ok(grants
            .into_iter()
            .filter(|g| &g.tenant_id == tenant && g.is_active(now))
            .collect())
    }
}

fn validate_request(request: &GrantRequest, now: OffsetDateTime) -> AuthResult<()> {
    if request.patient_id.trim().is_empty() {
        return Err(AuthError::invalid_request("patientId is required"));
    }
    if request.grantee_user_id.trim().is_empty() {
        return Err(AuthError::invalid_request("granteeUserId is required"));
    }
    if request.level.is_emergency() {
        if is_blank(&request.justification) {
            return Err(AuthError::invalid_request(
                "EmergencyAccess requires a justification",
            ));
        }
    } else if is_blank(&request.purpose) {
        return Err(AuthError::invalid_request(format!(
            "{} requires a purpose",
            request.level
        )));
    }
    if let Some(expires_at) = request.expires_at
        && expires_at <= now
    {
        return Err(AuthError::invalid_request("expiresAt must be in the future"));
    }
    Ok(())
}

fn is_blank(text: &Option<String>) -> bool {
    text.as_deref().is_none_or(|t| t.trim().is_empty())
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
