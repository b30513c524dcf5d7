//! Version chain management.
//!
//! [`VersionManager`] is the only write path into a [`ResourceStore`]. It
//! keeps every chain gap-free and ascending from 1, turns deletes into
//! tombstone versions, and serializes racing writers through the store's
//! compare-and-append primitive. Every committed append is audited.

use std::collections::HashSet;
use std::sync::Arc;

use carevault_core::audit::{AuditAction, AuditEventBuilder, AuditLog};
use carevault_core::time::format_rfc3339;
use carevault_core::{DynClock, RequestContext, ResourceType, TenantId, generate_id, patient_id_of, validate_id};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::error::StorageError;
use crate::search_index::SearchIndex;
use crate::traits::ResourceStore;
use crate::types::{ChainKey, ResourceVersion};
use crate::validation::ResourceValidator;

/// Enforces version chain invariants over a [`ResourceStore`].
#[derive(Clone)]
pub struct VersionManager {
    store: Arc<dyn ResourceStore>,
    validator: Arc<dyn ResourceValidator>,
    audit: AuditLog,
    clock: DynClock,
    client_assigned: HashSet<ResourceType>,
}

impl VersionManager {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        validator: Arc<dyn ResourceValidator>,
        audit: AuditLog,
        clock: DynClock,
    ) -> Self {
        Self {
            store,
            validator,
            audit,
            clock,
            client_assigned: HashSet::new(),
        }
    }

    /// Resource types whose logical id is supplied by the client on create.
    #[must_use]
    pub fn with_client_assigned_ids(mut self, types: impl IntoIterator<Item = ResourceType>) -> Self {
        self.client_assigned = types.into_iter().collect();
        self
    }

    pub fn requires_client_id(&self, resource_type: ResourceType) -> bool {
        self.client_assigned.contains(&resource_type)
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Create a new logical resource.
    ///
    /// Produces version 1, or the next version when re-creating over a
    /// soft-deleted chain.
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if the payload fails structural checks or a
    ///   client-assigned id is missing or malformed
    /// - `AlreadyExists` if a live resource with the same id exists
    pub async fn create(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        mut payload: Value,
        ctx: &RequestContext,
    ) -> Result<ResourceVersion, StorageError> {
        let logical_id = if self.requires_client_id(resource_type) {
            let id = payload
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    StorageError::invalid_resource(format!("{resource_type} requires a client-assigned id"))
                })?
                .to_string();
            validate_id(&id)?;
            id
        } else {
            generate_id()
        };
        self.check_payload(resource_type, &mut payload, None)?;

        let key = ChainKey::new(tenant.clone(), resource_type, logical_id.clone());
        let current = self.store.get_current(&key).await?;
        let expected = match &current {
            Some(existing) if existing.is_live() => {
                return Err(StorageError::already_exists(resource_type.as_str(), &logical_id));
            }
            Some(tombstone) => tombstone.version,
            None => 0,
        };

        let version = self.build_version(&key, expected + 1, payload, false, ctx);
        match self.store.compare_and_append(expected, &version).await {
            Ok(()) => {}
            Err(StorageError::VersionConflict { .. }) => {
                return Err(StorageError::already_exists(resource_type.as_str(), &logical_id));
            }
            Err(e) => return Err(e),
        }

        self.record(AuditAction::ResourceCreate, &version, &version.payload, ctx).await;
        Ok(version)
    }

    /// Append a new version with `payload`, provided the chain is still at
    /// `expected_version`.
    ///
    /// # Errors
    ///
    /// - `InvalidResource` if the payload fails structural checks
    /// - `NotFound` if the chain does not exist
    /// - `Gone` if the current version is a tombstone
    /// - `VersionConflict` if another writer got there first
    pub async fn update(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        logical_id: &str,
        expected_version: u64,
        mut payload: Value,
        ctx: &RequestContext,
    ) -> Result<ResourceVersion, StorageError> {
        self.check_payload(resource_type, &mut payload, Some(logical_id))?;

        let key = ChainKey::new(tenant.clone(), resource_type, logical_id);
        self.expect_live(&key, expected_version).await?;

        let version = self.build_version(&key, expected_version + 1, payload, false, ctx);
        self.store.compare_and_append(expected_version, &version).await?;

        self.record(AuditAction::ResourceUpdate, &version, &version.payload, ctx).await;
        Ok(version)
    }

    /// Append a tombstone version, provided the chain is still at
    /// `expected_version`. Prior versions stay readable through history.
    ///
    /// # Errors
    ///
    /// Same as [`VersionManager::update`] apart from payload validation.
    pub async fn soft_delete(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        logical_id: &str,
        expected_version: u64,
        ctx: &RequestContext,
    ) -> Result<ResourceVersion, StorageError> {
        let key = ChainKey::new(tenant.clone(), resource_type, logical_id);
        let previous = self.expect_live(&key, expected_version).await?;

        let tombstone = json!({ "resourceType": resource_type.as_str() });
        let version = self.build_version(&key, expected_version + 1, tombstone, true, ctx);
        self.store.compare_and_append(expected_version, &version).await?;

        self.record(AuditAction::ResourceDelete, &version, &previous.payload, ctx).await;
        Ok(version)
    }

    /// Highest version regardless of the delete flag.
    pub async fn get_current(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        logical_id: &str,
    ) -> Result<Option<ResourceVersion>, StorageError> {
        let key = ChainKey::new(tenant.clone(), resource_type, logical_id);
        self.store.get_current(&key).await
    }

    /// Full chain, ascending. Re-invoking yields a fresh enumeration.
    pub async fn get_history(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        logical_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceVersion>, StorageError> {
        let key = ChainKey::new(tenant.clone(), resource_type, logical_id);
        self.store.history(&key, cancel).await
    }

    pub async fn get_version(
        &self,
        tenant: &TenantId,
        resource_type: ResourceType,
        logical_id: &str,
        version: u64,
    ) -> Result<Option<ResourceVersion>, StorageError> {
        let key = ChainKey::new(tenant.clone(), resource_type, logical_id);
        self.store.get_version(&key, version).await
    }

    /// Load the current version and check it is live and at `expected`.
    async fn expect_live(&self, key: &ChainKey, expected: u64) -> Result<ResourceVersion, StorageError> {
        let current = self
            .store
            .get_current(key)
            .await?
            .ok_or_else(|| StorageError::not_found(key.resource_type.as_str(), &key.logical_id))?;
        if current.deleted {
            return Err(StorageError::gone(
                key.resource_type.as_str(),
                &key.logical_id,
                current.version,
            ));
        }
        if current.version != expected {
            return Err(StorageError::version_conflict(expected, current.version));
        }
        Ok(current)
    }

    fn check_payload(
        &self,
        resource_type: ResourceType,
        payload: &mut Value,
        logical_id: Option<&str>,
    ) -> Result<(), StorageError> {
        let Some(map) = payload.as_object_mut() else {
            return Err(StorageError::invalid_resource("payload must be a JSON object"));
        };
        match map.get("resourceType").and_then(Value::as_str) {
            Some(declared) if declared != resource_type.as_str() => {
                return Err(StorageError::invalid_resource(format!(
                    "resourceType '{declared}' does not match {resource_type}"
                )));
            }
            Some(_) => {}
            None => {
                map.insert("resourceType".into(), Value::from(resource_type.as_str()));
            }
        }
        if let (Some(expected), Some(declared)) = (logical_id, map.get("id").and_then(Value::as_str))
            && declared != expected
        {
            return Err(StorageError::invalid_resource(format!(
                "payload id '{declared}' does not match '{expected}'"
            )));
        }

        let report = self.validator.validate(resource_type, payload);
        if !report.is_valid() {
            return Err(StorageError::invalid_resource(report.summary()));
        }
        Ok(())
    }

    fn build_version(
        &self,
        key: &ChainKey,
        version: u64,
        mut payload: Value,
        deleted: bool,
        ctx: &RequestContext,
    ) -> ResourceVersion {
        let now = self.clock.now();
        stamp(&mut payload, &key.logical_id, version, now);
        let search_index = if deleted {
            SearchIndex::default()
        } else {
            SearchIndex::extract(key.resource_type, &key.logical_id, &payload)
        };
        ResourceVersion {
            tenant_id: key.tenant_id.clone(),
            resource_type: key.resource_type,
            logical_id: key.logical_id.clone(),
            version,
            payload,
            last_modified: now,
            created_by: ctx.actor.user_id.clone(),
            deleted,
            search_index,
        }
    }

    async fn record(
        &self,
        action: AuditAction,
        version: &ResourceVersion,
        patient_source: &Value,
        ctx: &RequestContext,
    ) {
        tracing::debug!(
            tenant = %version.tenant_id,
            resource_type = %version.resource_type,
            id = %version.logical_id,
            version = version.version,
            deleted = version.deleted,
            "Resource version appended"
        );
        let mut event = AuditEventBuilder::new(version.tenant_id.clone(), action)
            .context(ctx)
            .resource(version.resource_type.as_str(), Some(version.logical_id.clone()))
            .version(version.version);
        if let Some(patient) =
            patient_id_of(version.resource_type, Some(&version.logical_id), patient_source)
        {
            event = event.patient(patient);
        }
        self.audit.record(event).await;
    }
}

/// Write `id` and `meta.versionId`/`meta.lastUpdated` into the payload.
fn stamp(payload: &mut Value, logical_id: &str, version: u64, now: OffsetDateTime) {
    let Some(map) = payload.as_object_mut() else {
        return;
    };
    map.insert("id".into(), Value::from(logical_id));
    let meta = map
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    if let Some(meta) = meta.as_object_mut() {
        meta.insert("versionId".into(), Value::from(version.to_string()));
        meta.insert("lastUpdated".into(), Value::from(format_rfc3339(now)));
    }
}
