//! Storage types for the resource version layer.

use carevault_core::{PageRequest, ResourceType, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use time::OffsetDateTime;

use crate::search_index::SearchIndex;

/// Identity of one logical resource, independent of version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainKey {
    pub tenant_id: TenantId,
    pub resource_type: ResourceType,
    pub logical_id: String,
}

impl ChainKey {
    pub fn new(tenant_id: TenantId, resource_type: ResourceType, logical_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            resource_type,
            logical_id: logical_id.into(),
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.tenant_id, self.resource_type, self.logical_id)
    }
}

/// One immutable entry of a version chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceVersion {
    pub tenant_id: TenantId,
    pub resource_type: ResourceType,
    pub logical_id: String,
    /// Starts at 1 and increases by exactly one per append.
    pub version: u64,
    /// Resource body, or a tombstone when `deleted` is set.
    pub payload: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    /// User id of the actor that appended this version.
    pub created_by: String,
    pub deleted: bool,
    #[serde(default)]
    pub search_index: SearchIndex,
}

impl ResourceVersion {
    pub fn key(&self) -> ChainKey {
        ChainKey::new(self.tenant_id.clone(), self.resource_type, self.logical_id.clone())
    }

    /// Weak ETag of this version, e.g. `W/"3"`.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version)
    }

    /// Visible to ordinary reads and search.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Exact-match search over current, live versions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// `(key, value)` pairs that must all match.
    pub filters: Vec<(String, String)>,
    pub page: PageRequest,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    /// Value of the first filter named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.filters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a current version satisfies every filter.
    pub fn matches(&self, version: &ResourceVersion) -> bool {
        version.is_live()
            && self
                .filters
                .iter()
                .all(|(k, v)| version.search_index.matches(k, v))
    }
}
