//! Search index extraction.
//!
//! Flattens a resource payload into `dotted.path -> {values}` pairs used for
//! exact-match search. Arrays are traversed transparently, so
//! `name[0].family` and `name[1].family` both index under `name.family`.

use std::collections::{BTreeMap, BTreeSet};

use carevault_core::{ResourceType, patient_id_of};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under which the owning patient id is indexed.
pub const PATIENT_KEY: &str = "patient";

/// Key under which the logical id is indexed.
pub const ID_KEY: &str = "_id";

/// Elements that never take part in search.
const SKIPPED: &[&str] = &["meta", "text"];

/// Flattened key/value extraction of one resource version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchIndex(BTreeMap<String, BTreeSet<String>>);

impl SearchIndex {
    /// Extract the index of a live resource payload.
    pub fn extract(resource_type: ResourceType, logical_id: &str, payload: &Value) -> Self {
        let mut index = Self::default();
        if let Value::Object(map) = payload {
            for (key, value) in map {
                if key == "resourceType" || SKIPPED.contains(&key.as_str()) {
                    continue;
                }
                flatten(key, value, &mut index);
            }
        }
        index.insert(ID_KEY, logical_id);
        if let Some(patient) = patient_id_of(resource_type, Some(logical_id), payload) {
            index.insert(PATIENT_KEY, &patient);
        }
        index
    }

    fn insert(&mut self, key: &str, value: &str) {
        self.0
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string());
    }

    /// Values indexed under `key`.
    pub fn values(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.0.get(key)
    }

    /// Whether `key` carries exactly `value` among its values.
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.0.get(key).is_some_and(|values| values.contains(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn flatten(path: &str, value: &Value, index: &mut SearchIndex) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{path}.{key}"), child, index);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten(path, item, index);
            }
        }
        Value::String(s) if !s.is_empty() => index.insert(path, s),
        Value::Number(n) => index.insert(path, &n.to_string()),
        Value::Bool(b) => index.insert(path, if *b { "true" } else { "false" }),
        _ => {}
    }
}
