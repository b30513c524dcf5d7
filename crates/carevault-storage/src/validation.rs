//! Structural validation seam.
//!
//! Full conformance validation lives outside this crate. [`VersionManager`]
//! only asks a [`ResourceValidator`] for a pass/fail verdict before accepting
//! a payload.
//!
//! [`VersionManager`]: crate::VersionManager

use carevault_core::ResourceType;
use serde::Serialize;
use serde_json::Value;

/// One problem found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted element path, empty for the resource root.
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Verdict of a structural check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, message));
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Single-line summary, e.g. `status: required; subject: must be a reference`.
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|i| {
                if i.path.is_empty() {
                    i.message.clone()
                } else {
                    format!("{}: {}", i.path, i.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Structural validator invoked before a payload is versioned.
pub trait ResourceValidator: Send + Sync {
    fn validate(&self, resource_type: ResourceType, payload: &Value) -> ValidationReport;
}

/// Accepts every payload. Useful where validation happened upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ResourceValidator for AcceptAll {
    fn validate(&self, _resource_type: ResourceType, _payload: &Value) -> ValidationReport {
        ValidationReport::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_summary() {
        let mut report = ValidationReport::ok();
        assert!(report.is_valid());
        report.push("status", "required");
        report.push("", "payload must be an object");
        assert!(!report.is_valid());
        assert_eq!(report.summary(), "status: required; payload must be an object");
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.validate(ResourceType::Patient, &json!(null)).is_valid());
    }
}
