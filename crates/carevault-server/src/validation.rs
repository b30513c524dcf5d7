//! Structural resource validation.
//!
//! A small stand-in for full profile validation: it checks the
//! elements CareVault relies on (required status/code elements, the patient
//! reference of compartment resources, a few closed code sets) and nothing
//! else.

use carevault_core::{ResourceType, validate_id};
use carevault_storage::{ResourceValidator, ValidationReport};
use serde_json::Value;

/// Required elements and patient-reference element of one resource type.
struct Profile {
    required: &'static [&'static str],
    patient_reference: Option<&'static str>,
    codes: &'static [(&'static str, &'static [&'static str])],
}

const OBSERVATION_STATUS: &[&str] = &[
    "registered",
    "preliminary",
    "final",
    "amended",
    "corrected",
    "cancelled",
    "entered-in-error",
    "unknown",
];
const REQUEST_STATUS: &[&str] = &[
    "draft",
    "active",
    "on-hold",
    "revoked",
    "completed",
    "entered-in-error",
    "unknown",
];
const GENDER: &[&str] = &["male", "female", "other", "unknown"];

fn profile(resource_type: ResourceType) -> Profile {
    use ResourceType::*;
    match resource_type {
        Patient => Profile {
            required: &[],
            patient_reference: None,
            codes: &[("gender", GENDER)],
        },
        Practitioner | Organization | Medication => Profile {
            required: &[],
            patient_reference: None,
            codes: &[],
        },
        Observation => Profile {
            required: &["status", "code"],
            patient_reference: Some("subject"),
            codes: &[("status", OBSERVATION_STATUS)],
        },
        DiagnosticReport => Profile {
            required: &["status", "code"],
            patient_reference: Some("subject"),
            codes: &[],
        },
        Encounter | Procedure | DocumentReference => Profile {
            required: &["status"],
            patient_reference: Some("subject"),
            codes: &[],
        },
        Condition => Profile {
            required: &[],
            patient_reference: Some("subject"),
            codes: &[],
        },
        MedicationRequest => Profile {
            required: &["status", "intent"],
            patient_reference: Some("subject"),
            codes: &[],
        },
        CarePlan => Profile {
            required: &["status", "intent"],
            patient_reference: Some("subject"),
            codes: &[("status", REQUEST_STATUS)],
        },
        AllergyIntolerance => Profile {
            required: &[],
            patient_reference: Some("patient"),
            codes: &[],
        },
        Immunization => Profile {
            required: &["status"],
            patient_reference: Some("patient"),
            codes: &[],
        },
    }
}

/// Checks payload shape before a version is written.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicStructuralValidator;

impl ResourceValidator for BasicStructuralValidator {
    fn validate(&self, resource_type: ResourceType, payload: &Value) -> ValidationReport {
        let mut report = ValidationReport::ok();
        let Some(map) = payload.as_object() else {
            report.push("", "payload must be a JSON object");
            return report;
        };

        if let Some(id) = map.get("id") {
            match id.as_str() {
                Some(id) if validate_id(id).is_ok() => {}
                _ => report.push("id", "must be 1-64 characters of [A-Za-z0-9-.]"),
            }
        }
        if map.get("meta").is_some_and(|m| !m.is_object()) {
            report.push("meta", "must be an object");
        }

        let profile = profile(resource_type);
        for element in profile.required {
            if map.get(*element).is_none_or(is_empty) {
                report.push(*element, "required");
            }
        }
        if let Some(element) = profile.patient_reference {
            match map.get(element).and_then(|r| r.get("reference")).and_then(Value::as_str) {
                Some(reference) if reference.strip_prefix("Patient/").is_some_and(|id| !id.is_empty()) => {}
                Some(_) => report.push(element, "must reference a Patient"),
                None => report.push(element, "required"),
            }
        }
        for (element, allowed) in profile.codes {
            if let Some(value) = map.get(*element) {
                match value.as_str() {
                    Some(code) if allowed.contains(&code) => {}
                    _ => report.push(*element, format!("must be one of {}", allowed.join(", "))),
                }
            }
        }
        if resource_type == ResourceType::Patient
            && let Some(gps) = map.get("generalPractitioner")
        {
            let valid = gps.as_array().is_some_and(|refs| {
                refs.iter()
                    .all(|r| r.get("reference").and_then(Value::as_str).is_some())
            });
            if !valid {
                report.push("generalPractitioner", "must be a list of references");
            }
        }
        report
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
