use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use crate::error::CoreError;

/// Clinical resource types served by CareVault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Observation,
    Condition,
    AllergyIntolerance,
    DiagnosticReport,
    Medication,
    MedicationRequest,
    Procedure,
    Immunization,
    CarePlan,
    DocumentReference,
}

impl ResourceType {
    pub const ALL: [ResourceType; 14] = [
        ResourceType::Patient,
        ResourceType::Practitioner,
        ResourceType::Organization,
        ResourceType::Encounter,
        ResourceType::Observation,
        ResourceType::Condition,
        ResourceType::AllergyIntolerance,
        ResourceType::DiagnosticReport,
        ResourceType::Medication,
        ResourceType::MedicationRequest,
        ResourceType::Procedure,
        ResourceType::Immunization,
        ResourceType::CarePlan,
        ResourceType::DocumentReference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Organization => "Organization",
            ResourceType::Encounter => "Encounter",
            ResourceType::Observation => "Observation",
            ResourceType::Condition => "Condition",
            ResourceType::AllergyIntolerance => "AllergyIntolerance",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::Medication => "Medication",
            ResourceType::MedicationRequest => "MedicationRequest",
            ResourceType::Procedure => "Procedure",
            ResourceType::Immunization => "Immunization",
            ResourceType::CarePlan => "CarePlan",
            ResourceType::DocumentReference => "DocumentReference",
        }
    }

    /// Whether resources of this type belong to a patient's compartment
    /// and are therefore guarded by per-patient access grants.
    pub fn is_patient_compartment(&self) -> bool {
        !matches!(
            self,
            ResourceType::Practitioner | ResourceType::Organization | ResourceType::Medication
        )
    }

    /// Element holding the patient reference for compartment resources.
    fn patient_element(&self) -> Option<&'static str> {
        match self {
            ResourceType::Patient
            | ResourceType::Practitioner
            | ResourceType::Organization
            | ResourceType::Medication => None,
            ResourceType::AllergyIntolerance | ResourceType::Immunization => Some("patient"),
            _ => Some("subject"),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|rt| rt.as_str() == s)
            .ok_or_else(|| CoreError::invalid_resource_type(s))
    }
}

/// Resolve the patient a resource payload belongs to.
///
/// For `Patient` this is the logical id itself; for compartment resources it is
/// the id part of a `Patient/<id>` reference in `subject` or `patient`.
pub fn patient_id_of(resource_type: ResourceType, logical_id: Option<&str>, payload: &Value) -> Option<String> {
    if resource_type == ResourceType::Patient {
        return logical_id.map(String::from);
    }
    let element = resource_type.patient_element()?;
    payload
        .get(element)
        .and_then(|r| r.get("reference"))
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("Patient/"))
        .filter(|id| !id.is_empty())
        .map(String::from)
}

/// Extract the practitioner id from the first `generalPractitioner` reference.
pub fn general_practitioner_of(payload: &Value) -> Option<String> {
    payload
        .get("generalPractitioner")
        .and_then(Value::as_array)
        .and_then(|refs| refs.first())
        .and_then(|r| r.get("reference"))
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("Practitioner/"))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_type_round_trip_names() {
        for rt in ResourceType::ALL {
            assert_eq!(ResourceType::from_str(rt.as_str()).unwrap(), rt);
        }
        assert!(ResourceType::from_str("Spaceship").is_err());
        assert!(ResourceType::from_str("patient").is_err());
    }

    #[test]
    fn test_compartment_membership() {
        assert!(ResourceType::Observation.is_patient_compartment());
        assert!(ResourceType::Patient.is_patient_compartment());
        assert!(!ResourceType::Practitioner.is_patient_compartment());
        assert!(!ResourceType::Medication.is_patient_compartment());
    }

    #[test]
    fn test_patient_id_from_subject() {
        let obs = json!({"resourceType": "Observation", "subject": {"reference": "Patient/p-1"}});
        assert_eq!(patient_id_of(ResourceType::Observation, None, &obs), Some("p-1".into()));

        let allergy = json!({"resourceType": "AllergyIntolerance", "patient": {"reference": "Patient/p-2"}});
        assert_eq!(
            patient_id_of(ResourceType::AllergyIntolerance, None, &allergy),
            Some("p-2".into())
        );
    }

    #[test]
    fn test_patient_id_for_patient_is_logical_id() {
        let patient = json!({"resourceType": "Patient"});
        assert_eq!(patient_id_of(ResourceType::Patient, Some("p-9"), &patient), Some("p-9".into()));
    }

    #[test]
    fn test_patient_id_missing_or_foreign_reference() {
        let obs = json!({"resourceType": "Observation", "subject": {"reference": "Group/g-1"}});
        assert_eq!(patient_id_of(ResourceType::Observation, None, &obs), None);
        assert_eq!(patient_id_of(ResourceType::Observation, None, &json!({})), None);
    }

    #[test]
    fn test_general_practitioner() {
        let patient = json!({"generalPractitioner": [{"reference": "Practitioner/dr-1"}]});
        assert_eq!(general_practitioner_of(&patient), Some("dr-1".into()));
        assert_eq!(general_practitioner_of(&json!({})), None);
    }
}
