//! Access levels and the operations they permit.
//!
//! Levels are a set, not a ladder: `EmergencyAccess` and `ResearchAccess` are
//! not "above" `FullAccess`. Each level maps to an explicit set of
//! [`PatientOperation`]s and all permission reasoning goes through those sets.
//!
//! | Level             | Read | Write | Delete | ManageAccess |
//! |-------------------|------|-------|--------|--------------|
//! | `ReadOnly`        | yes  |       |        |              |
//! | `ReadWrite`       | yes  | yes   |        |              |
//! | `FullAccess`      | yes  | yes   | yes    | yes          |
//! | `EmergencyAccess` | yes  | yes   |        |              |
//! | `ResearchAccess`  | yes  |       |        |              |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AuthError;

/// An operation on a patient's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatientOperation {
    Read,
    Write,
    Delete,
    ManageAccess,
}

impl PatientOperation {
    pub const ALL: [PatientOperation; 4] = [
        PatientOperation::Read,
        PatientOperation::Write,
        PatientOperation::Delete,
        PatientOperation::ManageAccess,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Delete => "Delete",
            Self::ManageAccess => "ManageAccess",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 1 << 1,
            Self::Delete => 1 << 2,
            Self::ManageAccess => 1 << 3,
        }
    }
}

impl fmt::Display for PatientOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of [`PatientOperation`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationSet(u8);

impl OperationSet {
    pub const EMPTY: OperationSet = OperationSet(0);

    pub const fn of(ops: &[PatientOperation]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < ops.len() {
            bits |= ops[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub fn contains(&self, op: PatientOperation) -> bool {
        self.0 & op.bit() != 0
    }

    #[must_use]
    pub fn union(self, other: OperationSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_subset_of(&self, other: &OperationSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = PatientOperation> + '_ {
        PatientOperation::ALL.into_iter().filter(|op| self.contains(*op))
    }
}

impl FromIterator<PatientOperation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = PatientOperation>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::EMPTY, |set, op| Self(set.0 | op.bit()))
    }
}

impl Serialize for OperationSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

const READ: OperationSet = OperationSet::of(&[PatientOperation::Read]);
const READ_WRITE: OperationSet = OperationSet::of(&[PatientOperation::Read, PatientOperation::Write]);
const ALL_OPERATIONS: OperationSet = OperationSet::of(&PatientOperation::ALL);

/// Operations a provider-of-record may perform on their own patient.
pub const PROVIDER_OF_RECORD: OperationSet = READ_WRITE;

/// Access level of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    ReadOnly,
    ReadWrite,
    FullAccess,
    /// Break-glass access; requires a justification.
    EmergencyAccess,
    ResearchAccess,
}

impl AccessLevel {
    pub fn permitted_operations(&self) -> OperationSet {
        match self {
            Self::ReadOnly | Self::ResearchAccess => READ,
            Self::ReadWrite | Self::EmergencyAccess => READ_WRITE,
            Self::FullAccess => ALL_OPERATIONS,
        }
    }

    pub fn permits(&self, op: PatientOperation) -> bool {
        self.permitted_operations().contains(op)
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::EmergencyAccess)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ReadOnly",
            Self::ReadWrite => "ReadWrite",
            Self::FullAccess => "FullAccess",
            Self::EmergencyAccess => "EmergencyAccess",
            Self::ResearchAccess => "ResearchAccess",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadOnly" => Ok(Self::ReadOnly),
            "ReadWrite" => Ok(Self::ReadWrite),
            "FullAccess" => Ok(Self::FullAccess),
            "EmergencyAccess" => Ok(Self::EmergencyAccess),
            "ResearchAccess" => Ok(Self::ResearchAccess),
            other => Err(AuthError::invalid_request(format!("unknown access level '{other}'"))),
        }
    }
}
