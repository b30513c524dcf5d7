//! # carevault-auth
//!
//! Per-patient access grants and authorization for CareVault.
//!
//! This crate provides:
//! - Access levels and the operations each one permits
//! - The [`AccessGrantRegistry`] for issuing, revoking and querying grants
//! - The [`AuthorizationEngine`], the single allow/deny policy point
//! - Storage traits for grants and the patient/user directory
//!
//! ## Modules
//!
//! - [`types`] - Access levels, operations and grant records
//! - [`registry`] - Grant lifecycle
//! - [`policy`] - Authorization decisions
//! - [`storage`] - Storage traits for auth-related data
//! - [`error`] - Error types

pub mod error;
pub mod policy;
pub mod registry;
pub mod storage;
pub mod types;

pub use error::AuthError;
pub use policy::{AccessDecision, AuthorizationEngine, DenyReason};
pub use registry::AccessGrantRegistry;
pub use storage::{CareDirectory, GrantStore, PatientRecord, Revocation};
pub use types::{
    AccessGrant, AccessLevel, GrantFilter, GrantRequest, GrantState, OperationSet,
    PatientOperation,
};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use carevault_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::error::AuthError;
    pub use crate::policy::{AccessDecision, AuthorizationEngine, DenyReason};
    pub use crate::registry::AccessGrantRegistry;
    pub use crate::storage::{CareDirectory, GrantStore, PatientRecord, Revocation};
    pub use crate::types::{
        AccessGrant, AccessLevel, GrantFilter, GrantRequest, GrantState, OperationSet,
        PatientOperation,
    };
}
