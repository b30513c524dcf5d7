//! Common types used across the access grant and authorization modules.
//!
//! ## Domain Types
//!
//! - [`AccessLevel`] - Grant level with its permitted-operations set
//! - [`PatientOperation`] - What an actor wants to do with patient data
//! - [`AccessGrant`] - Per-(patient, user) authorization record

pub mod access;
pub mod grant;

pub use access::{AccessLevel, OperationSet, PatientOperation};
pub use grant::{AccessGrant, GrantFilter, GrantRequest, GrantState};
