//! Storage traits for access-control data.
//!
//! This module defines storage interfaces for:
//!
//! - Per-patient access grants
//! - The care directory (patient tenancy, provider-of-record, user tenancy)
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `carevault-db-memory` - in-memory backend

pub mod directory;
pub mod grant;

pub use directory::{CareDirectory, PatientRecord};
pub use grant::{GrantStore, Revocation};
