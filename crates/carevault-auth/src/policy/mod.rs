//! Authorization policy.
//!
//! Patient data access is decided by [`AuthorizationEngine`] from the actor's
//! role, tenant, provider-of-record status and active access grants.

pub mod engine;

pub use engine::{AccessDecision, AuthorizationEngine, DenyReason};
