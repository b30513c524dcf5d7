//! Immutable audit trail.
//!
//! Every authorization decision and every committed mutation of a resource
//! version or access grant produces exactly one [`AuditEvent`]. Events are
//! appended through [`AuditLog`] into an [`AuditStore`] and never mutated.
//!
//! ```ignore
//! use carevault_core::audit::{AuditLog, AuditAction, AuditEventBuilder};
//!
//! let log = AuditLog::inline(store, clock);
//! log.record(AuditEventBuilder::for_actor(&actor, AuditAction::ResourceCreate)
//!     .resource("Patient", Some(id))
//!     .version(1))
//!     .await;
//! ```

pub mod event;
pub mod log;
pub mod store;

pub use event::{AuditAction, AuditEntity, AuditEvent, AuditEventBuilder, AuditOutcome};
pub use log::{AlertSink, AuditLog, AuditWriter, DEFAULT_AUDIT_QUEUE, TracingAlertSink};
pub use store::{AuditError, AuditRange, AuditStore};
