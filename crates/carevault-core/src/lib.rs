//! # carevault-core
//!
//! Shared vocabulary for the CareVault clinical data store: resource types,
//! actor identity, the injectable clock, paging, the error taxonomy and the
//! audit trail every other crate writes to.

pub mod actor;
pub mod audit;
pub mod error;
pub mod fhir;
pub mod id;
pub mod paging;
pub mod time;

pub use actor::{Actor, RequestContext, Role, TenantId};
pub use error::{CoreError, ErrorKind, Result};
pub use fhir::{ResourceType, general_practitioner_of, patient_id_of};
pub use id::{generate_id, validate_id};
pub use paging::{Page, PageRequest};
pub use time::{Clock, DynClock, ManualClock, SystemClock, system_clock};
