//! # carevault-server
//!
//! HTTP surface of the CareVault clinical data store: configuration,
//! tracing setup, trusted-header identity, the [`ClinicalService`] that
//! authorizes every operation, and the axum router around it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod response;
pub mod server;
pub mod service;
pub mod validation;

pub use config::{AppConfig, AuditMode, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use middleware::Identity;
pub use observability::init_tracing;
pub use server::{AppState, CarevaultServer, ServerBuilder, build_app, build_state, router};
pub use service::{ClinicalService, PageQuery, Revoked, ServiceSettings};
pub use validation::BasicStructuralValidator;
