//! OrgSync Engine: cross-store reconciliation and tenant isolation.
//!
//! Components, leaves first:
//! - [`context`]: resolves the caller's organization and roles
//! - [`guard`]: the single place tenant authorization is decided
//! - [`gateway`]: timeout-bounded adapters over the directory and secret store
//! - [`reconciler`]: capability assignments mirrored as directory memberships
//! - [`detector`]: side-effect-free orphan scans
//! - [`validator`]: per-organization state-sync validation
//! - [`cleanup`]: automatic low-risk repairs and recommendations
//! - [`scheduler`] and [`cache`]: background schedules and their results
//!
//! [`OrgSyncEngine`] wires all of them together.

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod detector;
mod engine;
pub mod gateway;
pub mod guard;
pub mod memory;
pub mod notify;
pub mod reconciler;
pub mod scheduler;
pub mod validator;

pub use config::EngineConfig;
pub use context::{PrincipalClaims, TenantContextResolver};
pub use engine::OrgSyncEngine;
pub use guard::{IsolationGuard, SecretOperation};
pub use reconciler::{AssignmentOutcome, AssignmentReconciler, CapabilityOutcome, CapabilityStatus};
