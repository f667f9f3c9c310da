//! Domain models for OrgSync.
//!
//! Persistent entities (organizations, users, capability types, assignments,
//! database credentials) plus the ephemeral result types produced by the
//! reconciliation engine.

pub mod assignment;
pub mod capability;
pub mod cleanup;
pub mod context;
pub mod credential;
pub mod finding;
pub mod organization;
pub mod user;
pub mod validation;
