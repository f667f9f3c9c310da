//! Error types for the OrgSync system.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrgSyncError {
    /// A caller tried to touch data outside its authorized tenant scope.
    #[error(
        "Access denied: {actor} may not {operation} in organization {requested_organization} ({reason})"
    )]
    IsolationViolation {
        operation: String,
        actor: String,
        caller_organization: Option<Uuid>,
        requested_organization: String,
        reason: String,
    },

    #[error("External call to {service} failed during {operation}: {reason}")]
    ExternalCall {
        service: String,
        operation: String,
        reason: String,
    },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrgSyncError {
    /// True for errors that must be presented as an explicit access-denied
    /// outcome rather than a generic failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, OrgSyncError::IsolationViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrgSyncError::NotFound { .. })
    }
}

pub type OrgSyncResult<T> = Result<T, OrgSyncError>;
