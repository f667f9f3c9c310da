//! Database-specific error types and conversions.

use orgsync_core::error::OrgSyncError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for OrgSyncError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => OrgSyncError::NotFound { entity, id },
            other => OrgSyncError::Database(other.to_string()),
        }
    }
}
