//! Database credential domain model.
//!
//! The secret material lives only in the secret store. The record holds
//! connection metadata plus the name and URI of the secret.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseCredential {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub server: String,
    pub database_name: String,
    pub username: String,
    /// Name of the secret in the secret store.
    pub secret_name: String,
    /// Versionless URI of the secret.
    pub secret_uri: String,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatabaseCredential {
    pub organization_id: Uuid,
    pub name: String,
    pub server: String,
    pub database_name: String,
    pub username: String,
    pub secret_name: String,
    pub secret_uri: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateDatabaseCredential {
    pub name: Option<String>,
    pub server: Option<String>,
    pub database_name: Option<String>,
    pub username: Option<String>,
    pub secret_name: Option<String>,
    pub secret_uri: Option<String>,
    pub is_active: Option<bool>,
}
