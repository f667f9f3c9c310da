//! Capability type ("agent type") domain model.
//!
//! Capability types are global; organizations opt in to a subset of them.
//! Each one is backed by exactly one directory security group, and granting
//! the capability means adding the user to that group.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityType {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Backing directory security group. `None` is a configuration error.
    pub directory_group_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCapabilityType {
    pub name: String,
    pub description: String,
    pub directory_group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCapabilityType {
    pub name: Option<String>,
    pub description: Option<String>,
    pub directory_group_id: Option<Option<String>>,
    pub is_active: Option<bool>,
}
