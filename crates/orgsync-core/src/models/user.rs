//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserStatus {
    /// Invitation sent; no directory account is expected yet.
    Invited,
    Active,
    Disabled,
}

/// An onboarded member of exactly one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    /// Object id of the user's account in the identity directory.
    pub directory_user_id: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub status: UserStatus,
    /// Database credentials assigned to this user. Every id must reference an
    /// existing, active credential of the same organization.
    pub database_credential_ids: Vec<Uuid>,
    /// Capability types granted to this user.
    pub capability_type_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub organization_id: Uuid,
    pub email: String,
    pub directory_user_id: Option<String>,
    pub status: UserStatus,
    pub database_credential_ids: Vec<Uuid>,
    pub capability_type_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub email: Option<String>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub directory_user_id: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub status: Option<UserStatus>,
    pub database_credential_ids: Option<Vec<Uuid>>,
    pub capability_type_ids: Option<Vec<Uuid>>,
}
