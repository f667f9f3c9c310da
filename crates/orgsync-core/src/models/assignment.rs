//! Capability assignment records.
//!
//! An assignment mirrors one directory group membership: (user, capability
//! type, directory group) scoped to one organization. Rows are never hard
//! deleted; they move between [`AssignmentState::Active`] and
//! [`AssignmentState::Inactive`] so history is kept and reactivation is a
//! state flip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub capability_type_id: Uuid,
    pub directory_group_id: String,
    pub state: AssignmentState,
    /// Principal that last activated the assignment.
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.state == AssignmentState::Active
    }
}

/// Fields required to record a new (active) assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssignment {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub capability_type_id: Uuid,
    pub directory_group_id: String,
    pub assigned_by: String,
}
