//! Caller identity as resolved from the security context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CallerRole {
    /// Cross-tenant administrator.
    SuperAdmin,
    /// Administrator of the caller's own organization.
    OrgAdmin,
    Member,
}

/// The authenticated principal on whose behalf an operation runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallerContext {
    /// Stable principal identifier (object id, service name, ...).
    pub principal: String,
    pub email: Option<String>,
    /// `None` when the principal is not bound to any organization.
    pub organization_id: Option<Uuid>,
    pub roles: Vec<CallerRole>,
}

impl CallerContext {
    /// Principal used by background schedules.
    pub const SYSTEM_PRINCIPAL: &'static str = "system:orgsync";

    pub fn new(principal: impl Into<String>, organization_id: Option<Uuid>) -> Self {
        Self {
            principal: principal.into(),
            email: None,
            organization_id,
            roles: vec![CallerRole::Member],
        }
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = CallerRole>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    /// Identity of the in-process schedulers: a super-administrator that is
    /// not bound to any organization.
    pub fn system() -> Self {
        Self {
            principal: Self::SYSTEM_PRINCIPAL.into(),
            email: None,
            organization_id: None,
            roles: vec![CallerRole::SuperAdmin],
        }
    }

    pub fn has_role(&self, role: CallerRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_super_admin(&self) -> bool {
        self.has_role(CallerRole::SuperAdmin)
    }

    pub fn is_org_admin(&self) -> bool {
        self.has_role(CallerRole::OrgAdmin)
    }
}
