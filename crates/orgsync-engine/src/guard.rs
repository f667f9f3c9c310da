//! Tenant isolation guard.
//!
//! Every engine operation on organization-scoped data passes through here
//! first. Each check fails closed: anything that cannot be positively
//! authorized is denied, and every denial is written to the
//! `security_audit` log target before the error is returned.

use std::collections::BTreeSet;

use orgsync_core::error::{OrgSyncError, OrgSyncResult};
use orgsync_core::models::context::CallerContext;
use tracing::{debug, warn};
use uuid::Uuid;

/// Operations on a secret-store entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretOperation {
    Read,
    Write,
    Delete,
}

impl SecretOperation {
    fn as_str(self) -> &'static str {
        match self {
            SecretOperation::Read => "read_secret",
            SecretOperation::Write => "write_secret",
            SecretOperation::Delete => "delete_secret",
        }
    }
}

/// Stateless apart from the configured secret-name markers, so a single
/// instance is shared by every component.
#[derive(Debug, Clone)]
pub struct IsolationGuard {
    credential_secret_markers: Vec<String>,
}

impl IsolationGuard {
    pub fn new(credential_secret_markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            credential_secret_markers: credential_secret_markers
                .into_iter()
                .map(|m| m.to_ascii_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Allow when the caller is a super-administrator or bound to exactly
    /// `organization_id`.
    pub fn validate_organization_access(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
        operation: &str,
    ) -> OrgSyncResult<()> {
        if organization_id.is_nil() {
            return Err(deny(caller, operation, organization_id.to_string(), "nil organization id"));
        }
        if caller.is_super_admin() {
            debug!(
                actor = %caller.principal,
                operation,
                organization_id = %organization_id,
                "Super administrator access"
            );
            return Ok(());
        }
        match caller.organization_id {
            Some(own) if own == organization_id => Ok(()),
            Some(_) => Err(deny(
                caller,
                operation,
                organization_id.to_string(),
                "organization mismatch",
            )),
            None => Err(deny(
                caller,
                operation,
                organization_id.to_string(),
                "caller is not bound to an organization",
            )),
        }
    }

    /// Operations that are not scoped to one organization at all.
    pub fn validate_global_access(&self, caller: &CallerContext, operation: &str) -> OrgSyncResult<()> {
        if caller.is_super_admin() {
            return Ok(());
        }
        Err(deny(caller, operation, "*".into(), "operation spans every organization"))
    }

    /// Same as [`Self::validate_organization_access`] for an organization id
    /// received as text. Comparison is case-insensitive; unparseable input is
    /// denied.
    pub fn validate_organization_key(
        &self,
        caller: &CallerContext,
        organization_key: &str,
        operation: &str,
    ) -> OrgSyncResult<Uuid> {
        let organization_id = Uuid::parse_str(organization_key.trim()).map_err(|_| {
            deny(caller, operation, organization_key.to_string(), "malformed organization id")
        })?;
        self.validate_organization_access(caller, organization_id, operation)?;
        Ok(organization_id)
    }

    /// Check a single resource by the organization it belongs to.
    pub fn validate_resource_access<T>(
        &self,
        caller: &CallerContext,
        resource: &T,
        organization_of: impl Fn(&T) -> Uuid,
        operation: &str,
    ) -> OrgSyncResult<()> {
        self.validate_organization_access(caller, organization_of(resource), operation)
    }

    /// Check every element; one foreign element rejects the whole call.
    pub fn validate_resource_collection_access<T>(
        &self,
        caller: &CallerContext,
        resources: &[T],
        organization_of: impl Fn(&T) -> Uuid,
        operation: &str,
    ) -> OrgSyncResult<()> {
        for resource in resources {
            self.validate_organization_access(caller, organization_of(resource), operation)?;
        }
        Ok(())
    }

    /// A bulk operation must stay inside one organization. Collections that
    /// span organizations are rejected for every caller, super-administrators
    /// included; cross-tenant work goes through
    /// [`Self::validate_cross_organization_bulk_access`].
    pub fn validate_bulk_operation_access<T>(
        &self,
        caller: &CallerContext,
        resources: &[T],
        organization_of: impl Fn(&T) -> Uuid,
        operation: &str,
    ) -> OrgSyncResult<()> {
        let organizations: BTreeSet<Uuid> = resources.iter().map(&organization_of).collect();
        if organizations.len() > 1 {
            return Err(deny(
                caller,
                operation,
                join_ids(&organizations),
                &format!("bulk operation spans {} organizations", organizations.len()),
            ));
        }
        match organizations.first() {
            Some(organization_id) => {
                self.validate_organization_access(caller, *organization_id, operation)
            }
            None => Ok(()),
        }
    }

    /// Only super-administrators may move or compare data between two
    /// organizations.
    pub fn validate_cross_organization_operation(
        &self,
        caller: &CallerContext,
        source_organization_id: Uuid,
        target_organization_id: Uuid,
        operation: &str,
    ) -> OrgSyncResult<()> {
        if caller.is_super_admin() {
            warn!(
                target: "security_audit",
                actor = %caller.principal,
                operation,
                source_organization = %source_organization_id,
                target_organization = %target_organization_id,
                "Cross-organization operation authorized"
            );
            return Ok(());
        }
        Err(deny(
            caller,
            operation,
            format!("{source_organization_id}->{target_organization_id}"),
            "cross-organization operations require super administrator",
        ))
    }

    /// Explicit cross-tenant bulk path: super-administrator only, and every
    /// element must belong to either the source or the target organization.
    pub fn validate_cross_organization_bulk_access<T>(
        &self,
        caller: &CallerContext,
        resources: &[T],
        organization_of: impl Fn(&T) -> Uuid,
        source_organization_id: Uuid,
        target_organization_id: Uuid,
        operation: &str,
    ) -> OrgSyncResult<()> {
        self.validate_cross_organization_operation(
            caller,
            source_organization_id,
            target_organization_id,
            operation,
        )?;
        if let Some(stray) = resources
            .iter()
            .map(organization_of)
            .find(|org| *org != source_organization_id && *org != target_organization_id)
        {
            return Err(deny(
                caller,
                operation,
                stray.to_string(),
                "resource outside the source and target organizations",
            ));
        }
        Ok(())
    }

    /// Secret access: organization check first, then super-administrators are
    /// confined to database-credential secrets, and deletion needs the
    /// organization administrator role.
    pub fn validate_secret_access(
        &self,
        caller: &CallerContext,
        secret_name: &str,
        organization_id: Uuid,
        operation: SecretOperation,
    ) -> OrgSyncResult<()> {
        let op = operation.as_str();
        if secret_name.trim().is_empty() {
            return Err(deny(caller, op, organization_id.to_string(), "empty secret name"));
        }
        self.validate_organization_access(caller, organization_id, op)?;

        if caller.is_super_admin() && !self.is_credential_secret(secret_name) {
            return Err(deny(
                caller,
                op,
                organization_id.to_string(),
                "super administrators may only access database credential secrets",
            ));
        }
        if operation == SecretOperation::Delete && !caller.is_org_admin() {
            return Err(deny(
                caller,
                op,
                organization_id.to_string(),
                "secret deletion requires organization administrator",
            ));
        }
        Ok(())
    }

    fn is_credential_secret(&self, secret_name: &str) -> bool {
        let name = secret_name.to_ascii_lowercase();
        self.credential_secret_markers
            .iter()
            .any(|marker| name.contains(marker.as_str()))
    }
}

fn deny(caller: &CallerContext, operation: &str, requested: String, reason: &str) -> OrgSyncError {
    warn!(
        target: "security_audit",
        actor = %caller.principal,
        operation,
        caller_organization = ?caller.organization_id,
        requested_organization = %requested,
        reason,
        "Tenant isolation violation"
    );
    OrgSyncError::IsolationViolation {
        operation: operation.to_string(),
        actor: caller.principal.clone(),
        caller_organization: caller.organization_id,
        requested_organization: requested,
        reason: reason.to_string(),
    }
}

fn join_ids(ids: &BTreeSet<Uuid>) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",")
}
