//! Assignment reconciliation.
//!
//! A capability assignment is held twice: as a row in the relational store
//! and as a membership in the capability's backing directory group. The
//! directory is always mutated first and the row only follows a confirmed
//! directory result, so a failed call leaves the row untouched and a later
//! retry converges.
//!
//! Bulk operations never abort on a single item: every capability gets its
//! own [`CapabilityOutcome`].

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use orgsync_core::error::{OrgSyncError, OrgSyncResult};
use orgsync_core::gateway::DirectoryGateway;
use orgsync_core::models::assignment::{Assignment, CreateAssignment};
use orgsync_core::models::context::CallerContext;
use orgsync_core::models::organization::Organization;
use orgsync_core::models::user::{UpdateUser, User, UserStatus};
use orgsync_core::repository::{
    AssignmentRepository, CapabilityTypeRepository, OrganizationRepository, Repositories,
    UserRepository,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::guard::IsolationGuard;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CapabilityStatus {
    Assigned,
    /// An inactive row was flipped back to active.
    Reactivated,
    AlreadyAssigned,
    Removed,
    AlreadyRemoved,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityOutcome {
    pub capability_type_id: Uuid,
    pub directory_group_id: Option<String>,
    pub status: CapabilityStatus,
}

impl CapabilityOutcome {
    fn new(capability_type_id: Uuid, directory_group_id: Option<&str>, status: CapabilityStatus) -> Self {
        Self {
            capability_type_id,
            directory_group_id: directory_group_id.map(str::to_string),
            status,
        }
    }

    fn failed(capability_type_id: Uuid, directory_group_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::new(
            capability_type_id,
            directory_group_id,
            CapabilityStatus::Failed {
                reason: reason.into(),
            },
        )
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, CapabilityStatus::Failed { .. })
    }
}

/// Aggregate of one bulk assignment operation.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentOutcome {
    pub organization_id: Uuid,
    pub user_id: Uuid,
    pub results: Vec<CapabilityOutcome>,
}

impl AssignmentOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// True when at least one item succeeded, or there was nothing to do.
    pub fn is_success(&self) -> bool {
        self.results.is_empty() || self.succeeded() > 0
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Human-readable count, e.g. `"7/10 succeeded"`.
    pub fn summary(&self) -> String {
        format!("{}/{} succeeded", self.succeeded(), self.results.len())
    }

    pub fn failures(&self) -> impl Iterator<Item = &CapabilityOutcome> {
        self.results.iter().filter(|r| !r.is_success())
    }
}

/// Result of a user deactivation or reactivation.
#[derive(Debug, Clone, Serialize)]
pub struct UserLifecycleOutcome {
    pub assignments: AssignmentOutcome,
    /// Whether the user's active flag was flipped. Only happens when every
    /// directory operation succeeded.
    pub state_changed: bool,
}

pub struct AssignmentReconciler<R: Repositories, D: DirectoryGateway> {
    repos: Arc<R>,
    directory: Arc<D>,
    guard: Arc<IsolationGuard>,
    fan_out: usize,
}

impl<R: Repositories, D: DirectoryGateway> AssignmentReconciler<R, D> {
    pub fn new(repos: Arc<R>, directory: Arc<D>, guard: Arc<IsolationGuard>, fan_out: usize) -> Self {
        Self {
            repos,
            directory,
            guard,
            fan_out: fan_out.max(1),
        }
    }

    /// Grant each capability: directory membership first, then an active
    /// row. Already-active rows are reported and left alone.
    pub async fn assign_user_to_capabilities(
        &self,
        caller: &CallerContext,
        user_id: Uuid,
        capability_type_ids: &[Uuid],
        organization_id: Uuid,
    ) -> OrgSyncResult<AssignmentOutcome> {
        const OP: &str = "assign_capabilities";
        let (organization, user, directory_user_id) =
            self.load_subject(caller, user_id, organization_id, OP).await?;

        let results = self
            .grant_all(&organization, &user, &directory_user_id, &dedup(capability_type_ids), &caller.principal)
            .await;
        self.sync_user_capabilities(organization_id, user_id).await;

        let outcome = AssignmentOutcome {
            organization_id,
            user_id,
            results,
        };
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            result = %outcome.summary(),
            "Capability assignment finished"
        );
        Ok(outcome)
    }

    /// Revoke every active assignment of the user.
    pub async fn remove_user_from_capabilities(
        &self,
        caller: &CallerContext,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> OrgSyncResult<AssignmentOutcome> {
        const OP: &str = "remove_capabilities";
        let (_, user, directory_user_id) =
            self.load_subject(caller, user_id, organization_id, OP).await?;

        let active = self.active_assignments(organization_id, user.id).await?;
        let results = self.revoke_all(&directory_user_id, active, &HashSet::new()).await;
        self.sync_user_capabilities(organization_id, user_id).await;

        let outcome = AssignmentOutcome {
            organization_id,
            user_id,
            results,
        };
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            result = %outcome.summary(),
            "Capability removal finished"
        );
        Ok(outcome)
    }

    /// Converge the user's active assignments to exactly `desired`: grant
    /// what is missing, revoke what is no longer wanted, leave the rest.
    /// Calling it twice with the same set is a no-op the second time.
    pub async fn update_assignments(
        &self,
        caller: &CallerContext,
        user_id: Uuid,
        desired: &[Uuid],
        organization_id: Uuid,
    ) -> OrgSyncResult<AssignmentOutcome> {
        const OP: &str = "update_assignments";
        let (organization, user, directory_user_id) =
            self.load_subject(caller, user_id, organization_id, OP).await?;

        let desired = dedup(desired);
        let wanted: HashSet<Uuid> = desired.iter().copied().collect();
        let active = self.active_assignments(organization_id, user.id).await?;
        let current: HashSet<Uuid> = active.iter().map(|a| a.capability_type_id).collect();

        let to_add: Vec<Uuid> = desired.into_iter().filter(|id| !current.contains(id)).collect();
        let (to_remove, kept): (Vec<Assignment>, Vec<Assignment>) = active
            .into_iter()
            .partition(|a| !wanted.contains(&a.capability_type_id));
        // Groups still backing a kept assignment must keep the membership.
        let retained: HashSet<String> = kept.into_iter().map(|a| a.directory_group_id).collect();

        // Revocations run first so that a grant on a shared group re-adds
        // the membership a revocation just removed.
        let mut results = self.revoke_all(&directory_user_id, to_remove, &retained).await;
        results.extend(
            self.grant_all(&organization, &user, &directory_user_id, &to_add, &caller.principal)
                .await,
        );
        self.sync_user_capabilities(organization_id, user_id).await;

        let outcome = AssignmentOutcome {
            organization_id,
            user_id,
            results,
        };
        info!(
            organization_id = %organization_id,
            user_id = %user_id,
            result = %outcome.summary(),
            "Assignment update finished"
        );
        Ok(outcome)
    }

    /// Revoke every active assignment, then clear the active flag, but only
    /// if every revocation succeeded. The user's capability set is kept so
    /// that [`Self::reactivate_user`] can restore it.
    pub async fn deactivate_user(
        &self,
        caller: &CallerContext,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> OrgSyncResult<UserLifecycleOutcome> {
        const OP: &str = "deactivate_user";
        let (_, user, directory_user_id) =
            self.load_subject(caller, user_id, organization_id, OP).await?;

        let active = self.active_assignments(organization_id, user.id).await?;
        let assignments = AssignmentOutcome {
            organization_id,
            user_id,
            results: self.revoke_all(&directory_user_id, active, &HashSet::new()).await,
        };

        if !assignments.all_succeeded() {
            warn!(
                organization_id = %organization_id,
                user_id = %user_id,
                result = %assignments.summary(),
                "User left active: not every membership could be removed"
            );
            return Ok(UserLifecycleOutcome {
                assignments,
                state_changed: false,
            });
        }

        self.repos
            .users()
            .update(
                organization_id,
                user_id,
                UpdateUser {
                    is_active: Some(false),
                    status: Some(UserStatus::Disabled),
                    ..Default::default()
                },
            )
            .await?;
        info!(organization_id = %organization_id, user_id = %user_id, "User deactivated");
        Ok(UserLifecycleOutcome {
            assignments,
            state_changed: true,
        })
    }

    /// Re-grant the user's recorded capabilities, then set the active flag
    /// if every grant succeeded.
    pub async fn reactivate_user(
        &self,
        caller: &CallerContext,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> OrgSyncResult<UserLifecycleOutcome> {
        const OP: &str = "reactivate_user";
        let (organization, user, directory_user_id) =
            self.load_subject(caller, user_id, organization_id, OP).await?;

        let results = self
            .grant_all(
                &organization,
                &user,
                &directory_user_id,
                &dedup(&user.capability_type_ids),
                &caller.principal,
            )
            .await;
        let assignments = AssignmentOutcome {
            organization_id,
            user_id,
            results,
        };

        if !assignments.all_succeeded() {
            warn!(
                organization_id = %organization_id,
                user_id = %user_id,
                result = %assignments.summary(),
                "User left inactive: not every membership could be restored"
            );
            return Ok(UserLifecycleOutcome {
                assignments,
                state_changed: false,
            });
        }

        self.repos
            .users()
            .update(
                organization_id,
                user_id,
                UpdateUser {
                    is_active: Some(true),
                    status: Some(UserStatus::Active),
                    ..Default::default()
                },
            )
            .await?;
        info!(organization_id = %organization_id, user_id = %user_id, "User reactivated");
        Ok(UserLifecycleOutcome {
            assignments,
            state_changed: true,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Authorize, then load the organization and the user through the
    /// organization-scoped lookup.
    async fn load_subject(
        &self,
        caller: &CallerContext,
        user_id: Uuid,
        organization_id: Uuid,
        operation: &str,
    ) -> OrgSyncResult<(Organization, User, String)> {
        self.guard
            .validate_organization_access(caller, organization_id, operation)?;

        let user = self.repos.users().get_by_id(organization_id, user_id).await?;
        self.guard
            .validate_resource_access(caller, &user, |u| u.organization_id, operation)?;
        if user.is_deleted {
            return Err(OrgSyncError::Validation {
                message: format!("user {user_id} is deleted"),
            });
        }
        let directory_user_id = user.directory_user_id.clone().ok_or_else(|| {
            OrgSyncError::Configuration(format!("user {user_id} has no directory account"))
        })?;

        let organization = self.repos.organizations().get_by_id(organization_id).await?;
        Ok((organization, user, directory_user_id))
    }

    async fn active_assignments(&self, organization_id: Uuid, user_id: Uuid) -> OrgSyncResult<Vec<Assignment>> {
        Ok(self
            .repos
            .assignments()
            .list_for_user(organization_id, user_id)
            .await?
            .into_iter()
            .filter(Assignment::is_active)
            .collect())
    }

    async fn grant_all(
        &self,
        organization: &Organization,
        user: &User,
        directory_user_id: &str,
        capability_type_ids: &[Uuid],
        actor: &str,
    ) -> Vec<CapabilityOutcome> {
        stream::iter(capability_type_ids.iter().copied())
            .map(move |capability_type_id| {
                self.grant(organization, user, directory_user_id, capability_type_id, actor)
            })
            .buffered(self.fan_out)
            .collect()
            .await
    }

    async fn revoke_all(
        &self,
        directory_user_id: &str,
        assignments: Vec<Assignment>,
        retained_groups: &HashSet<String>,
    ) -> Vec<CapabilityOutcome> {
        stream::iter(assignments)
            .map(move |assignment| self.revoke(directory_user_id, assignment, retained_groups))
            .buffered(self.fan_out)
            .collect()
            .await
    }

    async fn grant(
        &self,
        organization: &Organization,
        user: &User,
        directory_user_id: &str,
        capability_type_id: Uuid,
        actor: &str,
    ) -> CapabilityOutcome {
        // 1. Resolve the backing group; configuration problems fail this item only.
        let capability = match self.repos.capability_types().get_by_id(capability_type_id).await {
            Ok(c) => c,
            Err(e) => return CapabilityOutcome::failed(capability_type_id, None, e.to_string()),
        };
        if !capability.is_active {
            return CapabilityOutcome::failed(capability_type_id, None, "capability type is inactive");
        }
        if !organization.has_capability(capability_type_id) {
            return CapabilityOutcome::failed(
                capability_type_id,
                None,
                OrgSyncError::Configuration("capability type not enabled for organization".into())
                    .to_string(),
            );
        }
        let Some(group) = capability.directory_group_id.as_deref() else {
            return CapabilityOutcome::failed(
                capability_type_id,
                None,
                OrgSyncError::Configuration(format!(
                    "capability type {} has no backing directory group",
                    capability.name
                ))
                .to_string(),
            );
        };

        // 2. Look for an existing row in any state.
        let existing = match self
            .repos
            .assignments()
            .find(organization.id, user.id, capability_type_id)
            .await
        {
            Ok(row) => row,
            Err(e) => return CapabilityOutcome::failed(capability_type_id, Some(group), e.to_string()),
        };

        match existing {
            Some(row) if row.is_active() => {
                CapabilityOutcome::new(capability_type_id, Some(group), CapabilityStatus::AlreadyAssigned)
            }
            Some(row) => {
                // 3a. Inactive row: skip the add when membership is confirmed.
                let already_member = self
                    .directory
                    .get_group_members(group)
                    .await
                    .map(|members| members.iter().any(|m| m == directory_user_id))
                    .unwrap_or(false);
                if !already_member {
                    if let Err(reason) = self.add_membership(directory_user_id, group).await {
                        return CapabilityOutcome::failed(capability_type_id, Some(group), reason);
                    }
                }
                match self
                    .repos
                    .assignments()
                    .activate(organization.id, row.id, group, actor)
                    .await
                {
                    Ok(_) => {
                        CapabilityOutcome::new(capability_type_id, Some(group), CapabilityStatus::Reactivated)
                    }
                    Err(e) => self.row_write_failed(user, capability_type_id, group, e),
                }
            }
            None => {
                // 3b. No row yet: directory first, then record.
                if let Err(reason) = self.add_membership(directory_user_id, group).await {
                    return CapabilityOutcome::failed(capability_type_id, Some(group), reason);
                }
                let created = self
                    .repos
                    .assignments()
                    .create(CreateAssignment {
                        organization_id: organization.id,
                        user_id: user.id,
                        capability_type_id,
                        directory_group_id: group.to_string(),
                        assigned_by: actor.to_string(),
                    })
                    .await;
                match created {
                    Ok(_) => CapabilityOutcome::new(capability_type_id, Some(group), CapabilityStatus::Assigned),
                    Err(e) => self.row_write_failed(user, capability_type_id, group, e),
                }
            }
        }
    }

    /// Remove the membership, then deactivate the row. When the group is in
    /// `retained_groups` another active assignment still relies on the
    /// membership, so only the row is deactivated.
    async fn revoke(
        &self,
        directory_user_id: &str,
        assignment: Assignment,
        retained_groups: &HashSet<String>,
    ) -> CapabilityOutcome {
        let capability_type_id = assignment.capability_type_id;
        let group = assignment.directory_group_id.as_str();
        if !assignment.is_active() {
            return CapabilityOutcome::new(capability_type_id, Some(group), CapabilityStatus::AlreadyRemoved);
        }

        let removed = if retained_groups.contains(group) {
            info!(
                assignment_id = %assignment.id,
                group_id = group,
                "Group still backs another assignment, keeping membership"
            );
            true
        } else {
            self.remove_membership(directory_user_id, group).await
        };
        if !removed {
            return CapabilityOutcome::failed(
                capability_type_id,
                Some(group),
                "directory membership removal could not be confirmed",
            );
        }

        match self
            .repos
            .assignments()
            .deactivate(assignment.organization_id, assignment.id)
            .await
        {
            Ok(_) => CapabilityOutcome::new(capability_type_id, Some(group), CapabilityStatus::Removed),
            Err(e) => {
                error!(
                    assignment_id = %assignment.id,
                    group_id = group,
                    error = %e,
                    "Membership removed but assignment row not deactivated"
                );
                CapabilityOutcome::failed(capability_type_id, Some(group), e.to_string())
            }
        }
    }

    /// True once the user is confirmed out of the group.
    async fn remove_membership(&self, directory_user_id: &str, group: &str) -> bool {
        match self.directory.remove_user_from_group(directory_user_id, group).await {
            Ok(true) => true,
            Ok(false) => self.confirmed_absent(directory_user_id, group).await,
            Err(e) => {
                warn!(group_id = group, error = %e, "Membership removal failed, checking current state");
                self.confirmed_absent(directory_user_id, group).await
            }
        }
    }

    async fn add_membership(&self, directory_user_id: &str, group: &str) -> Result<(), String> {
        match self.directory.add_user_to_group(directory_user_id, group).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("directory refused to add member to group {group}")),
            Err(e) => Err(e.into_external("directory", "add_user_to_group").to_string()),
        }
    }

    /// A user counts as absent when the member list omits them, or the group
    /// itself is confirmed gone.
    async fn confirmed_absent(&self, directory_user_id: &str, group: &str) -> bool {
        match self.directory.get_group_members(group).await {
            Ok(members) => !members.iter().any(|m| m == directory_user_id),
            Err(_) => matches!(self.directory.group_exists(group).await, Ok(false)),
        }
    }

    fn row_write_failed(
        &self,
        user: &User,
        capability_type_id: Uuid,
        group: &str,
        e: OrgSyncError,
    ) -> CapabilityOutcome {
        error!(
            user_id = %user.id,
            capability_type_id = %capability_type_id,
            group_id = group,
            error = %e,
            "Membership added but assignment row not written"
        );
        CapabilityOutcome::failed(capability_type_id, Some(group), e.to_string())
    }

    /// Mirror the active rows into the user's capability set.
    async fn sync_user_capabilities(&self, organization_id: Uuid, user_id: Uuid) {
        let active = match self.active_assignments(organization_id, user_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not read assignments to sync user");
                return;
            }
        };
        let ids: Vec<Uuid> = active.iter().map(|a| a.capability_type_id).collect();
        if let Err(e) = self
            .repos
            .users()
            .update(
                organization_id,
                user_id,
                UpdateUser {
                    capability_type_ids: Some(ids),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(user_id = %user_id, error = %e, "Could not sync user capability set");
        }
    }
}

/// Drop duplicates, keep first-seen order.
fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(statuses: Vec<CapabilityStatus>) -> AssignmentOutcome {
        AssignmentOutcome {
            organization_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            results: statuses
                .into_iter()
                .map(|s| CapabilityOutcome::new(Uuid::new_v4(), None, s))
                .collect(),
        }
    }

    #[test]
    fn summary_counts_failures() {
        let o = outcome(vec![
            CapabilityStatus::Assigned,
            CapabilityStatus::AlreadyAssigned,
            CapabilityStatus::Failed { reason: "x".into() },
        ]);
        assert_eq!(o.summary(), "2/3 succeeded");
        assert!(o.is_success());
        assert!(!o.all_succeeded());
        assert_eq!(o.failures().count(), 1);
    }

    #[test]
    fn all_failed_is_not_success() {
        let o = outcome(vec![CapabilityStatus::Failed { reason: "x".into() }]);
        assert!(!o.is_success());
    }

    #[test]
    fn empty_outcome_is_success() {
        let o = outcome(vec![]);
        assert!(o.is_success());
        assert!(o.all_succeeded());
        assert_eq!(o.summary(), "0/0 succeeded");
    }

    #[test]
    fn dedup_keeps_order() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(dedup(&[a, b, a, b]), vec![a, b]);
    }
}
