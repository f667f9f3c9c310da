//! State-sync validation.
//!
//! Compares one organization's database state against the directory and the
//! secret store and reports every mismatch as a [`ValidationIssue`]. Like the
//! detector it never writes; repairs belong to the cleanup executor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use orgsync_core::error::OrgSyncResult;
use orgsync_core::gateway::{DirectoryGateway, GatewayResult, SecretStoreGateway};
use orgsync_core::models::capability::CapabilityType;
use orgsync_core::models::context::CallerContext;
use orgsync_core::models::finding::{OrphanScanResult, ResourceType};
use orgsync_core::models::user::{User, UserStatus};
use orgsync_core::models::validation::{
    ComprehensiveValidationResult, IssueSeverity, ValidationIssue, ValidationKind, ValidationResult,
};
use orgsync_core::repository::{
    AssignmentRepository, CapabilityTypeRepository, DatabaseCredentialRepository,
    OrganizationRepository, Repositories, UserRepository,
};
use tracing::info;
use uuid::Uuid;

use crate::detector::{MISSING_BACKING_GROUP, OrphanDetector};
use crate::guard::IsolationGuard;

pub struct StateSyncValidator<R: Repositories, D: DirectoryGateway, S: SecretStoreGateway> {
    repos: Arc<R>,
    directory: Arc<D>,
    secrets: Arc<S>,
    detector: Arc<OrphanDetector<R, D, S>>,
    guard: Arc<IsolationGuard>,
    fan_out: usize,
}

impl<R, D, S> StateSyncValidator<R, D, S>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
{
    pub fn new(
        repos: Arc<R>,
        directory: Arc<D>,
        secrets: Arc<S>,
        detector: Arc<OrphanDetector<R, D, S>>,
        guard: Arc<IsolationGuard>,
        fan_out: usize,
    ) -> Self {
        Self {
            repos,
            directory,
            secrets,
            detector,
            guard,
            fan_out: fan_out.max(1),
        }
    }

    /// Users: directory account presence and enablement, plus references to
    /// credentials and capabilities that are no longer valid.
    pub async fn validate_user_state(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<ValidationResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "validate_user_state")?;

        let orphans = self.detector.find_orphaned_users(caller, organization_id).await?;
        let organization = self.repos.organizations().get_by_id(organization_id).await?;
        let users: Vec<User> = self
            .repos
            .users()
            .list_by_organization(organization_id)
            .await?
            .into_iter()
            .filter(|u| !u.is_deleted)
            .collect();
        let valid_credentials: HashSet<Uuid> = self
            .repos
            .credentials()
            .list_by_organization(organization_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect();

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut unverified = orphans.unverified.len() as u64;

        if orphan_issues(&orphans, IssueSeverity::Error, &mut issues) {
            recommendations.push("Review orphaned users and deactivate accounts removed from the directory".to_string());
        }

        for user in &users {
            let stale_credentials = user
                .database_credential_ids
                .iter()
                .filter(|id| !valid_credentials.contains(*id))
                .count();
            if stale_credentials > 0 {
                issues.push(issue(
                    user.id,
                    ResourceType::User,
                    IssueSeverity::Warning,
                    format!("{stale_credentials} stale database credential reference(s)"),
                ));
                recommendations.push("Run database credential reference cleanup".to_string());
            }
            let stale_capabilities = user
                .capability_type_ids
                .iter()
                .filter(|id| !organization.has_capability(**id))
                .count();
            if stale_capabilities > 0 {
                issues.push(issue(
                    user.id,
                    ResourceType::User,
                    IssueSeverity::Warning,
                    format!("{stale_capabilities} capability reference(s) not enabled for organization"),
                ));
                recommendations
                    .push("Revoke or clean up capability references not enabled for the organization".to_string());
            }
        }

        // Enablement is checked for active users whose account was confirmed present.
        let orphaned: HashSet<&str> = orphans.orphans.iter().map(|o| o.resource_id.as_str()).collect();
        let unverified_ids: HashSet<&str> =
            orphans.unverified.iter().map(|u| u.resource_id.as_str()).collect();
        let candidates: Vec<(Uuid, String)> = users
            .iter()
            .filter(|u| u.is_active && u.status == UserStatus::Active)
            .filter_map(|u| u.directory_user_id.clone().map(|d| (u.id, d)))
            .filter(|(id, _)| {
                let id = id.to_string();
                !orphaned.contains(id.as_str()) && !unverified_ids.contains(id.as_str())
            })
            .collect();

        let enabled: Vec<(Uuid, GatewayResult<bool>)> = stream::iter(candidates)
            .map(move |(user_id, directory_user_id)| async move {
                (user_id, self.directory.get_account_enabled(&directory_user_id).await)
            })
            .buffer_unordered(self.fan_out)
            .collect()
            .await;

        for (user_id, result) in enabled {
            match result {
                Ok(false) => {
                    issues.push(issue(
                        user_id,
                        ResourceType::User,
                        IssueSeverity::Error,
                        "active in database but disabled in directory",
                    ));
                    recommendations.push("Deactivate users whose directory account is disabled".to_string());
                }
                Ok(true) => {}
                Err(_) => unverified += 1,
            }
        }

        Ok(finish(
            ValidationKind::UserState,
            organization_id,
            users.len() as u64,
            issues,
            unverified,
            recommendations,
        ))
    }

    /// Groups: every active assignment must be backed by a membership and by
    /// a capability the organization still enables, and every membership of
    /// this organization's users must be backed by an active assignment.
    pub async fn validate_group_state(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<ValidationResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "validate_group_state")?;

        let group_orphans = self
            .detector
            .find_orphaned_capability_groups(caller, organization_id)
            .await?;
        let organization = self.repos.organizations().get_by_id(organization_id).await?;
        let users = self.repos.users().list_by_organization(organization_id).await?;
        let assignments = self
            .repos
            .assignments()
            .list_active_by_organization(organization_id)
            .await?;

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut unverified = group_orphans.unverified.len() as u64;

        if orphan_issues(&group_orphans, IssueSeverity::Critical, &mut issues) {
            recommendations.push("Restore or reconfigure missing backing directory groups".to_string());
        }

        let capabilities: HashMap<Uuid, CapabilityType> = self
            .repos
            .capability_types()
            .list()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        // Group -> capability types it backs, for this organization.
        let mut backed: HashMap<String, Vec<Uuid>> = HashMap::new();
        for capability_type_id in &organization.capability_type_ids {
            if let Some(group) = capabilities
                .get(capability_type_id)
                .and_then(|c| c.directory_group_id.clone())
            {
                backed.entry(group).or_default().push(*capability_type_id);
            }
        }
        let mut groups: HashSet<String> = backed.keys().cloned().collect();
        groups.extend(assignments.iter().map(|a| a.directory_group_id.clone()));

        let members: HashMap<String, GatewayResult<HashSet<String>>> = stream::iter(groups)
            .map(move |group| async move {
                let result = self
                    .directory
                    .get_group_members(&group)
                    .await
                    .map(|m| m.into_iter().collect::<HashSet<_>>());
                (group, result)
            })
            .buffer_unordered(self.fan_out)
            .collect()
            .await;

        let users_by_id: HashMap<Uuid, &User> = users.iter().map(|u| (u.id, u)).collect();

        for assignment in &assignments {
            let stale = match capabilities.get(&assignment.capability_type_id) {
                None => Some("an unknown capability type"),
                Some(c) if !c.is_active => Some("an inactive capability type"),
                Some(_) if !organization.has_capability(assignment.capability_type_id) => {
                    Some("a capability type not enabled for the organization")
                }
                Some(_) => None,
            };
            if let Some(stale) = stale {
                issues.push(issue(
                    assignment.id,
                    ResourceType::Assignment,
                    IssueSeverity::Error,
                    format!("active assignment for {stale}"),
                ));
                recommendations.push("Revoke assignments of capabilities the organization no longer enables".to_string());
            }

            let Some(user) = users_by_id.get(&assignment.user_id).filter(|u| !u.is_deleted) else {
                issues.push(issue(
                    assignment.id,
                    ResourceType::Assignment,
                    IssueSeverity::Error,
                    "active assignment for a missing or deleted user",
                ));
                recommendations.push("Deactivate assignments of removed users".to_string());
                continue;
            };
            let Some(directory_user_id) = user.directory_user_id.as_deref() else {
                issues.push(issue(
                    assignment.id,
                    ResourceType::Assignment,
                    IssueSeverity::Error,
                    "active assignment for a user without directory account",
                ));
                recommendations.push("Re-run assignment reconciliation for affected users".to_string());
                continue;
            };
            match members.get(&assignment.directory_group_id) {
                Some(Ok(m)) if m.contains(directory_user_id) => {}
                Some(Ok(_)) => {
                    issues.push(issue(
                        assignment.id,
                        ResourceType::Assignment,
                        IssueSeverity::Error,
                        format!(
                            "active assignment without membership in group {}",
                            assignment.directory_group_id
                        ),
                    ));
                    recommendations.push("Re-run assignment reconciliation for affected users".to_string());
                }
                Some(Err(_)) | None => unverified += 1,
            }
        }

        // Reverse direction: memberships of this organization's users without
        // an active assignment. Foreign members are not this tenant's concern.
        let by_directory_id: HashMap<&str, &User> = users
            .iter()
            .filter(|u| !u.is_deleted)
            .filter_map(|u| u.directory_user_id.as_deref().map(|d| (d, u)))
            .collect();
        let active_pairs: HashSet<(Uuid, Uuid)> = assignments
            .iter()
            .map(|a| (a.user_id, a.capability_type_id))
            .collect();

        for (group, capability_ids) in &backed {
            let Some(Ok(group_members)) = members.get(group) else {
                continue;
            };
            for member in group_members {
                let Some(user) = by_directory_id.get(member.as_str()) else {
                    continue;
                };
                if capability_ids
                    .iter()
                    .all(|cap| !active_pairs.contains(&(user.id, *cap)))
                {
                    issues.push(issue(
                        user.id,
                        ResourceType::User,
                        IssueSeverity::Warning,
                        format!("member of group {group} without an active assignment"),
                    ));
                    recommendations.push("Reconcile directory memberships with assignment records".to_string());
                }
            }
        }

        Ok(finish(
            ValidationKind::GroupState,
            organization_id,
            assignments.len() as u64 + group_orphans.total_scanned,
            issues,
            unverified,
            recommendations,
        ))
    }

    /// Credentials: active ones must have an enabled secret, inactive ones
    /// should not keep an enabled secret around.
    pub async fn validate_credential_state(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<ValidationResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "validate_credential_state")?;

        let orphans = self
            .detector
            .find_orphaned_credentials(caller, organization_id)
            .await?;
        let credentials = self
            .repos
            .credentials()
            .list_by_organization(organization_id)
            .await?;

        let mut issues = Vec::new();
        let mut recommendations = Vec::new();
        let mut unverified = orphans.unverified.len() as u64;

        if orphan_issues(&orphans, IssueSeverity::Error, &mut issues) {
            recommendations.push("Deactivate credentials whose secret is missing or disabled".to_string());
        }

        let inactive: Vec<(Uuid, String)> = credentials
            .iter()
            .filter(|c| !c.is_active && !c.secret_name.trim().is_empty())
            .map(|c| (c.id, c.secret_name.clone()))
            .collect();
        let lingering: Vec<(Uuid, GatewayResult<bool>)> = stream::iter(inactive)
            .map(move |(credential_id, secret_name)| async move {
                let enabled = match self.secrets.secret_exists(&secret_name, organization_id).await {
                    Ok(true) => self.secrets.get_secret_enabled(&secret_name).await,
                    other => other,
                };
                (credential_id, enabled)
            })
            .buffer_unordered(self.fan_out)
            .collect()
            .await;

        for (credential_id, enabled) in lingering {
            match enabled {
                Ok(true) => {
                    issues.push(issue(
                        credential_id,
                        ResourceType::DatabaseCredential,
                        IssueSeverity::Warning,
                        "inactive credential still has an enabled secret",
                    ));
                    recommendations.push("Disable secrets of inactive credentials".to_string());
                }
                Ok(false) => {}
                Err(_) => unverified += 1,
            }
        }

        Ok(finish(
            ValidationKind::CredentialState,
            organization_id,
            credentials.len() as u64,
            issues,
            unverified,
            recommendations,
        ))
    }

    /// The three validations, run concurrently.
    pub async fn validate_all_states(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<ComprehensiveValidationResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "validate_all_states")?;

        let (user_state, group_state, credential_state) = tokio::try_join!(
            self.validate_user_state(caller, organization_id),
            self.validate_group_state(caller, organization_id),
            self.validate_credential_state(caller, organization_id),
        )?;

        let result = ComprehensiveValidationResult {
            organization_id,
            user_state,
            group_state,
            credential_state,
            validated_at: Utc::now(),
        };
        info!(
            organization_id = %organization_id,
            issues = result.total_issues(),
            valid = result.overall_valid(),
            "State-sync validation finished"
        );
        Ok(result)
    }
}

fn issue(
    resource_id: impl ToString,
    resource_type: ResourceType,
    severity: IssueSeverity,
    description: impl Into<String>,
) -> ValidationIssue {
    ValidationIssue {
        resource_id: resource_id.to_string(),
        resource_type,
        severity,
        description: description.into(),
    }
}

/// Turn scan orphans into issues. Missing backing groups are always
/// critical. Returns whether anything was added.
fn orphan_issues(scan: &OrphanScanResult, severity: IssueSeverity, issues: &mut Vec<ValidationIssue>) -> bool {
    for orphan in &scan.orphans {
        let severity = if orphan.reason == MISSING_BACKING_GROUP {
            IssueSeverity::Critical
        } else {
            severity
        };
        issues.push(issue(&orphan.resource_id, orphan.resource_type, severity, orphan.reason.clone()));
    }
    !scan.orphans.is_empty()
}

fn finish(
    kind: ValidationKind,
    organization_id: Uuid,
    records_checked: u64,
    mut issues: Vec<ValidationIssue>,
    unverified: u64,
    recommendations: Vec<String>,
) -> ValidationResult {
    issues.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.resource_id.cmp(&b.resource_id)));
    ValidationResult::new(kind, organization_id, records_checked, issues, unverified, recommendations)
}
