//! Cleanup: turns orphan findings into recommendations and applies the
//! low-risk ones.
//!
//! Nothing here deletes data. Automatic repairs are limited to deactivations
//! and reference updates that [`requires_approval`] clears; everything else
//! is returned as pending for an operator. Live access is never revoked
//! here: an active assignment whose capability went stale is reported for
//! approval and revoked through the reconciler.

use std::collections::HashSet;
use std::sync::Arc;

use orgsync_core::error::{OrgSyncError, OrgSyncResult};
use orgsync_core::models::cleanup::{
    AssignmentCleanupSummary, CleanupAction, CleanupRecommendation, CleanupReport, FailedRepair,
    RiskLevel, requires_approval,
};
use orgsync_core::models::context::CallerContext;
use orgsync_core::models::credential::UpdateDatabaseCredential;
use orgsync_core::models::finding::{OrphanReport, OrphanedResource, ResourceType};
use orgsync_core::models::user::{UpdateUser, User};
use orgsync_core::repository::{
    AssignmentRepository, CapabilityTypeRepository, DatabaseCredentialRepository,
    OrganizationRepository, Repositories, UserRepository,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::detector::{DERIVED_ID_MISMATCH, MISSING_DIRECTORY_GROUP};
use crate::guard::IsolationGuard;

pub struct CleanupExecutor<R: Repositories> {
    repos: Arc<R>,
    guard: Arc<IsolationGuard>,
}

impl<R: Repositories> CleanupExecutor<R> {
    pub fn new(repos: Arc<R>, guard: Arc<IsolationGuard>) -> Self {
        Self { repos, guard }
    }

    /// Map every orphan in the report to a recommendation.
    pub fn recommend(&self, report: &OrphanReport) -> Vec<CleanupRecommendation> {
        report
            .orphans()
            .map(|orphan| recommendation_for(orphan, report.organization_id))
            .collect()
    }

    /// Apply recommendations that do not need approval, then sweep stale
    /// credential and capability references. Approval is re-derived from
    /// action and risk, so a recommendation cannot opt itself out of review.
    pub async fn apply(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
        recommendations: Vec<CleanupRecommendation>,
    ) -> OrgSyncResult<CleanupReport> {
        self.guard
            .validate_organization_access(caller, organization_id, "apply_cleanup")?;
        self.guard.validate_bulk_operation_access(
            caller,
            &recommendations,
            |r| r.organization_id.unwrap_or(organization_id),
            "apply_cleanup",
        )?;
        if let Some(foreign) = recommendations
            .iter()
            .find(|r| r.organization_id.is_some_and(|org| org != organization_id))
        {
            return Err(OrgSyncError::Validation {
                message: format!(
                    "recommendation for {} belongs to another organization",
                    foreign.resource_id
                ),
            });
        }

        let mut report = CleanupReport {
            organization_id,
            applied: Vec::new(),
            pending_approval: Vec::new(),
            failed: Vec::new(),
            credential_references: AssignmentCleanupSummary::default(),
            capability_references: AssignmentCleanupSummary::default(),
        };

        report
            .pending_approval
            .extend(self.stale_assignment_recommendations(caller, organization_id).await?);

        for recommendation in recommendations {
            if requires_approval(recommendation.action, recommendation.risk) {
                report.pending_approval.push(recommendation);
                continue;
            }
            match self.execute(organization_id, &recommendation).await {
                Ok(()) => report.applied.push(recommendation),
                Err(e) => {
                    warn!(
                        resource_id = %recommendation.resource_id,
                        action = ?recommendation.action,
                        error = %e,
                        "Automatic repair failed"
                    );
                    report.failed.push(FailedRepair {
                        recommendation,
                        reason: e.to_string(),
                    });
                }
            }
        }

        report.credential_references = self
            .cleanup_user_database_assignments(caller, organization_id)
            .await?;
        report.capability_references = self
            .cleanup_user_capability_assignments(caller, organization_id)
            .await?;

        info!(
            organization_id = %organization_id,
            applied = report.applied.len(),
            pending = report.pending_approval.len(),
            failed = report.failed.len(),
            "Cleanup applied"
        );
        Ok(report)
    }

    /// Strip credential ids that no longer reference an active credential of
    /// the organization. Running it again right away changes nothing.
    pub async fn cleanup_user_database_assignments(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<AssignmentCleanupSummary> {
        self.guard
            .validate_organization_access(caller, organization_id, "cleanup_credential_references")?;
        let valid: HashSet<Uuid> = self
            .repos
            .credentials()
            .list_by_organization(organization_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active && c.organization_id == organization_id)
            .map(|c| c.id)
            .collect();

        let is_valid = |_: &User, id: &Uuid| valid.contains(id);
        self.sweep(organization_id, "credential", |user| &user.database_credential_ids, is_valid, |ids| {
            UpdateUser {
                database_credential_ids: Some(ids),
                ..Default::default()
            }
        })
        .await
    }

    /// Strip capability ids that are unknown, inactive, or not enabled for
    /// the organization. Ids still backed by an active assignment row are
    /// kept: that access is live and goes through
    /// [`Self::stale_assignment_recommendations`] instead.
    pub async fn cleanup_user_capability_assignments(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<AssignmentCleanupSummary> {
        self.guard
            .validate_organization_access(caller, organization_id, "cleanup_capability_references")?;
        let valid = self.enabled_capabilities(organization_id).await?;
        let live: HashSet<(Uuid, Uuid)> = self
            .repos
            .assignments()
            .list_active_by_organization(organization_id)
            .await?
            .into_iter()
            .map(|a| (a.user_id, a.capability_type_id))
            .collect();

        let is_valid = |user: &User, id: &Uuid| valid.contains(id) || live.contains(&(user.id, *id));
        self.sweep(organization_id, "capability", |user| &user.capability_type_ids, is_valid, |ids| {
            UpdateUser {
                capability_type_ids: Some(ids),
                ..Default::default()
            }
        })
        .await
    }

    /// One approval-gated `Deactivate` per active assignment whose
    /// capability is unknown, inactive, or no longer enabled for the
    /// organization. The membership is still in place, so the repair is a
    /// reconciler removal, never a row edit.
    pub async fn stale_assignment_recommendations(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<Vec<CleanupRecommendation>> {
        self.guard
            .validate_organization_access(caller, organization_id, "recommend_stale_assignments")?;
        let valid = self.enabled_capabilities(organization_id).await?;
        let stale: Vec<CleanupRecommendation> = self
            .repos
            .assignments()
            .list_active_by_organization(organization_id)
            .await?
            .into_iter()
            .filter(|a| !valid.contains(&a.capability_type_id))
            .map(|a| {
                CleanupRecommendation::new(
                    a.id.to_string(),
                    ResourceType::Assignment,
                    Some(organization_id),
                    CleanupAction::Deactivate,
                    RiskLevel::High,
                    format!(
                        "user {} still holds membership in {} for capability {} that is no longer enabled; \
                         revoke through the reconciler",
                        a.user_id, a.directory_group_id, a.capability_type_id
                    ),
                )
            })
            .collect();
        if !stale.is_empty() {
            warn!(
                organization_id = %organization_id,
                count = stale.len(),
                "Active assignments reference capabilities the organization no longer enables"
            );
        }
        Ok(stale)
    }

    /// Capability ids that are active and enabled for the organization.
    async fn enabled_capabilities(&self, organization_id: Uuid) -> OrgSyncResult<HashSet<Uuid>> {
        let organization = self.repos.organizations().get_by_id(organization_id).await?;
        let active: HashSet<Uuid> = self
            .repos
            .capability_types()
            .list()
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .map(|c| c.id)
            .collect();
        Ok(organization
            .capability_type_ids
            .iter()
            .copied()
            .filter(|id| active.contains(id))
            .collect())
    }

    async fn sweep(
        &self,
        organization_id: Uuid,
        kind: &str,
        ids_of: impl Fn(&User) -> &Vec<Uuid>,
        is_valid: impl Fn(&User, &Uuid) -> bool,
        update: impl Fn(Vec<Uuid>) -> UpdateUser,
    ) -> OrgSyncResult<AssignmentCleanupSummary> {
        let users = self.repos.users().list_by_organization(organization_id).await?;
        let mut summary = AssignmentCleanupSummary {
            users_scanned: users.len() as u64,
            ..Default::default()
        };

        for user in &users {
            let current = ids_of(user);
            let retained: Vec<Uuid> = current.iter().copied().filter(|id| is_valid(user, id)).collect();
            let removed = (current.len() - retained.len()) as u64;
            if removed == 0 {
                continue;
            }
            match self
                .repos
                .users()
                .update(organization_id, user.id, update(retained))
                .await
            {
                Ok(_) => {
                    summary.users_updated += 1;
                    summary.stale_ids_removed += removed;
                }
                Err(e) => {
                    warn!(user_id = %user.id, kind, error = %e, "Could not strip stale references");
                    summary.users_failed += 1;
                }
            }
        }

        info!(
            organization_id = %organization_id,
            kind,
            scanned = summary.users_scanned,
            updated = summary.users_updated,
            removed = summary.stale_ids_removed,
            "Reference cleanup finished"
        );
        Ok(summary)
    }

    async fn execute(&self, organization_id: Uuid, recommendation: &CleanupRecommendation) -> OrgSyncResult<()> {
        let id = Uuid::parse_str(&recommendation.resource_id).map_err(|_| OrgSyncError::Validation {
            message: format!("resource id {} is not a uuid", recommendation.resource_id),
        })?;
        match (recommendation.resource_type, recommendation.action) {
            (ResourceType::DatabaseCredential, CleanupAction::Deactivate) => {
                self.repos
                    .credentials()
                    .update(
                        organization_id,
                        id,
                        UpdateDatabaseCredential {
                            is_active: Some(false),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            (ResourceType::User, CleanupAction::Deactivate) => {
                self.repos
                    .users()
                    .update(
                        organization_id,
                        id,
                        UpdateUser {
                            is_active: Some(false),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            (resource_type, action) => {
                return Err(OrgSyncError::Validation {
                    message: format!("no automatic repair for {action:?} on {resource_type:?}"),
                });
            }
        }
        Ok(())
    }
}

fn recommendation_for(orphan: &OrphanedResource, organization_id: Uuid) -> CleanupRecommendation {
    let org = orphan.organization_id.or(Some(organization_id));
    let (action, risk) = match orphan.resource_type {
        ResourceType::User => (CleanupAction::Deactivate, RiskLevel::High),
        ResourceType::DatabaseCredential => (CleanupAction::Deactivate, RiskLevel::Medium),
        ResourceType::CapabilityGroup => (CleanupAction::ManualReview, RiskLevel::High),
        ResourceType::Organization if orphan.reason.contains(DERIVED_ID_MISMATCH) => {
            (CleanupAction::ManualReview, RiskLevel::Critical)
        }
        ResourceType::Organization if orphan.reason.contains(MISSING_DIRECTORY_GROUP) => {
            (CleanupAction::UpdateReference, RiskLevel::High)
        }
        ResourceType::Organization => (CleanupAction::ManualReview, RiskLevel::High),
        ResourceType::Assignment => (CleanupAction::MarkAsOrphaned, RiskLevel::Medium),
    };
    CleanupRecommendation::new(
        orphan.resource_id.clone(),
        orphan.resource_type,
        org,
        action,
        risk,
        format!("{}: {}", orphan.name, orphan.reason),
    )
}
