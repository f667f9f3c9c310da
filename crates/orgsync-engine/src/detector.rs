//! Orphan detection.
//!
//! Scans compare database records against the directory and the secret store
//! and never modify anything. An external call that fails marks the item
//! unverified; only a confirmed negative answer makes an orphan.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use orgsync_core::error::OrgSyncResult;
use orgsync_core::gateway::{DirectoryGateway, SecretStoreGateway};
use orgsync_core::models::capability::CapabilityType;
use orgsync_core::models::context::CallerContext;
use orgsync_core::models::credential::DatabaseCredential;
use orgsync_core::models::finding::{
    OrphanReport, OrphanScanResult, OrphanedResource, ResourceType, UnverifiedResource,
};
use orgsync_core::models::organization::Organization;
use orgsync_core::models::user::{User, UserStatus};
use orgsync_core::repository::{
    CapabilityTypeRepository, DatabaseCredentialRepository, OrganizationRepository, Repositories,
    UserRepository,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::guard::IsolationGuard;

pub const MISSING_BACKING_GROUP: &str = "missing backing group";
pub const NO_BACKING_GROUP: &str = "no backing group configured";
pub const DERIVED_ID_MISMATCH: &str = "identifier does not match domain derivation";
pub const MISSING_DIRECTORY_GROUP: &str = "missing directory group reference";

/// Outcome of checking a single record against its external counterpart.
enum Check {
    Healthy,
    Orphan(String),
    Unknown(String),
}

/// One checked record, ready to be folded into a scan result.
struct Checked {
    resource_id: String,
    organization_id: Option<Uuid>,
    name: String,
    last_modified: chrono::DateTime<Utc>,
    check: Check,
}

pub struct OrphanDetector<R: Repositories, D: DirectoryGateway, S: SecretStoreGateway> {
    repos: Arc<R>,
    directory: Arc<D>,
    secrets: Arc<S>,
    guard: Arc<IsolationGuard>,
    fan_out: usize,
}

impl<R, D, S> OrphanDetector<R, D, S>
where
    R: Repositories,
    D: DirectoryGateway,
    S: SecretStoreGateway,
{
    pub fn new(
        repos: Arc<R>,
        directory: Arc<D>,
        secrets: Arc<S>,
        guard: Arc<IsolationGuard>,
        fan_out: usize,
    ) -> Self {
        Self {
            repos,
            directory,
            secrets,
            guard,
            fan_out: fan_out.max(1),
        }
    }

    /// Users whose directory account is gone, or who should have one and
    /// do not. Deleted users are not scanned; invited users are not expected
    /// to have an account yet.
    pub async fn find_orphaned_users(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<OrphanScanResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "scan_users")?;
        let users: Vec<User> = self
            .repos
            .users()
            .list_by_organization(organization_id)
            .await?
            .into_iter()
            .filter(|u| !u.is_deleted)
            .collect();

        let checked = stream::iter(users)
            .map(move |user| async move {
                Checked {
                    resource_id: user.id.to_string(),
                    organization_id: Some(user.organization_id),
                    name: user.email.clone(),
                    last_modified: user.updated_at,
                    check: self.check_user(&user).await,
                }
            })
            .buffer_unordered(self.fan_out)
            .collect::<Vec<_>>()
            .await;

        Ok(fold(ResourceType::User, Some(organization_id), checked))
    }

    /// Active credentials whose secret is missing from the store, carries a
    /// different organization tag, or is disabled.
    pub async fn find_orphaned_credentials(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<OrphanScanResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "scan_credentials")?;
        let credentials: Vec<DatabaseCredential> = self
            .repos
            .credentials()
            .list_by_organization(organization_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active)
            .collect();

        let checked = stream::iter(credentials)
            .map(move |credential| async move {
                Checked {
                    resource_id: credential.id.to_string(),
                    organization_id: Some(credential.organization_id),
                    name: credential.name.clone(),
                    last_modified: credential.updated_at,
                    check: self.check_credential(&credential).await,
                }
            })
            .buffer_unordered(self.fan_out)
            .collect::<Vec<_>>()
            .await;

        Ok(fold(ResourceType::DatabaseCredential, Some(organization_id), checked))
    }

    /// Capability types enabled for the organization whose backing group is
    /// unset or no longer exists in the directory.
    pub async fn find_orphaned_capability_groups(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<OrphanScanResult> {
        self.guard
            .validate_organization_access(caller, organization_id, "scan_capability_groups")?;
        let organization = self.repos.organizations().get_by_id(organization_id).await?;

        let mut checked = Vec::new();
        let mut capabilities: Vec<CapabilityType> = Vec::new();
        for capability_type_id in &organization.capability_type_ids {
            match self.repos.capability_types().get_by_id(*capability_type_id).await {
                Ok(capability) => capabilities.push(capability),
                Err(e) if e.is_not_found() => checked.push(Checked {
                    resource_id: capability_type_id.to_string(),
                    organization_id: Some(organization_id),
                    name: capability_type_id.to_string(),
                    last_modified: organization.updated_at,
                    check: Check::Orphan("capability type record missing".into()),
                }),
                Err(e) => return Err(e),
            }
        }

        checked.extend(
            stream::iter(capabilities)
                .map(move |capability| async move {
                    Checked {
                        resource_id: capability.id.to_string(),
                        organization_id: Some(organization_id),
                        name: capability.name.clone(),
                        last_modified: capability.updated_at,
                        check: self.check_capability_group(&capability).await,
                    }
                })
                .buffer_unordered(self.fan_out)
                .collect::<Vec<_>>()
                .await,
        );

        Ok(fold(ResourceType::CapabilityGroup, Some(organization_id), checked))
    }

    /// Organizations whose id no longer matches their domain derivation, or
    /// whose directory group reference is missing or dangling.
    ///
    /// With `None` every organization is scanned, which is a cross-tenant
    /// operation reserved for super-administrators.
    pub async fn find_orphaned_organizations(
        &self,
        caller: &CallerContext,
        organization_id: Option<Uuid>,
    ) -> OrgSyncResult<OrphanScanResult> {
        let organizations = match organization_id {
            Some(id) => {
                self.guard
                    .validate_organization_access(caller, id, "scan_organizations")?;
                vec![self.repos.organizations().get_by_id(id).await?]
            }
            None => {
                self.guard
                    .validate_global_access(caller, "scan_all_organizations")?;
                self.repos.organizations().list_active().await?
            }
        };

        let checked = stream::iter(organizations)
            .map(move |organization| async move {
                Checked {
                    resource_id: organization.id.to_string(),
                    organization_id: Some(organization.id),
                    name: organization.name.clone(),
                    last_modified: organization.updated_at,
                    check: self.check_organization(&organization).await,
                }
            })
            .buffer_unordered(self.fan_out)
            .collect::<Vec<_>>()
            .await;

        Ok(fold(ResourceType::Organization, organization_id, checked))
    }

    /// All four scans for one organization, run concurrently.
    pub async fn run_comprehensive_scan(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<OrphanReport> {
        self.guard
            .validate_organization_access(caller, organization_id, "comprehensive_scan")?;

        let (users, credentials, capability_groups, organizations) = tokio::try_join!(
            self.find_orphaned_users(caller, organization_id),
            self.find_orphaned_credentials(caller, organization_id),
            self.find_orphaned_capability_groups(caller, organization_id),
            self.find_orphaned_organizations(caller, Some(organization_id)),
        )?;

        let report = OrphanReport {
            organization_id,
            users,
            credentials,
            capability_groups,
            organizations,
            generated_at: Utc::now(),
        };
        info!(
            organization_id = %organization_id,
            scanned = report.total_scanned(),
            orphans = report.total_orphans(),
            unverified = report.total_unverified(),
            "Orphan scan finished"
        );
        Ok(report)
    }

    pub async fn has_critical_orphans(
        &self,
        caller: &CallerContext,
        organization_id: Uuid,
    ) -> OrgSyncResult<bool> {
        Ok(self
            .run_comprehensive_scan(caller, organization_id)
            .await?
            .has_critical_orphans())
    }

    // -----------------------------------------------------------------------
    // Per-record checks
    // -----------------------------------------------------------------------

    async fn check_user(&self, user: &User) -> Check {
        let Some(directory_user_id) = user.directory_user_id.as_deref() else {
            return match user.status {
                UserStatus::Invited => Check::Healthy,
                _ => Check::Orphan("no directory account reference".into()),
            };
        };
        match self.directory.user_exists(directory_user_id).await {
            Ok(true) => Check::Healthy,
            Ok(false) => Check::Orphan("directory account not found".into()),
            Err(e) => Check::Unknown(e.to_string()),
        }
    }

    async fn check_credential(&self, credential: &DatabaseCredential) -> Check {
        if credential.secret_name.trim().is_empty() || credential.secret_uri.trim().is_empty() {
            return Check::Orphan("missing secret reference".into());
        }
        match self
            .secrets
            .secret_exists(&credential.secret_name, credential.organization_id)
            .await
        {
            Ok(false) => return Check::Orphan("secret not found in secret store".into()),
            Err(e) => return Check::Unknown(e.to_string()),
            Ok(true) => {}
        }
        match self.secrets.get_secret_enabled(&credential.secret_name).await {
            Ok(true) => Check::Healthy,
            Ok(false) => Check::Orphan("secret is disabled".into()),
            Err(e) => Check::Unknown(e.to_string()),
        }
    }

    async fn check_capability_group(&self, capability: &CapabilityType) -> Check {
        let Some(group) = capability.directory_group_id.as_deref() else {
            return Check::Orphan(NO_BACKING_GROUP.into());
        };
        match self.directory.group_exists(group).await {
            Ok(true) => Check::Healthy,
            Ok(false) => Check::Orphan(MISSING_BACKING_GROUP.into()),
            Err(e) => Check::Unknown(e.to_string()),
        }
    }

    async fn check_organization(&self, organization: &Organization) -> Check {
        let mut reasons = Vec::new();
        if !organization.has_derived_id() {
            reasons.push(DERIVED_ID_MISMATCH.to_string());
        }
        let mut unknown = None;
        match organization.directory_group_id.as_deref() {
            None => reasons.push(MISSING_DIRECTORY_GROUP.to_string()),
            Some(group) => match self.directory.group_exists(group).await {
                Ok(true) => {}
                Ok(false) => reasons.push("directory group not found".to_string()),
                Err(e) => unknown = Some(e.to_string()),
            },
        }
        match (reasons.is_empty(), unknown) {
            (false, _) => Check::Orphan(reasons.join("; ")),
            (true, Some(reason)) => Check::Unknown(reason),
            (true, None) => Check::Healthy,
        }
    }
}

fn fold(resource_type: ResourceType, organization_id: Option<Uuid>, checked: Vec<Checked>) -> OrphanScanResult {
    let mut result = OrphanScanResult::new(resource_type, organization_id);
    result.total_scanned = checked.len() as u64;
    let detected_at = Utc::now();
    for item in checked {
        match item.check {
            Check::Healthy => {}
            Check::Orphan(reason) => {
                debug!(resource_id = %item.resource_id, ?resource_type, reason = %reason, "Orphan found");
                result.orphans.push(OrphanedResource {
                    resource_id: item.resource_id,
                    name: item.name,
                    resource_type,
                    reason,
                    organization_id: item.organization_id,
                    last_modified: item.last_modified,
                    detected_at,
                });
            }
            Check::Unknown(reason) => result.unverified.push(UnverifiedResource {
                resource_id: item.resource_id,
                resource_type,
                reason,
            }),
        }
    }
    result
}
