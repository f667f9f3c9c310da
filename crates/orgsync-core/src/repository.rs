//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Organization-scoped repositories
//! take an `organization_id` parameter and must never return or mutate a
//! row owned by a different organization. Authorization itself is decided
//! by the engine's isolation guard, not here.

use uuid::Uuid;

use crate::error::OrgSyncResult;
use crate::models::{
    assignment::{Assignment, CreateAssignment},
    capability::{CapabilityType, CreateCapabilityType, UpdateCapabilityType},
    credential::{CreateDatabaseCredential, DatabaseCredential, UpdateDatabaseCredential},
    organization::{CreateOrganization, Organization, UpdateOrganization},
    user::{CreateUser, UpdateUser, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Global scope
// ---------------------------------------------------------------------------

pub trait OrganizationRepository: Send + Sync {
    /// Register an organization under its domain-derived id.
    ///
    /// Returns the existing record unchanged when the domain is already
    /// registered.
    fn ensure(
        &self,
        input: CreateOrganization,
    ) -> impl Future<Output = OrgSyncResult<Organization>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = OrgSyncResult<Organization>> + Send;
    fn get_by_domain(
        &self,
        domain: &str,
    ) -> impl Future<Output = OrgSyncResult<Organization>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOrganization,
    ) -> impl Future<Output = OrgSyncResult<Organization>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OrgSyncResult<PaginatedResult<Organization>>> + Send;
    fn list_active(&self) -> impl Future<Output = OrgSyncResult<Vec<Organization>>> + Send;
}

pub trait CapabilityTypeRepository: Send + Sync {
    fn create(
        &self,
        input: CreateCapabilityType,
    ) -> impl Future<Output = OrgSyncResult<CapabilityType>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = OrgSyncResult<CapabilityType>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateCapabilityType,
    ) -> impl Future<Output = OrgSyncResult<CapabilityType>> + Send;
    fn list(&self) -> impl Future<Output = OrgSyncResult<Vec<CapabilityType>>> + Send;
}

// ---------------------------------------------------------------------------
// Organization-scoped repositories
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = OrgSyncResult<User>> + Send;
    fn get_by_id(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<User>> + Send;
    fn get_by_email(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> impl Future<Output = OrgSyncResult<User>> + Send;
    fn update(
        &self,
        organization_id: Uuid,
        id: Uuid,
        input: UpdateUser,
    ) -> impl Future<Output = OrgSyncResult<User>> + Send;
    /// Soft-delete: sets the deleted flag and clears the active flag.
    fn delete(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<()>> + Send;
    fn list_by_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<Vec<User>>> + Send;
}

pub trait AssignmentRepository: Send + Sync {
    /// Record a new assignment in the active state.
    fn create(
        &self,
        input: CreateAssignment,
    ) -> impl Future<Output = OrgSyncResult<Assignment>> + Send;
    /// Find the assignment row for a (user, capability type) pair, in any
    /// state.
    fn find(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        capability_type_id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<Option<Assignment>>> + Send;
    /// Flip a row to active, refreshing its group and audit fields.
    fn activate(
        &self,
        organization_id: Uuid,
        id: Uuid,
        directory_group_id: &str,
        actor: &str,
    ) -> impl Future<Output = OrgSyncResult<Assignment>> + Send;
    fn deactivate(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<Assignment>> + Send;
    fn list_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<Vec<Assignment>>> + Send;
    fn list_active_by_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<Vec<Assignment>>> + Send;
}

pub trait DatabaseCredentialRepository: Send + Sync {
    fn create(
        &self,
        input: CreateDatabaseCredential,
    ) -> impl Future<Output = OrgSyncResult<DatabaseCredential>> + Send;
    fn get_by_id(
        &self,
        organization_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<DatabaseCredential>> + Send;
    fn update(
        &self,
        organization_id: Uuid,
        id: Uuid,
        input: UpdateDatabaseCredential,
    ) -> impl Future<Output = OrgSyncResult<DatabaseCredential>> + Send;
    fn list_by_organization(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = OrgSyncResult<Vec<DatabaseCredential>>> + Send;
}

/// Bundle of every repository the engine needs, so engine components take
/// one type parameter for the relational store.
pub trait Repositories: Send + Sync + 'static {
    type Organizations: OrganizationRepository;
    type Users: UserRepository;
    type CapabilityTypes: CapabilityTypeRepository;
    type Assignments: AssignmentRepository;
    type Credentials: DatabaseCredentialRepository;

    fn organizations(&self) -> &Self::Organizations;
    fn users(&self) -> &Self::Users;
    fn capability_types(&self) -> &Self::CapabilityTypes;
    fn assignments(&self) -> &Self::Assignments;
    fn credentials(&self) -> &Self::Credentials;
}
