//! SurrealDB repository implementations.

mod assignment;
mod capability;
mod credential;
mod organization;
mod user;

pub use assignment::SurrealAssignmentRepository;
pub use capability::SurrealCapabilityTypeRepository;
pub use credential::SurrealCredentialRepository;
pub use organization::SurrealOrganizationRepository;
pub use user::SurrealUserRepository;

use orgsync_core::repository::Repositories;
use surrealdb::{Connection, Surreal};
use uuid::Uuid;

use crate::error::DbError;

/// Every SurrealDB repository over one shared connection.
#[derive(Clone)]
pub struct SurrealRepositories<C: Connection> {
    organizations: SurrealOrganizationRepository<C>,
    users: SurrealUserRepository<C>,
    capability_types: SurrealCapabilityTypeRepository<C>,
    assignments: SurrealAssignmentRepository<C>,
    credentials: SurrealCredentialRepository<C>,
}

impl<C: Connection> SurrealRepositories<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            organizations: SurrealOrganizationRepository::new(db.clone()),
            users: SurrealUserRepository::new(db.clone()),
            capability_types: SurrealCapabilityTypeRepository::new(db.clone()),
            assignments: SurrealAssignmentRepository::new(db.clone()),
            credentials: SurrealCredentialRepository::new(db),
        }
    }
}

impl<C: Connection> Repositories for SurrealRepositories<C> {
    type Organizations = SurrealOrganizationRepository<C>;
    type Users = SurrealUserRepository<C>;
    type CapabilityTypes = SurrealCapabilityTypeRepository<C>;
    type Assignments = SurrealAssignmentRepository<C>;
    type Credentials = SurrealCredentialRepository<C>;

    fn organizations(&self) -> &Self::Organizations {
        &self.organizations
    }

    fn users(&self) -> &Self::Users {
        &self.users
    }

    fn capability_types(&self) -> &Self::CapabilityTypes {
        &self.capability_types
    }

    fn assignments(&self) -> &Self::Assignments {
        &self.assignments
    }

    fn credentials(&self) -> &Self::Credentials {
        &self.credentials
    }
}

fn parse_uuid(value: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Corrupt(format!("invalid {what} UUID: {e}")))
}

fn parse_uuid_list(values: &[String], what: &str) -> Result<Vec<Uuid>, DbError> {
    values.iter().map(|v| parse_uuid(v, what)).collect()
}

fn uuid_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}
