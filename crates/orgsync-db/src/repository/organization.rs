//! SurrealDB implementation of [`OrganizationRepository`].
//!
//! Records are keyed by the domain-derived id, so registration is an
//! idempotent look-up-or-create.

use chrono::{DateTime, Utc};
use orgsync_core::error::{OrgSyncError, OrgSyncResult};
use orgsync_core::models::organization::{
    CreateOrganization, Organization, OrganizationStatus, UpdateOrganization, normalize_domain,
    organization_id_for_domain,
};
use orgsync_core::repository::{OrganizationRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{parse_uuid, parse_uuid_list, uuid_strings};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OrganizationRow {
    name: String,
    domain: String,
    status: String,
    allow_invitations: bool,
    directory_group_id: Option<String>,
    capability_type_ids: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OrganizationRowWithId {
    record_id: String,
    name: String,
    domain: String,
    status: String,
    allow_invitations: bool,
    directory_group_id: Option<String>,
    capability_type_ids: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<OrganizationStatus, DbError> {
    match s {
        "Active" => Ok(OrganizationStatus::Active),
        "Inactive" => Ok(OrganizationStatus::Inactive),
        other => Err(DbError::Corrupt(format!("unknown organization status: {other}"))),
    }
}

fn status_to_string(s: OrganizationStatus) -> &'static str {
    match s {
        OrganizationStatus::Active => "Active",
        OrganizationStatus::Inactive => "Inactive",
    }
}

impl OrganizationRow {
    fn into_organization(self, id: Uuid) -> Result<Organization, DbError> {
        Ok(Organization {
            id,
            name: self.name,
            domain: self.domain,
            status: parse_status(&self.status)?,
            allow_invitations: self.allow_invitations,
            directory_group_id: self.directory_group_id,
            capability_type_ids: parse_uuid_list(&self.capability_type_ids, "capability type")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl OrganizationRowWithId {
    fn try_into_organization(self) -> Result<Organization, DbError> {
        let id = parse_uuid(&self.record_id, "organization")?;
        Ok(Organization {
            id,
            name: self.name,
            domain: self.domain,
            status: parse_status(&self.status)?,
            allow_invitations: self.allow_invitations,
            directory_group_id: self.directory_group_id,
            capability_type_ids: parse_uuid_list(&self.capability_type_ids, "capability type")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the Organization repository.
#[derive(Clone)]
pub struct SurrealOrganizationRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealOrganizationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> OrganizationRepository for SurrealOrganizationRepository<C> {
    async fn ensure(&self, input: CreateOrganization) -> OrgSyncResult<Organization> {
        let domain = normalize_domain(&input.domain);
        if domain.is_empty() {
            return Err(OrgSyncError::Validation {
                message: "organization domain must not be empty".into(),
            });
        }
        let id = organization_id_for_domain(&domain);

        match self.get_by_id(id).await {
            Ok(existing) => {
                debug!(organization_id = %id, %domain, "Organization already registered");
                return Ok(existing);
            }
            Err(OrgSyncError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let id_str = id.to_string();
        let result = self
            .db
            .query(
                "CREATE type::record('organization', $id) SET \
                 name = $name, domain = $domain, status = 'Active', \
                 allow_invitations = $allow_invitations, \
                 directory_group_id = $directory_group_id, \
                 capability_type_ids = $capability_type_ids",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("domain", domain))
            .bind(("allow_invitations", input.allow_invitations))
            .bind(("directory_group_id", input.directory_group_id))
            .bind(("capability_type_ids", uuid_strings(&input.capability_type_ids)))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                // A concurrent registration of the same domain won the race.
                if let Ok(existing) = self.get_by_id(id).await {
                    return Ok(existing);
                }
                return Err(DbError::Migration(e.to_string()).into());
            }
        };

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: id_str,
        })?;

        Ok(row.into_organization(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> OrgSyncResult<Organization> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('organization', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: id_str,
        })?;

        Ok(row.into_organization(id)?)
    }

    async fn get_by_domain(&self, domain: &str) -> OrgSyncResult<Organization> {
        let normalized = normalize_domain(domain);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organization WHERE domain = $domain",
            )
            .bind(("domain", normalized))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: format!("domain={domain}"),
        })?;

        Ok(row.try_into_organization()?)
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> OrgSyncResult<Organization> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.allow_invitations.is_some() {
            sets.push("allow_invitations = $allow_invitations");
        }
        if input.directory_group_id.is_some() {
            sets.push("directory_group_id = $directory_group_id");
        }
        if input.capability_type_ids.is_some() {
            sets.push("capability_type_ids = $capability_type_ids");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('organization', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status_to_string(status).to_string()));
        }
        if let Some(allow_invitations) = input.allow_invitations {
            builder = builder.bind(("allow_invitations", allow_invitations));
        }
        if let Some(directory_group_id) = input.directory_group_id {
            builder = builder.bind(("directory_group_id", directory_group_id));
        }
        if let Some(ids) = input.capability_type_ids {
            builder = builder.bind(("capability_type_ids", uuid_strings(&ids)));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "organization".into(),
            id: id_str,
        })?;

        Ok(row.into_organization(id)?)
    }

    async fn list(&self, pagination: Pagination) -> OrgSyncResult<PaginatedResult<Organization>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM organization GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organization \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| row.try_into_organization())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_active(&self) -> OrgSyncResult<Vec<Organization>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM organization WHERE status = 'Active' \
                 ORDER BY created_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_into_organization())
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
