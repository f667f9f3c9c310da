//! SurrealDB implementation of [`CapabilityTypeRepository`].

use chrono::{DateTime, Utc};
use orgsync_core::error::OrgSyncResult;
use orgsync_core::models::capability::{
    CapabilityType, CreateCapabilityType, UpdateCapabilityType,
};
use orgsync_core::repository::CapabilityTypeRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CapabilityTypeRow {
    name: String,
    description: String,
    directory_group_id: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CapabilityTypeRowWithId {
    record_id: String,
    name: String,
    description: String,
    directory_group_id: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CapabilityTypeRow {
    fn into_capability_type(self, id: Uuid) -> CapabilityType {
        CapabilityType {
            id,
            name: self.name,
            description: self.description,
            directory_group_id: self.directory_group_id,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl CapabilityTypeRowWithId {
    fn try_into_capability_type(self) -> Result<CapabilityType, DbError> {
        Ok(CapabilityType {
            id: parse_uuid(&self.record_id, "capability type")?,
            name: self.name,
            description: self.description,
            directory_group_id: self.directory_group_id,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the capability type repository.
#[derive(Clone)]
pub struct SurrealCapabilityTypeRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCapabilityTypeRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CapabilityTypeRepository for SurrealCapabilityTypeRepository<C> {
    async fn create(&self, input: CreateCapabilityType) -> OrgSyncResult<CapabilityType> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('capability_type', $id) SET \
                 name = $name, description = $description, \
                 directory_group_id = $directory_group_id, \
                 is_active = true",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", input.name))
            .bind(("description", input.description))
            .bind(("directory_group_id", input.directory_group_id))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<CapabilityTypeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "capability_type".into(),
            id: id_str,
        })?;

        Ok(row.into_capability_type(id))
    }

    async fn get_by_id(&self, id: Uuid) -> OrgSyncResult<CapabilityType> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('capability_type', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CapabilityTypeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "capability_type".into(),
            id: id_str,
        })?;

        Ok(row.into_capability_type(id))
    }

    async fn update(&self, id: Uuid, input: UpdateCapabilityType) -> OrgSyncResult<CapabilityType> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.directory_group_id.is_some() {
            sets.push("directory_group_id = $directory_group_id");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('capability_type', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(directory_group_id) = input.directory_group_id {
            builder = builder.bind(("directory_group_id", directory_group_id));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<CapabilityTypeRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "capability_type".into(),
            id: id_str,
        })?;

        Ok(row.into_capability_type(id))
    }

    async fn list(&self) -> OrgSyncResult<Vec<CapabilityType>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM capability_type \
                 ORDER BY name ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CapabilityTypeRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_into_capability_type())
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
