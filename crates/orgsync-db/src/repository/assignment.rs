//! SurrealDB implementation of [`AssignmentRepository`].
//!
//! Assignment rows are soft-deleted: `deactivate` flips the state and stamps
//! `deactivated_at`, `activate` flips it back. Nothing here deletes a row.

use chrono::{DateTime, Utc};
use orgsync_core::error::OrgSyncResult;
use orgsync_core::models::assignment::{Assignment, AssignmentState, CreateAssignment};
use orgsync_core::repository::AssignmentRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    organization_id: String,
    user_id: String,
    capability_type_id: String,
    directory_group_id: String,
    state: String,
    assigned_by: String,
    assigned_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct AssignmentRowWithId {
    record_id: String,
    organization_id: String,
    user_id: String,
    capability_type_id: String,
    directory_group_id: String,
    state: String,
    assigned_by: String,
    assigned_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

fn parse_state(s: &str) -> Result<AssignmentState, DbError> {
    match s {
        "Active" => Ok(AssignmentState::Active),
        "Inactive" => Ok(AssignmentState::Inactive),
        other => Err(DbError::Corrupt(format!("unknown assignment state: {other}"))),
    }
}

impl AssignmentRow {
    fn into_assignment(self, id: Uuid) -> Result<Assignment, DbError> {
        Ok(Assignment {
            id,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            user_id: parse_uuid(&self.user_id, "user")?,
            capability_type_id: parse_uuid(&self.capability_type_id, "capability type")?,
            directory_group_id: self.directory_group_id,
            state: parse_state(&self.state)?,
            assigned_by: self.assigned_by,
            assigned_at: self.assigned_at,
            deactivated_at: self.deactivated_at,
            updated_at: self.updated_at,
        })
    }
}

impl AssignmentRowWithId {
    fn try_into_assignment(self) -> Result<Assignment, DbError> {
        Ok(Assignment {
            id: parse_uuid(&self.record_id, "assignment")?,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            user_id: parse_uuid(&self.user_id, "user")?,
            capability_type_id: parse_uuid(&self.capability_type_id, "capability type")?,
            directory_group_id: self.directory_group_id,
            state: parse_state(&self.state)?,
            assigned_by: self.assigned_by,
            assigned_at: self.assigned_at,
            deactivated_at: self.deactivated_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the capability assignment repository.
#[derive(Clone)]
pub struct SurrealAssignmentRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAssignmentRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn take_one(
        &self,
        query: &'static str,
        organization_id: Uuid,
        id: Uuid,
        directory_group_id: Option<String>,
        actor: Option<String>,
    ) -> OrgSyncResult<Assignment> {
        let id_str = id.to_string();

        let mut builder = self
            .db
            .query(query)
            .bind(("id", id_str.clone()))
            .bind(("organization_id", organization_id.to_string()));
        if let Some(directory_group_id) = directory_group_id {
            builder = builder.bind(("directory_group_id", directory_group_id));
        }
        if let Some(actor) = actor {
            builder = builder.bind(("actor", actor));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "capability_assignment".into(),
            id: id_str,
        })?;

        Ok(row.into_assignment(id)?)
    }
}

impl<C: Connection> AssignmentRepository for SurrealAssignmentRepository<C> {
    async fn create(&self, input: CreateAssignment) -> OrgSyncResult<Assignment> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('capability_assignment', $id) SET \
                 organization_id = $organization_id, user_id = $user_id, \
                 capability_type_id = $capability_type_id, \
                 directory_group_id = $directory_group_id, \
                 state = 'Active', assigned_by = $assigned_by, \
                 assigned_at = time::now(), deactivated_at = NONE",
            )
            .bind(("id", id_str.clone()))
            .bind(("organization_id", input.organization_id.to_string()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("capability_type_id", input.capability_type_id.to_string()))
            .bind(("directory_group_id", input.directory_group_id))
            .bind(("assigned_by", input.assigned_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "capability_assignment".into(),
            id: id_str,
        })?;

        Ok(row.into_assignment(id)?)
    }

    async fn find(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        capability_type_id: Uuid,
    ) -> OrgSyncResult<Option<Assignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM capability_assignment \
                 WHERE organization_id = $organization_id \
                 AND user_id = $user_id \
                 AND capability_type_id = $capability_type_id \
                 LIMIT 1",
            )
            .bind(("organization_id", organization_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("capability_type_id", capability_type_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRowWithId> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_assignment()?)),
            None => Ok(None),
        }
    }

    async fn activate(
        &self,
        organization_id: Uuid,
        id: Uuid,
        directory_group_id: &str,
        actor: &str,
    ) -> OrgSyncResult<Assignment> {
        self.take_one(
            "UPDATE type::record('capability_assignment', $id) SET \
             state = 'Active', directory_group_id = $directory_group_id, \
             assigned_by = $actor, assigned_at = time::now(), \
             deactivated_at = NONE, updated_at = time::now() \
             WHERE organization_id = $organization_id",
            organization_id,
            id,
            Some(directory_group_id.to_string()),
            Some(actor.to_string()),
        )
        .await
    }

    async fn deactivate(&self, organization_id: Uuid, id: Uuid) -> OrgSyncResult<Assignment> {
        self.take_one(
            "UPDATE type::record('capability_assignment', $id) SET \
             state = 'Inactive', deactivated_at = time::now(), \
             updated_at = time::now() \
             WHERE organization_id = $organization_id",
            organization_id,
            id,
            None,
            None,
        )
        .await
    }

    async fn list_for_user(&self, organization_id: Uuid, user_id: Uuid) -> OrgSyncResult<Vec<Assignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM capability_assignment \
                 WHERE organization_id = $organization_id AND user_id = $user_id \
                 ORDER BY assigned_at ASC",
            )
            .bind(("organization_id", organization_id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_into_assignment())
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    async fn list_active_by_organization(&self, organization_id: Uuid) -> OrgSyncResult<Vec<Assignment>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM capability_assignment \
                 WHERE organization_id = $organization_id AND state = 'Active' \
                 ORDER BY assigned_at ASC",
            )
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_into_assignment())
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
