//! SurrealDB implementation of [`UserRepository`].

use chrono::{DateTime, Utc};
use orgsync_core::error::OrgSyncResult;
use orgsync_core::models::user::{CreateUser, UpdateUser, User, UserStatus};
use orgsync_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{parse_uuid, parse_uuid_list, uuid_strings};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct UserRow {
    organization_id: String,
    email: String,
    directory_user_id: Option<String>,
    is_active: bool,
    is_deleted: bool,
    status: String,
    database_credential_ids: Vec<String>,
    capability_type_ids: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    organization_id: String,
    email: String,
    directory_user_id: Option<String>,
    is_active: bool,
    is_deleted: bool,
    status: String,
    database_credential_ids: Vec<String>,
    capability_type_ids: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<UserStatus, DbError> {
    match s {
        "Invited" => Ok(UserStatus::Invited),
        "Active" => Ok(UserStatus::Active),
        "Disabled" => Ok(UserStatus::Disabled),
        other => Err(DbError::Corrupt(format!("unknown user status: {other}"))),
    }
}

fn status_to_string(s: UserStatus) -> &'static str {
    match s {
        UserStatus::Invited => "Invited",
        UserStatus::Active => "Active",
        UserStatus::Disabled => "Disabled",
    }
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            email: self.email,
            directory_user_id: self.directory_user_id,
            is_active: self.is_active,
            is_deleted: self.is_deleted,
            status: parse_status(&self.status)?,
            database_credential_ids: parse_uuid_list(
                &self.database_credential_ids,
                "database credential",
            )?,
            capability_type_ids: parse_uuid_list(&self.capability_type_ids, "capability type")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = parse_uuid(&self.record_id, "user")?;
        Ok(User {
            id,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            email: self.email,
            directory_user_id: self.directory_user_id,
            is_active: self.is_active,
            is_deleted: self.is_deleted,
            status: parse_status(&self.status)?,
            database_credential_ids: parse_uuid_list(
                &self.database_credential_ids,
                "database credential",
            )?,
            capability_type_ids: parse_uuid_list(&self.capability_type_ids, "capability type")?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> OrgSyncResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 organization_id = $organization_id, \
                 email = $email, \
                 directory_user_id = $directory_user_id, \
                 is_active = true, is_deleted = false, \
                 status = $status, \
                 database_credential_ids = $database_credential_ids, \
                 capability_type_ids = $capability_type_ids",
            )
            .bind(("id", id_str.clone()))
            .bind(("organization_id", input.organization_id.to_string()))
            .bind(("email", input.email.to_ascii_lowercase()))
            .bind(("directory_user_id", input.directory_user_id))
            .bind(("status", status_to_string(input.status).to_string()))
            .bind((
                "database_credential_ids",
                uuid_strings(&input.database_credential_ids),
            ))
            .bind(("capability_type_ids", uuid_strings(&input.capability_type_ids)))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, organization_id: Uuid, id: Uuid) -> OrgSyncResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('user', $id) \
                 WHERE organization_id = $organization_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_email(&self, organization_id: Uuid, email: &str) -> OrgSyncResult<User> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE organization_id = $organization_id AND email = $email",
            )
            .bind(("organization_id", organization_id.to_string()))
            .bind(("email", email.to_ascii_lowercase()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: format!("email={email}"),
        })?;

        Ok(row.try_into_user()?)
    }

    async fn update(&self, organization_id: Uuid, id: Uuid, input: UpdateUser) -> OrgSyncResult<User> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.directory_user_id.is_some() {
            sets.push("directory_user_id = $directory_user_id");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.status.is_some() {
            sets.push("status = $status");
        }
        if input.database_credential_ids.is_some() {
            sets.push("database_credential_ids = $database_credential_ids");
        }
        if input.capability_type_ids.is_some() {
            sets.push("capability_type_ids = $capability_type_ids");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('user', $id) SET {} \
             WHERE organization_id = $organization_id",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("organization_id", organization_id.to_string()));

        if let Some(email) = input.email {
            builder = builder.bind(("email", email.to_ascii_lowercase()));
        }
        if let Some(directory_user_id) = input.directory_user_id {
            builder = builder.bind(("directory_user_id", directory_user_id));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(status) = input.status {
            builder = builder.bind(("status", status_to_string(status).to_string()));
        }
        if let Some(ids) = input.database_credential_ids {
            builder = builder.bind(("database_credential_ids", uuid_strings(&ids)));
        }
        if let Some(ids) = input.capability_type_ids {
            builder = builder.bind(("capability_type_ids", uuid_strings(&ids)));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn delete(&self, organization_id: Uuid, id: Uuid) -> OrgSyncResult<()> {
        // Soft-delete: keep the row for history.
        self.db
            .query(
                "UPDATE type::record('user', $id) SET \
                 is_deleted = true, is_active = false, \
                 updated_at = time::now() \
                 WHERE organization_id = $organization_id",
            )
            .bind(("id", id.to_string()))
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> OrgSyncResult<Vec<User>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE organization_id = $organization_id \
                 ORDER BY created_at ASC",
            )
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_into_user())
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
