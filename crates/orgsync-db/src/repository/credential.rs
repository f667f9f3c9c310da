//! SurrealDB implementation of [`DatabaseCredentialRepository`].
//!
//! Only metadata and the secret reference are stored here; the secret
//! material itself never touches the database.

use chrono::{DateTime, Utc};
use orgsync_core::error::OrgSyncResult;
use orgsync_core::models::credential::{
    CreateDatabaseCredential, DatabaseCredential, UpdateDatabaseCredential,
};
use orgsync_core::repository::DatabaseCredentialRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CredentialRow {
    organization_id: String,
    name: String,
    server: String,
    database_name: String,
    username: String,
    secret_name: String,
    secret_uri: String,
    is_active: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CredentialRowWithId {
    record_id: String,
    organization_id: String,
    name: String,
    server: String,
    database_name: String,
    username: String,
    secret_name: String,
    secret_uri: String,
    is_active: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CredentialRow {
    fn into_credential(self, id: Uuid) -> Result<DatabaseCredential, DbError> {
        Ok(DatabaseCredential {
            id,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            name: self.name,
            server: self.server,
            database_name: self.database_name,
            username: self.username,
            secret_name: self.secret_name,
            secret_uri: self.secret_uri,
            is_active: self.is_active,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl CredentialRowWithId {
    fn try_into_credential(self) -> Result<DatabaseCredential, DbError> {
        Ok(DatabaseCredential {
            id: parse_uuid(&self.record_id, "database credential")?,
            organization_id: parse_uuid(&self.organization_id, "organization")?,
            name: self.name,
            server: self.server,
            database_name: self.database_name,
            username: self.username,
            secret_name: self.secret_name,
            secret_uri: self.secret_uri,
            is_active: self.is_active,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the database credential repository.
#[derive(Clone)]
pub struct SurrealCredentialRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCredentialRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> DatabaseCredentialRepository for SurrealCredentialRepository<C> {
    async fn create(&self, input: CreateDatabaseCredential) -> OrgSyncResult<DatabaseCredential> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('database_credential', $id) SET \
                 organization_id = $organization_id, name = $name, \
                 server = $server, database_name = $database_name, \
                 username = $username, secret_name = $secret_name, \
                 secret_uri = $secret_uri, is_active = true, \
                 created_by = $created_by",
            )
            .bind(("id", id_str.clone()))
            .bind(("organization_id", input.organization_id.to_string()))
            .bind(("name", input.name))
            .bind(("server", input.server))
            .bind(("database_name", input.database_name))
            .bind(("username", input.username))
            .bind(("secret_name", input.secret_name))
            .bind(("secret_uri", input.secret_uri))
            .bind(("created_by", input.created_by))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<CredentialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "database_credential".into(),
            id: id_str,
        })?;

        Ok(row.into_credential(id)?)
    }

    async fn get_by_id(&self, organization_id: Uuid, id: Uuid) -> OrgSyncResult<DatabaseCredential> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('database_credential', $id) \
                 WHERE organization_id = $organization_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "database_credential".into(),
            id: id_str,
        })?;

        Ok(row.into_credential(id)?)
    }

    async fn update(
        &self,
        organization_id: Uuid,
        id: Uuid,
        input: UpdateDatabaseCredential,
    ) -> OrgSyncResult<DatabaseCredential> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.server.is_some() {
            sets.push("server = $server");
        }
        if input.database_name.is_some() {
            sets.push("database_name = $database_name");
        }
        if input.username.is_some() {
            sets.push("username = $username");
        }
        if input.secret_name.is_some() {
            sets.push("secret_name = $secret_name");
        }
        if input.secret_uri.is_some() {
            sets.push("secret_uri = $secret_uri");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('database_credential', $id) SET {} \
             WHERE organization_id = $organization_id",
            sets.join(", ")
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("id", id_str.clone()))
            .bind(("organization_id", organization_id.to_string()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(server) = input.server {
            builder = builder.bind(("server", server));
        }
        if let Some(database_name) = input.database_name {
            builder = builder.bind(("database_name", database_name));
        }
        if let Some(username) = input.username {
            builder = builder.bind(("username", username));
        }
        if let Some(secret_name) = input.secret_name {
            builder = builder.bind(("secret_name", secret_name));
        }
        if let Some(secret_uri) = input.secret_uri {
            builder = builder.bind(("secret_uri", secret_uri));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        let rows: Vec<CredentialRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "database_credential".into(),
            id: id_str,
        })?;

        Ok(row.into_credential(id)?)
    }

    async fn list_by_organization(&self, organization_id: Uuid) -> OrgSyncResult<Vec<DatabaseCredential>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM database_credential \
                 WHERE organization_id = $organization_id \
                 ORDER BY created_at ASC",
            )
            .bind(("organization_id", organization_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CredentialRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_into_credential())
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
