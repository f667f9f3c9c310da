//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organizations (tenant root, id derived from domain)
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD domain ON TABLE organization TYPE string;
DEFINE FIELD status ON TABLE organization TYPE string \
    ASSERT $value IN ['Active', 'Inactive'];
DEFINE FIELD allow_invitations ON TABLE organization TYPE bool \
    DEFAULT false;
DEFINE FIELD directory_group_id ON TABLE organization \
    TYPE option<string>;
DEFINE FIELD capability_type_ids ON TABLE organization \
    TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_organization_domain ON TABLE organization \
    COLUMNS domain UNIQUE;

-- =======================================================================
-- Capability types (global scope)
-- =======================================================================
DEFINE TABLE capability_type SCHEMAFULL;
DEFINE FIELD name ON TABLE capability_type TYPE string;
DEFINE FIELD description ON TABLE capability_type TYPE string;
DEFINE FIELD directory_group_id ON TABLE capability_type \
    TYPE option<string>;
DEFINE FIELD is_active ON TABLE capability_type TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE capability_type TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE capability_type TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_capability_type_name ON TABLE capability_type \
    COLUMNS name UNIQUE;

-- =======================================================================
-- Users (organization scope)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD directory_user_id ON TABLE user TYPE option<string>;
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD is_deleted ON TABLE user TYPE bool DEFAULT false;
DEFINE FIELD status ON TABLE user TYPE string \
    ASSERT $value IN ['Invited', 'Active', 'Disabled'];
DEFINE FIELD database_credential_ids ON TABLE user \
    TYPE array<string> DEFAULT [];
DEFINE FIELD capability_type_ids ON TABLE user \
    TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_org_email ON TABLE user \
    COLUMNS organization_id, email UNIQUE;

-- =======================================================================
-- Capability assignments (organization scope, soft-deleted)
-- =======================================================================
DEFINE TABLE capability_assignment SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE capability_assignment TYPE string;
DEFINE FIELD user_id ON TABLE capability_assignment TYPE string;
DEFINE FIELD capability_type_id ON TABLE capability_assignment \
    TYPE string;
DEFINE FIELD directory_group_id ON TABLE capability_assignment \
    TYPE string;
DEFINE FIELD state ON TABLE capability_assignment TYPE string \
    ASSERT $value IN ['Active', 'Inactive'];
DEFINE FIELD assigned_by ON TABLE capability_assignment TYPE string;
DEFINE FIELD assigned_at ON TABLE capability_assignment TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deactivated_at ON TABLE capability_assignment \
    TYPE option<datetime>;
DEFINE FIELD updated_at ON TABLE capability_assignment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_assignment_org_user_capability \
    ON TABLE capability_assignment \
    COLUMNS organization_id, user_id, capability_type_id UNIQUE;

-- =======================================================================
-- Database credentials (organization scope, secret held externally)
-- =======================================================================
DEFINE TABLE database_credential SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE database_credential TYPE string;
DEFINE FIELD name ON TABLE database_credential TYPE string;
DEFINE FIELD server ON TABLE database_credential TYPE string;
DEFINE FIELD database_name ON TABLE database_credential TYPE string;
DEFINE FIELD username ON TABLE database_credential TYPE string;
DEFINE FIELD secret_name ON TABLE database_credential TYPE string;
DEFINE FIELD secret_uri ON TABLE database_credential TYPE string;
DEFINE FIELD is_active ON TABLE database_credential TYPE bool \
    DEFAULT true;
DEFINE FIELD created_by ON TABLE database_credential TYPE string;
DEFINE FIELD created_at ON TABLE database_credential TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE database_credential TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_credential_org_name ON TABLE database_credential \
    COLUMNS organization_id, name UNIQUE;
";

/// Run all pending migrations against the given SurrealDB instance.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
