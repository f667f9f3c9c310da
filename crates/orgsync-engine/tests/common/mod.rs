//! Shared fixtures for the engine integration tests: an in-memory SurrealDB
//! and gateway fakes with failure injection.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use orgsync_core::gateway::{
    DirectoryGateway, EventEnvelope, GatewayError, GatewayResult, NotificationChannel,
    SecretStoreGateway,
};
use orgsync_core::models::capability::{CapabilityType, CreateCapabilityType};
use orgsync_core::models::context::{CallerContext, CallerRole};
use orgsync_core::models::credential::{CreateDatabaseCredential, DatabaseCredential};
use orgsync_core::models::organization::{CreateOrganization, Organization};
use orgsync_core::models::user::{CreateUser, User, UserStatus};
use orgsync_core::repository::{
    CapabilityTypeRepository, DatabaseCredentialRepository, OrganizationRepository, Repositories,
    UserRepository,
};
use orgsync_db::SurrealRepositories;
use orgsync_engine::memory::{InMemoryDirectory, InMemorySecretStore, SecretEntry};
use orgsync_engine::{EngineConfig, OrgSyncEngine};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Directory fake
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DirectoryFaults {
    fail_add: HashSet<String>,
    refuse_add: HashSet<String>,
    fail_remove: HashSet<String>,
    unavailable_groups: HashSet<String>,
    unavailable: bool,
}

/// Cloneable handle over an [`InMemoryDirectory`] whose calls can be made to
/// fail per group.
#[derive(Clone, Default)]
pub struct FakeDirectory {
    inner: Arc<InMemoryDirectory>,
    faults: Arc<Mutex<DirectoryFaults>>,
    adds: Arc<AtomicUsize>,
}

impl FakeDirectory {
    pub fn state(&self) -> &InMemoryDirectory {
        &self.inner
    }

    /// `add_user_to_group` on this group returns an error.
    pub fn fail_add(&self, group: &str) {
        self.faults.lock().unwrap().fail_add.insert(group.into());
    }

    /// `add_user_to_group` on this group returns `Ok(false)`.
    pub fn refuse_add(&self, group: &str) {
        self.faults.lock().unwrap().refuse_add.insert(group.into());
    }

    pub fn fail_remove(&self, group: &str) {
        self.faults.lock().unwrap().fail_remove.insert(group.into());
    }

    /// Every read of this group (existence, members) returns an error.
    pub fn make_group_unavailable(&self, group: &str) {
        self.faults.lock().unwrap().unavailable_groups.insert(group.into());
    }

    /// Every call returns an error.
    pub fn go_offline(&self) {
        self.faults.lock().unwrap().unavailable = true;
    }

    pub fn heal(&self) {
        *self.faults.lock().unwrap() = DirectoryFaults::default();
    }

    pub fn add_calls(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    fn offline(&self) -> GatewayResult<()> {
        if self.faults.lock().unwrap().unavailable {
            return Err(GatewayError::Unavailable("directory offline".into()));
        }
        Ok(())
    }

    fn group_readable(&self, group: &str) -> GatewayResult<()> {
        self.offline()?;
        if self.faults.lock().unwrap().unavailable_groups.contains(group) {
            return Err(GatewayError::Unavailable(format!("group {group} unavailable")));
        }
        Ok(())
    }
}

impl DirectoryGateway for FakeDirectory {
    async fn group_exists(&self, group_id: &str) -> GatewayResult<bool> {
        self.group_readable(group_id)?;
        self.inner.group_exists(group_id).await
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> GatewayResult<bool> {
        self.offline()?;
        self.adds.fetch_add(1, Ordering::SeqCst);
        {
            let faults = self.faults.lock().unwrap();
            if faults.fail_add.contains(group_id) {
                return Err(GatewayError::Unavailable("add failed".into()));
            }
            if faults.refuse_add.contains(group_id) {
                return Ok(false);
            }
        }
        self.inner.add_user_to_group(user_id, group_id).await
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> GatewayResult<bool> {
        self.offline()?;
        if self.faults.lock().unwrap().fail_remove.contains(group_id) {
            return Err(GatewayError::Unavailable("remove failed".into()));
        }
        self.inner.remove_user_from_group(user_id, group_id).await
    }

    async fn get_group_members(&self, group_id: &str) -> GatewayResult<Vec<String>> {
        self.group_readable(group_id)?;
        self.inner.get_group_members(group_id).await
    }

    async fn user_exists(&self, user_id: &str) -> GatewayResult<bool> {
        self.offline()?;
        self.inner.user_exists(user_id).await
    }

    async fn get_account_enabled(&self, user_id: &str) -> GatewayResult<bool> {
        self.offline()?;
        self.inner.get_account_enabled(user_id).await
    }
}

// ---------------------------------------------------------------------------
// Secret store fake
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeSecretStore {
    inner: Arc<InMemorySecretStore>,
    unavailable: Arc<AtomicBool>,
}

impl FakeSecretStore {
    pub fn state(&self) -> &InMemorySecretStore {
        &self.inner
    }

    pub fn put(&self, name: &str, organization_id: Uuid, enabled: bool) {
        self.inner.put(SecretEntry {
            name: name.into(),
            organization_id: Some(organization_id),
            enabled,
        });
    }

    pub fn go_offline(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> GatewayResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("secret store offline".into()));
        }
        Ok(())
    }
}

impl SecretStoreGateway for FakeSecretStore {
    async fn secret_exists(&self, name: &str, organization_id: Uuid) -> GatewayResult<bool> {
        self.check()?;
        self.inner.secret_exists(name, organization_id).await
    }

    async fn get_secret_enabled(&self, name: &str) -> GatewayResult<bool> {
        self.check()?;
        self.inner.get_secret_enabled(name).await
    }
}

// ---------------------------------------------------------------------------
// Notification channel
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RecordingChannel {
    events: Arc<Mutex<Vec<(String, EventEnvelope)>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingChannel {
    pub fn events(&self) -> Vec<(String, EventEnvelope)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event_type: &str, organization_id: Uuid) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.event_type == event_type && e.organization_id == organization_id)
            .count()
    }

    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

impl NotificationChannel for RecordingChannel {
    async fn publish(&self, group_key: &str, envelope: EventEnvelope) -> GatewayResult<()> {
        self.events
            .lock()
            .unwrap()
            .push((group_key.to_string(), envelope));
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("push transport down".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub type TestEngine = OrgSyncEngine<SurrealRepositories<Db>, FakeDirectory, FakeSecretStore, RecordingChannel>;

pub struct Harness {
    pub engine: TestEngine,
    /// Second handle on the same database for arranging and asserting.
    pub repos: SurrealRepositories<Db>,
    pub directory: FakeDirectory,
    pub secrets: FakeSecretStore,
    pub channel: RecordingChannel,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        external_call_timeout_secs: 5,
        max_directory_concurrency: 4,
        ..Default::default()
    }
}

pub async fn setup() -> Harness {
    setup_with(test_config()).await
}

pub async fn setup_with(config: EngineConfig) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    orgsync_db::run_migrations(&db).await.unwrap();

    let directory = FakeDirectory::default();
    let secrets = FakeSecretStore::default();
    let channel = RecordingChannel::default();
    let engine = OrgSyncEngine::new(
        SurrealRepositories::new(db.clone()),
        directory.clone(),
        secrets.clone(),
        channel.clone(),
        config,
    );

    Harness {
        engine,
        repos: SurrealRepositories::new(db),
        directory,
        secrets,
        channel,
    }
}

impl Harness {
    /// Register an organization and its directory group, opting into the
    /// given capability types.
    pub async fn organization(&self, domain: &str, capability_type_ids: Vec<Uuid>) -> Organization {
        let group = format!("grp-{domain}");
        self.directory.state().create_group(&group);
        self.repos
            .organizations()
            .ensure(CreateOrganization {
                name: format!("Org {domain}"),
                domain: domain.into(),
                allow_invitations: true,
                directory_group_id: Some(group),
                capability_type_ids,
            })
            .await
            .unwrap()
    }

    /// A capability type whose backing group exists in the directory.
    pub async fn capability(&self, name: &str) -> CapabilityType {
        let group = format!("cap-{name}");
        self.directory.state().create_group(&group);
        self.capability_with_group(name, Some(&group)).await
    }

    /// A capability type whose backing group is not created in the directory.
    pub async fn capability_with_group(&self, name: &str, group: Option<&str>) -> CapabilityType {
        self.repos
            .capability_types()
            .create(CreateCapabilityType {
                name: name.into(),
                description: format!("{name} capability"),
                directory_group_id: group.map(str::to_string),
            })
            .await
            .unwrap()
    }

    /// An active user with a matching enabled directory account.
    pub async fn user(&self, organization_id: Uuid, email: &str) -> User {
        let directory_user_id = directory_id(email);
        self.directory.state().upsert_account(&directory_user_id, true);
        self.repos
            .users()
            .create(CreateUser {
                organization_id,
                email: email.into(),
                directory_user_id: Some(directory_user_id),
                status: UserStatus::Active,
                database_credential_ids: vec![],
                capability_type_ids: vec![],
            })
            .await
            .unwrap()
    }

    /// A credential, with its secret present and enabled when `with_secret`.
    pub async fn credential(&self, organization_id: Uuid, name: &str, with_secret: bool) -> DatabaseCredential {
        let secret_name = format!("dbcred-{name}");
        if with_secret {
            self.secrets.put(&secret_name, organization_id, true);
        }
        self.repos
            .credentials()
            .create(CreateDatabaseCredential {
                organization_id,
                name: name.into(),
                server: "sql.example.net".into(),
                database_name: name.into(),
                username: "reader".into(),
                secret_name: secret_name.clone(),
                secret_uri: format!("https://vault.example.net/secrets/{secret_name}"),
                created_by: "admin".into(),
            })
            .await
            .unwrap()
    }

    pub async fn reload_user(&self, user: &User) -> User {
        self.repos
            .users()
            .get_by_id(user.organization_id, user.id)
            .await
            .unwrap()
    }
}

pub fn directory_id(email: &str) -> String {
    format!("dir-{email}")
}

pub fn member_of(organization_id: Uuid) -> CallerContext {
    CallerContext::new("member@test", Some(organization_id))
}

pub fn admin_of(organization_id: Uuid) -> CallerContext {
    CallerContext::new("admin@test", Some(organization_id)).with_roles([CallerRole::OrgAdmin, CallerRole::Member])
}
