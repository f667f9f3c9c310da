//! In-process directory and secret store.
//!
//! Both keep their state behind a `std::sync::RwLock` and never hold the lock
//! across an await point. They can be seeded from JSON snapshots, which is
//! how the server runs without a live identity provider.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use orgsync_core::gateway::{DirectoryGateway, GatewayError, GatewayResult, SecretStoreGateway};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAccount {
    pub id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub id: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub accounts: Vec<DirectoryAccount>,
    #[serde(default)]
    pub groups: Vec<DirectoryGroup>,
}

impl DirectorySnapshot {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Default)]
struct DirectoryState {
    accounts: HashMap<String, bool>,
    groups: HashMap<String, BTreeSet<String>>,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let mut state = DirectoryState::default();
        for account in snapshot.accounts {
            state.accounts.insert(account.id, account.enabled);
        }
        for group in snapshot.groups {
            state
                .groups
                .entry(group.id)
                .or_default()
                .extend(group.members);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn upsert_account(&self, user_id: &str, enabled: bool) {
        self.write().accounts.insert(user_id.to_string(), enabled);
    }

    pub fn remove_account(&self, user_id: &str) {
        let mut state = self.write();
        state.accounts.remove(user_id);
        for members in state.groups.values_mut() {
            members.remove(user_id);
        }
    }

    pub fn create_group(&self, group_id: &str) {
        self.write().groups.entry(group_id.to_string()).or_default();
    }

    pub fn delete_group(&self, group_id: &str) {
        self.write().groups.remove(group_id);
    }

    /// Current members of a group; empty when the group does not exist.
    pub fn members(&self, group_id: &str) -> BTreeSet<String> {
        self.read().groups.get(group_id).cloned().unwrap_or_default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DirectoryGateway for InMemoryDirectory {
    async fn group_exists(&self, group_id: &str) -> GatewayResult<bool> {
        Ok(self.read().groups.contains_key(group_id))
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> GatewayResult<bool> {
        let mut state = self.write();
        if !state.accounts.contains_key(user_id) {
            return Err(GatewayError::Rejected(format!("account {user_id} not found")));
        }
        match state.groups.get_mut(group_id) {
            Some(members) => {
                members.insert(user_id.to_string());
                Ok(true)
            }
            None => Err(GatewayError::Rejected(format!("group {group_id} not found"))),
        }
    }

    async fn remove_user_from_group(&self, user_id: &str, group_id: &str) -> GatewayResult<bool> {
        match self.write().groups.get_mut(group_id) {
            Some(members) => {
                members.remove(user_id);
                Ok(true)
            }
            None => Err(GatewayError::Rejected(format!("group {group_id} not found"))),
        }
    }

    async fn get_group_members(&self, group_id: &str) -> GatewayResult<Vec<String>> {
        self.read()
            .groups
            .get(group_id)
            .map(|members| members.iter().cloned().collect())
            .ok_or_else(|| GatewayError::Rejected(format!("group {group_id} not found")))
    }

    async fn user_exists(&self, user_id: &str) -> GatewayResult<bool> {
        Ok(self.read().accounts.contains_key(user_id))
    }

    async fn get_account_enabled(&self, user_id: &str) -> GatewayResult<bool> {
        self.read()
            .accounts
            .get(user_id)
            .copied()
            .ok_or_else(|| GatewayError::Rejected(format!("account {user_id} not found")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretEntry {
    pub name: String,
    /// Organization tag on the secret. Untagged secrets match any
    /// organization.
    #[serde(default)]
    pub organization_id: Option<Uuid>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretSnapshot {
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

impl SecretSnapshot {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, SecretEntry>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SecretSnapshot) -> Self {
        let store = Self::new();
        for entry in snapshot.secrets {
            store.put(entry);
        }
        store
    }

    pub fn put(&self, entry: SecretEntry) {
        self.secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.name.clone(), entry);
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) {
        if let Some(entry) = self
            .secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(name)
        {
            entry.enabled = enabled;
        }
    }

    pub fn remove(&self, name: &str) {
        self.secrets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl SecretStoreGateway for InMemorySecretStore {
    async fn secret_exists(&self, name: &str, organization_id: Uuid) -> GatewayResult<bool> {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        Ok(secrets
            .get(name)
            .is_some_and(|s| s.organization_id.is_none_or(|org| org == organization_id)))
    }

    async fn get_secret_enabled(&self, name: &str) -> GatewayResult<bool> {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        secrets
            .get(name)
            .map(|s| s.enabled)
            .ok_or_else(|| GatewayError::Rejected(format!("secret {name} not found")))
    }
}
