//! Organization domain model.
//!
//! Organizations are the tenant root: every user, assignment and database
//! credential is exclusively owned by exactly one organization.
//!
//! The organization identifier is a pure function of its normalized domain
//! (see [`organization_id_for_domain`]). Registering the same domain twice
//! must resolve to the same record and never create a duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrganizationStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Derived from `domain`; see [`organization_id_for_domain`].
    pub id: Uuid,
    pub name: String,
    /// Normalized primary domain (e.g., `contoso.com`).
    pub domain: String,
    pub status: OrganizationStatus,
    /// Whether members may invite new external users.
    pub allow_invitations: bool,
    /// Directory security group that holds every member of the organization.
    pub directory_group_id: Option<String>,
    /// Capability types this organization has opted in to.
    pub capability_type_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn is_active(&self) -> bool {
        self.status == OrganizationStatus::Active
    }

    pub fn has_capability(&self, capability_type_id: Uuid) -> bool {
        self.capability_type_ids.contains(&capability_type_id)
    }

    /// True when the stored id still matches the domain derivation.
    pub fn has_derived_id(&self) -> bool {
        self.id == organization_id_for_domain(&self.domain)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub domain: String,
    pub allow_invitations: bool,
    pub directory_group_id: Option<String>,
    pub capability_type_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub status: Option<OrganizationStatus>,
    pub allow_invitations: Option<bool>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub directory_group_id: Option<Option<String>>,
    pub capability_type_ids: Option<Vec<Uuid>>,
}

/// Normalize a domain for identifier derivation: surrounding whitespace and
/// trailing dots are removed and ASCII letters are lowercased.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Derive the stable organization identifier for a domain.
///
/// The first 16 bytes of SHA-256 over the normalized domain are stamped as
/// a custom (version 8) UUID. The result is total and stable across calls
/// and processes; `Contoso.COM.` and `contoso.com` map to the same id.
pub fn organization_id_for_domain(domain: &str) -> Uuid {
    let digest = Sha256::digest(normalize_domain(domain).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_custom_bytes(bytes).into_uuid()
}
