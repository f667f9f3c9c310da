//! Orphaned-resource findings.
//!
//! Findings are ephemeral: they are produced by a scan, cached for a while,
//! and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResourceType {
    User,
    DatabaseCredential,
    CapabilityGroup,
    Organization,
    Assignment,
}

/// A database record whose counterpart no longer validly exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanedResource {
    pub resource_id: String,
    pub name: String,
    pub resource_type: ResourceType,
    pub reason: String,
    pub organization_id: Option<Uuid>,
    pub last_modified: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
}

/// An item whose external check could not be completed. It is neither an
/// orphan nor confirmed healthy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnverifiedResource {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanScanResult {
    pub resource_type: ResourceType,
    pub organization_id: Option<Uuid>,
    pub total_scanned: u64,
    pub orphans: Vec<OrphanedResource>,
    pub unverified: Vec<UnverifiedResource>,
    pub scanned_at: DateTime<Utc>,
}

impl OrphanScanResult {
    pub fn new(resource_type: ResourceType, organization_id: Option<Uuid>) -> Self {
        Self {
            resource_type,
            organization_id,
            total_scanned: 0,
            orphans: Vec::new(),
            unverified: Vec::new(),
            scanned_at: Utc::now(),
        }
    }

    pub fn orphans_found(&self) -> u64 {
        self.orphans.len() as u64
    }
}

/// All four scans for one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphanReport {
    pub organization_id: Uuid,
    pub users: OrphanScanResult,
    pub credentials: OrphanScanResult,
    pub capability_groups: OrphanScanResult,
    pub organizations: OrphanScanResult,
    pub generated_at: DateTime<Utc>,
}

impl OrphanReport {
    fn scans(&self) -> [&OrphanScanResult; 4] {
        [
            &self.users,
            &self.credentials,
            &self.capability_groups,
            &self.organizations,
        ]
    }

    pub fn total_scanned(&self) -> u64 {
        self.scans().iter().map(|s| s.total_scanned).sum()
    }

    pub fn total_orphans(&self) -> u64 {
        self.scans().iter().map(|s| s.orphans_found()).sum()
    }

    pub fn total_unverified(&self) -> u64 {
        self.scans().iter().map(|s| s.unverified.len() as u64).sum()
    }

    pub fn has_critical_orphans(&self) -> bool {
        self.total_orphans() > 0
    }

    pub fn orphans(&self) -> impl Iterator<Item = &OrphanedResource> {
        self.scans().into_iter().flat_map(|s| s.orphans.iter())
    }
}
