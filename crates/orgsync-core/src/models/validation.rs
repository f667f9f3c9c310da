//! State-sync validation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::ResourceType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationKind {
    UserState,
    GroupState,
    CredentialState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub severity: IssueSeverity,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub kind: ValidationKind,
    pub organization_id: Uuid,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub recommendations: Vec<String>,
    pub records_checked: u64,
    pub issues_found: u64,
    /// Records whose external check could not be completed.
    pub unverified: u64,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn new(
        kind: ValidationKind,
        organization_id: Uuid,
        records_checked: u64,
        issues: Vec<ValidationIssue>,
        unverified: u64,
        mut recommendations: Vec<String>,
    ) -> Self {
        recommendations.sort();
        recommendations.dedup();
        Self {
            kind,
            organization_id,
            is_valid: issues.is_empty(),
            issues_found: issues.len() as u64,
            issues,
            recommendations,
            records_checked,
            unverified,
            validated_at: Utc::now(),
        }
    }
}

/// The three validations for one organization folded together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveValidationResult {
    pub organization_id: Uuid,
    pub user_state: ValidationResult,
    pub group_state: ValidationResult,
    pub credential_state: ValidationResult,
    pub validated_at: DateTime<Utc>,
}

impl ComprehensiveValidationResult {
    pub fn total_issues(&self) -> u64 {
        self.user_state.issues_found + self.group_state.issues_found + self.credential_state.issues_found
    }

    pub fn overall_valid(&self) -> bool {
        self.user_state.is_valid && self.group_state.is_valid && self.credential_state.is_valid
    }
}
