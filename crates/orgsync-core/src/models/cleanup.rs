//! Cleanup recommendations and repair summaries.
//!
//! Only reference repairs that restore an invariant without destroying data
//! are applied automatically; see [`requires_approval`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::ResourceType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CleanupAction {
    Deactivate,
    MarkAsOrphaned,
    Delete,
    UpdateReference,
    ManualReview,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Whether a repair must wait for a human operator.
///
/// `Delete` always requires approval. Only `Deactivate` and
/// `UpdateReference` at low or medium risk are applied automatically.
pub fn requires_approval(action: CleanupAction, risk: RiskLevel) -> bool {
    match action {
        CleanupAction::Deactivate | CleanupAction::UpdateReference => risk > RiskLevel::Medium,
        CleanupAction::Delete | CleanupAction::MarkAsOrphaned | CleanupAction::ManualReview => {
            true
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupRecommendation {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub organization_id: Option<Uuid>,
    pub action: CleanupAction,
    pub justification: String,
    pub risk: RiskLevel,
    pub requires_approval: bool,
}

impl CleanupRecommendation {
    pub fn new(
        resource_id: impl Into<String>,
        resource_type: ResourceType,
        organization_id: Option<Uuid>,
        action: CleanupAction,
        risk: RiskLevel,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type,
            organization_id,
            action,
            justification: justification.into(),
            risk,
            requires_approval: requires_approval(action, risk),
        }
    }
}

/// Outcome of a stale-reference sweep over an organization's users.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentCleanupSummary {
    pub users_scanned: u64,
    pub users_updated: u64,
    pub stale_ids_removed: u64,
    /// Users whose repaired set could not be persisted.
    pub users_failed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRepair {
    pub recommendation: CleanupRecommendation,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub organization_id: Uuid,
    pub applied: Vec<CleanupRecommendation>,
    pub pending_approval: Vec<CleanupRecommendation>,
    pub failed: Vec<FailedRepair>,
    pub credential_references: AssignmentCleanupSummary,
    pub capability_references: AssignmentCleanupSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_always_requires_approval() {
        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
            assert!(requires_approval(CleanupAction::Delete, risk));
        }
    }

    #[test]
    fn low_risk_reference_repair_is_automatic() {
        assert!(!requires_approval(CleanupAction::UpdateReference, RiskLevel::Low));
        assert!(!requires_approval(CleanupAction::Deactivate, RiskLevel::Medium));
    }

    #[test]
    fn high_risk_deactivation_requires_approval() {
        assert!(requires_approval(CleanupAction::Deactivate, RiskLevel::High));
    }

    #[test]
    fn manual_review_requires_approval() {
        assert!(requires_approval(CleanupAction::ManualReview, RiskLevel::Low));
    }
}
