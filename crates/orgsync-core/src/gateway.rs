//! Contracts for the external systems the engine reconciles against.
//!
//! The identity directory, the secret store and the notification transport
//! are owned by other services. Every call is fallible; a `false` answer
//! and an error are different things and must not be conflated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::OrgSyncError;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    /// Attach the calling context and lift into the crate-wide error.
    pub fn into_external(self, service: &str, operation: &str) -> OrgSyncError {
        OrgSyncError::ExternalCall {
            service: service.into(),
            operation: operation.into(),
            reason: self.to_string(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Identity directory: accounts, security groups and memberships.
///
/// User ids here are directory object ids, not database ids.
pub trait DirectoryGateway: Send + Sync + 'static {
    fn group_exists(&self, group_id: &str) -> impl Future<Output = GatewayResult<bool>> + Send;
    /// Adding an existing member is a successful no-op.
    fn add_user_to_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> impl Future<Output = GatewayResult<bool>> + Send;
    /// Removing a non-member is a successful no-op.
    fn remove_user_from_group(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> impl Future<Output = GatewayResult<bool>> + Send;
    fn get_group_members(
        &self,
        group_id: &str,
    ) -> impl Future<Output = GatewayResult<Vec<String>>> + Send;
    fn user_exists(&self, user_id: &str) -> impl Future<Output = GatewayResult<bool>> + Send;
    fn get_account_enabled(
        &self,
        user_id: &str,
    ) -> impl Future<Output = GatewayResult<bool>> + Send;
}

pub trait SecretStoreGateway: Send + Sync + 'static {
    fn secret_exists(
        &self,
        name: &str,
        organization_id: Uuid,
    ) -> impl Future<Output = GatewayResult<bool>> + Send;
    fn get_secret_enabled(&self, name: &str) -> impl Future<Output = GatewayResult<bool>> + Send;
}

/// Envelope pushed to UI listeners of one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub organization_id: Uuid,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event_type: impl Into<String>, organization_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            organization_id,
            payload,
            published_at: Utc::now(),
        }
    }
}

/// Subscriber group key for an organization's listeners.
pub fn organization_group_key(organization_id: Uuid) -> String {
    format!("org-{organization_id}")
}

/// Real-time push to UI listeners. Best effort.
pub trait NotificationChannel: Send + Sync + 'static {
    fn publish(
        &self,
        group_key: &str,
        envelope: EventEnvelope,
    ) -> impl Future<Output = GatewayResult<()>> + Send;
}
