//! Notification channels for UI listeners.

use orgsync_core::gateway::{EventEnvelope, GatewayError, GatewayResult, NotificationChannel};
use tokio::sync::broadcast;
use tracing::info;

/// Writes every event to the log. Used when no push transport is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingChannel;

impl NotificationChannel for TracingChannel {
    async fn publish(&self, group_key: &str, envelope: EventEnvelope) -> GatewayResult<()> {
        info!(
            target: "orgsync::events",
            group = group_key,
            event_type = %envelope.event_type,
            organization_id = %envelope.organization_id,
            payload = %envelope.payload,
            "Event published"
        );
        Ok(())
    }
}

/// A published event together with its subscriber group.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    pub group_key: String,
    pub envelope: EventEnvelope,
}

/// In-process fan-out over a tokio broadcast channel. Subscribers filter by
/// group key.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    sender: broadcast::Sender<GroupEvent>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GroupEvent> {
        self.sender.subscribe()
    }
}

impl NotificationChannel for BroadcastChannel {
    async fn publish(&self, group_key: &str, envelope: EventEnvelope) -> GatewayResult<()> {
        self.sender
            .send(GroupEvent {
                group_key: group_key.to_string(),
                envelope,
            })
            .map(|_| ())
            .map_err(|_| GatewayError::Unavailable("no active listeners".into()))
    }
}
