//! Command and notification channels
//!
//! Inbound task commands arrive as JSON on `tasks:incoming`; lifecycle
//! events go out on `notifications`. The command payloads themselves are
//! parsed by the command service; this module only moves bytes.

use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::Result;

pub const CHANNEL_TASK_COMMANDS: &str = "tasks:incoming";
pub const CHANNEL_NOTIFICATIONS: &str = "notifications";

/// Lifecycle event emitted on the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    TaskCreated,
    TaskStopped,
    TaskRemoved,
    TaskRestarted,
    TaskError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event: NotificationEvent,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notification {
    pub fn new(event: NotificationEvent, task_id: Option<String>) -> Self {
        Self {
            event,
            task_id,
            detail: None,
        }
    }

    pub fn error(task_id: Option<String>, detail: impl Into<String>) -> Self {
        Self {
            event: NotificationEvent::TaskError,
            task_id,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Clone)]
pub struct NotificationPublisher {
    con: MultiplexedConnection,
}

impl NotificationPublisher {
    pub fn new(store: &super::RedisStore) -> Self {
        Self {
            con: store.connection(),
        }
    }

    /// Best-effort publish; a dead channel never fails the caller.
    pub async fn publish(&self, notification: &Notification) {
        let payload = match serde_json::to_string(notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode notification: {}", e);
                return;
            }
        };

        let mut con = self.con.clone();
        if let Err(e) = con
            .publish::<_, _, ()>(CHANNEL_NOTIFICATIONS, payload)
            .await
        {
            warn!("Failed to publish notification: {}", e);
        }
    }
}

/// Subscribe to `tasks:incoming` and forward raw payloads to `tx`.
///
/// Returns the listener handle; it runs until the channel closes or the
/// receiver is dropped.
pub async fn spawn_command_listener(
    client: redis::Client,
    tx: mpsc::Sender<String>,
) -> Result<JoinHandle<()>> {
    let mut pubsub = client.get_async_connection().await?.into_pubsub();
    pubsub.subscribe(CHANNEL_TASK_COMMANDS).await?;
    info!("Listening for task commands on '{}'", CHANNEL_TASK_COMMANDS);

    let handle = tokio::spawn(async move {
        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Undecodable command payload: {}", e);
                    continue;
                }
            };
            if tx.send(payload).await.is_err() {
                break;
            }
        }
        info!("Command listener stopped");
    });

    Ok(handle)
}

/// Publish a raw command payload to `tasks:incoming` (used by the control
/// CLI).
pub async fn publish_command(store: &super::RedisStore, payload: &str) -> Result<()> {
    let mut con = store.connection();
    con.publish::<_, _, ()>(CHANNEL_TASK_COMMANDS, payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_shape() {
        let n = Notification::new(NotificationEvent::TaskCreated, Some("t1".to_string()));
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains(r#""event":"task_created""#));
        assert!(json.contains(r#""taskId":"t1""#));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_error_notification_carries_detail() {
        let n = Notification::error(None, "bad payload");
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains(r#""event":"task_error""#));
        assert!(json.contains(r#""detail":"bad payload""#));
    }
}
