//! Shared key-value store access
//!
//! The task registry, the per-task locks and the command/notification
//! channels all live in one Redis instance. This module owns the
//! connection plumbing; `tasks`, `lock` and `pubsub` build on it.

pub mod lock;
pub mod pubsub;
pub mod tasks;

use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tracing::info;

pub use lock::{LockAttempt, LockToken, TaskLock};
pub use pubsub::{
    Notification, NotificationEvent, NotificationPublisher, CHANNEL_NOTIFICATIONS,
    CHANNEL_TASK_COMMANDS,
};
pub use tasks::TaskStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Connection handle to the shared store.
///
/// The multiplexed connection is cheap to clone; every store facade holds
/// its own clone, while pub/sub subscribers open dedicated connections
/// from the underlying client.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    con: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to shared store: {}", redis_url);
        let client = redis::Client::open(redis_url)?;
        let con = client.get_multiplexed_tokio_connection().await?;
        Ok(Self { client, con })
    }

    pub fn connection(&self) -> MultiplexedConnection {
        self.con.clone()
    }

    /// The underlying client, for dedicated pub/sub connections.
    pub fn client(&self) -> &redis::Client {
        &self.client
    }

    /// Round-trip health probe.
    pub async fn ping(&self) -> Result<()> {
        let mut con = self.connection();
        redis::cmd("PING").query_async::<_, String>(&mut con).await?;
        Ok(())
    }
}
