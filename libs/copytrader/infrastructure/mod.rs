//! Infrastructure Layer
//!
//! Implementations of the external interfaces: configuration, logging,
//! the shared key-value store (task registry, locks, pub/sub), the
//! document database and the venue/on-chain clients. Depends on the
//! domain layer only.

pub mod client;
pub mod config;
pub mod database;
pub mod heartbeat;
pub mod logging;
pub mod shutdown;
pub mod store;

pub use client::{
    key_controls_wallet, ApiError, ClobClient, DataApiClient, OrderArgs, OrderPlacementResponse,
    OrderSide, OrderType, PayoutStatus, RedemptionOutcome, SettlementClient, SettlementError,
};
pub use config::{ConfigError, EngineConfig};
pub use database::{CopyDatabase, DatabaseError};
pub use heartbeat::Heartbeat;
pub use logging::{init_tracing, init_tracing_with_level};
pub use shutdown::ShutdownManager;
pub use store::{
    LockAttempt, LockToken, Notification, NotificationEvent, NotificationPublisher, RedisStore,
    StoreError, TaskLock, TaskStore, CHANNEL_NOTIFICATIONS, CHANNEL_TASK_COMMANDS,
};
