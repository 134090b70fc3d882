//! Copy-trading engine for prediction markets
//!
//! Mirrors a target account's BUY/SELL/REDEEM activity into a simulated
//! (Mock) or on-chain (Live) account, under fixed-amount sizing, slippage
//! limits and balance constraints.

// Core layers (Clean Architecture)
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used items from the domain layer
pub use domain::{
    simulate_buy, simulate_sell, ActivityEvent, BookLevel, ExecState, Fill, FillRejection,
    OrderBook, Position, StoredActivity, Task, TaskDraft, TaskMode, TaskStatus, TradeRecord,
    TradeSide, VenuePosition,
};

// Re-export from the infrastructure layer
pub use infrastructure::{
    init_tracing, init_tracing_with_level, ClobClient, CopyDatabase, DataApiClient, EngineConfig,
    NotificationPublisher, RedisStore, SettlementClient, ShutdownManager, TaskLock, TaskStore,
};

// Re-export from the application layer
pub use application::{
    CommandService, CopyEngine, EngineError, Scheduler, TaskCommand, TickOutcome, TickReport,
};
