//! Application Layer
//!
//! Orchestration of the copy-trading engine: the per-task tick, the
//! scheduler and worker pool, activity ingestion, trade handlers, the
//! position reconciler and the external command service.

pub mod commands;
pub mod engine;
pub mod handlers;
pub mod ingestor;
pub mod ledger;
pub mod reconciler;
pub mod scheduler;

use thiserror::Error;

use crate::infrastructure::client::ApiError;
use crate::infrastructure::client::settlement::SettlementError;
use crate::infrastructure::database::DatabaseError;
use crate::infrastructure::store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

pub use commands::{CommandService, TaskCommand};
pub use engine::{CopyEngine, TickOutcome, TickReport};
pub use handlers::{HandlerOutcome, SkipReason};
pub use ingestor::{ActivityIngestor, IngestReport};
pub use ledger::PositionLedger;
pub use reconciler::ReconcileReport;
pub use scheduler::Scheduler;
