//! Activity ingestion
//!
//! Pulls the target's recent activity inside a mode-dependent window and
//! persists each event exactly once per task. A BUY whose market this
//! task has already recorded a BUY for is inserted pre-closed so it never
//! executes: the target may be re-entering, and the reconciler would
//! otherwise see BUYs it cannot match. SELLs are never deduplicated this
//! way; every one must fire to track a progressive exit.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use super::Result;
use crate::domain::{ExecState, Task, TradeSide, DUPLICATE_SENTINEL};
use crate::infrastructure::client::DataApiClient;
use crate::infrastructure::database::CopyDatabase;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    /// Events the source returned.
    pub fetched: usize,
    /// Fresh rows persisted as eligible work.
    pub inserted: usize,
    /// Duplicate BUYs persisted pre-closed.
    pub preclosed: usize,
}

#[derive(Clone)]
pub struct ActivityIngestor {
    db: Arc<CopyDatabase>,
    data: Arc<DataApiClient>,
}

impl ActivityIngestor {
    pub fn new(db: Arc<CopyDatabase>, data: Arc<DataApiClient>) -> Self {
        Self { db, data }
    }

    /// Ingest one window of target activity for a task.
    ///
    /// Events are processed in source order; every insert is an
    /// independent atomic write, so a failure partway through leaves the
    /// earlier rows intact and the next tick resumes from the same
    /// window.
    pub async fn ingest(&self, task: &Task, window_sec: i64) -> Result<IngestReport> {
        let cutoff = Utc::now().timestamp() - window_sec;
        let events = self
            .data
            .activities(&task.target_address, cutoff)
            .await?;

        let mut report = IngestReport {
            fetched: events.len(),
            ..Default::default()
        };

        for event in &events {
            if event.timestamp < cutoff {
                debug!(tx_hash = %event.transaction_hash, "Dropping stale activity");
                continue;
            }

            if self
                .db
                .has_activity(&task.id, &event.transaction_hash)
                .await?
            {
                continue;
            }

            let duplicate_buy = event.side == TradeSide::Buy
                && self
                    .db
                    .has_buy_for_condition(&task.id, &event.condition_id)
                    .await?;

            let inserted = if duplicate_buy {
                self.db
                    .insert_activity(&task.id, event, ExecState::Skipped, DUPLICATE_SENTINEL)
                    .await?
            } else {
                self.db
                    .insert_activity(&task.id, event, ExecState::New, 0)
                    .await?
            };

            if inserted {
                if duplicate_buy {
                    report.preclosed += 1;
                    debug!(
                        tx_hash = %event.transaction_hash,
                        condition_id = %event.condition_id,
                        "Duplicate BUY pre-closed"
                    );
                } else {
                    report.inserted += 1;
                }
            }
        }

        if report.inserted > 0 || report.preclosed > 0 {
            info!(
                task_id = %task.id,
                fetched = report.fetched,
                inserted = report.inserted,
                preclosed = report.preclosed,
                "Ingested target activity"
            );
        }
        Ok(report)
    }
}
