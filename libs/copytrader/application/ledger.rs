//! Position ledger
//!
//! Mock tasks own their positions as database rows; Live tasks read a
//! snapshot from the venue's position endpoint, keyed identically. Live
//! snapshots are eventually consistent (a fresh fill may take seconds to
//! appear), which the Live BUY handler compensates for with its
//! recent-buy check.

use std::sync::Arc;

use super::Result;
use crate::domain::{Position, Task, TaskMode};
use crate::infrastructure::client::DataApiClient;
use crate::infrastructure::database::CopyDatabase;

#[derive(Clone)]
pub struct PositionLedger {
    db: Arc<CopyDatabase>,
    data: Arc<DataApiClient>,
}

impl PositionLedger {
    pub fn new(db: Arc<CopyDatabase>, data: Arc<DataApiClient>) -> Self {
        Self { db, data }
    }

    /// Every position the task currently holds.
    pub async fn find(&self, task: &Task) -> Result<Vec<Position>> {
        match &task.mode {
            TaskMode::Mock => Ok(self.db.find_positions(&task.id).await?),
            TaskMode::Live {
                operator_wallet, ..
            } => {
                let venue = self.data.positions(operator_wallet).await?;
                Ok(venue
                    .into_iter()
                    .map(|p| p.into_position(&task.id))
                    .collect())
            }
        }
    }

    /// The task's position in one market, if any.
    pub async fn find_one(&self, task: &Task, condition_id: &str) -> Result<Option<Position>> {
        match &task.mode {
            TaskMode::Mock => Ok(self
                .db
                .find_position_by_condition(&task.id, condition_id)
                .await?),
            TaskMode::Live { .. } => Ok(self
                .find(task)
                .await?
                .into_iter()
                .find(|p| p.condition_id == condition_id)),
        }
    }

    /// Persist a Mock position. Live positions are venue-owned and never
    /// written here.
    pub async fn upsert(&self, position: &Position) -> Result<()> {
        self.db.upsert_position(position).await?;
        Ok(())
    }

    /// Drop a Mock position (zero-size positions are deleted, not kept).
    pub async fn delete(&self, task_id: &str, asset: &str, condition_id: &str) -> Result<()> {
        self.db.delete_position(task_id, asset, condition_id).await?;
        Ok(())
    }
}
