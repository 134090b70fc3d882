//! Per-task execution engine
//!
//! One tick = ingest the target's fresh activity, handle every pending
//! activity in ingestion order, write back the task's cash balance, and
//! periodically reconcile positions. The whole tick runs under the
//! task's distributed lock; a contended tick is skipped and the next
//! period re-fires it.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::handlers::{self, HandlerCtx};
use super::ingestor::ActivityIngestor;
use super::ledger::PositionLedger;
use super::reconciler;
use super::{EngineError, Result};
use crate::infrastructure::client::{ClobClient, DataApiClient, SettlementClient};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::database::CopyDatabase;
use crate::infrastructure::store::{LockAttempt, LockToken, RedisStore, TaskLock, TaskStore};
use crate::domain::Task;

/// What one tick accomplished.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    /// Fresh activities ingested this tick.
    pub ingested: usize,
    /// Activities brought to a terminal state.
    pub handled: usize,
    /// Activities whose handler failed transiently (returned to `new`).
    pub failed: usize,
    /// Whether the reconciliation sweep ran.
    pub reconciled: bool,
}

#[derive(Debug)]
pub enum TickOutcome {
    Completed(TickReport),
    /// Another worker holds the task.
    SkippedLocked,
    /// The task disappeared or stopped; the caller should unschedule it.
    TaskGone,
}

pub struct CopyEngine {
    cfg: EngineConfig,
    tasks: TaskStore,
    lock: TaskLock,
    db: Arc<CopyDatabase>,
    data: Arc<DataApiClient>,
    clob: Arc<ClobClient>,
    settlement: Arc<SettlementClient>,
    ledger: PositionLedger,
    ingestor: ActivityIngestor,
    tick_counts: DashMap<String, u64>,
}

impl CopyEngine {
    pub fn new(
        cfg: EngineConfig,
        store: &RedisStore,
        db: Arc<CopyDatabase>,
        data: Arc<DataApiClient>,
        clob: Arc<ClobClient>,
        settlement: Arc<SettlementClient>,
    ) -> Self {
        let tasks = TaskStore::new(store);
        let lock = TaskLock::new(store, cfg.lock_ttl_ms);
        let ledger = PositionLedger::new(Arc::clone(&db), Arc::clone(&data));
        let ingestor = ActivityIngestor::new(Arc::clone(&db), Arc::clone(&data));

        Self {
            cfg,
            tasks,
            lock,
            db,
            data,
            clob,
            settlement,
            ledger,
            ingestor,
            tick_counts: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn task_store(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn database(&self) -> &Arc<CopyDatabase> {
        &self.db
    }

    pub fn settlement(&self) -> &Arc<SettlementClient> {
        &self.settlement
    }

    fn handler_ctx(&self) -> HandlerCtx<'_> {
        HandlerCtx {
            cfg: &self.cfg,
            db: &self.db,
            ledger: &self.ledger,
            clob: &self.clob,
            settlement: &self.settlement,
            tasks: &self.tasks,
        }
    }

    /// Execute one tick for a task, single-flight under its lock.
    pub async fn run_tick(&self, task_id: &str) -> Result<TickOutcome> {
        let Some(token) = self.lock.acquire(task_id).await? else {
            debug!(task_id, "Tick skipped: task is locked");
            return Ok(TickOutcome::SkippedLocked);
        };

        let result = self.tick_locked(task_id, &token).await;

        if let Err(e) = self.lock.release(task_id, &token).await {
            warn!(task_id, "Lock release failed: {}", e);
        }
        result
    }

    async fn tick_locked(&self, task_id: &str, token: &LockToken) -> Result<TickOutcome> {
        let Some(mut task) = self.tasks.get(task_id).await? else {
            return Ok(TickOutcome::TaskGone);
        };
        if !task.is_running() {
            return Ok(TickOutcome::TaskGone);
        }

        let window = self.cfg.activity_window_sec(task.is_live());
        let ingest = self.ingestor.ingest(&task, window).await?;

        let pending = self.db.pending_activities(task_id).await?;
        let mut report = TickReport {
            ingested: ingest.inserted,
            ..Default::default()
        };

        if !pending.is_empty() {
            // One fresh target snapshot serves every handler this tick.
            let target_positions = self.data.positions(&task.target_address).await?;
            let ctx = self.handler_ctx();

            for activity in &pending {
                let own_position = self
                    .ledger
                    .find_one(&task, &activity.condition_id)
                    .await?;
                let target_position = target_positions
                    .iter()
                    .find(|p| p.asset == activity.asset);

                match handlers::dispatch(&ctx, &mut task, activity, own_position, target_position)
                    .await
                {
                    Ok(Some(_)) => report.handled += 1,
                    Ok(None) => {}
                    Err(e) => {
                        // One activity's failure never aborts the tick;
                        // hand it back for the next period.
                        warn!(
                            task_id,
                            tx_hash = %activity.tx_hash,
                            "Handler failed: {}",
                            e
                        );
                        if let Err(e) = self.db.unclaim_activity(activity.id).await {
                            warn!(task_id, "Failed to unclaim activity: {}", e);
                        }
                        report.failed += 1;
                    }
                }
            }
        }

        let tick_number = {
            let mut entry = self.tick_counts.entry(task_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if tick_number % self.cfg.sync_every_n_ticks == 0 {
            // A tick that outlived its TTL has lost ownership; mutating
            // further would race the next holder.
            if !self.lock.is_held(task_id, token).await? {
                warn!(task_id, "Lock lost mid-tick; skipping reconciliation");
                return Ok(TickOutcome::Completed(report));
            }

            let ctx = self.handler_ctx();
            match reconciler::reconcile(&ctx, &self.data, &mut task).await {
                Ok(_) => report.reconciled = true,
                Err(e) => warn!(task_id, "Reconciliation failed: {}", e),
            }
        }

        Ok(TickOutcome::Completed(report))
    }

    /// Startup recovery: activities stranded in `claimed` by a previous
    /// crash go back to `new`. Returns the running tasks so the caller
    /// can reschedule them.
    pub async fn recover(&self) -> Result<Vec<Task>> {
        let running = self.tasks.list_running().await?;
        let ids: Vec<String> = running.iter().map(|t| t.id.clone()).collect();
        self.db.reset_claimed(&ids).await?;
        Ok(running)
    }

    /// One immediate reconciliation sweep for a task, under its lock.
    /// Runs at startup for every running task.
    pub async fn reconcile_task(&self, task_id: &str) -> Result<()> {
        let attempt = self
            .lock
            .with_lock(task_id, async {
                let Some(mut task) = self.tasks.get(task_id).await? else {
                    return Ok(());
                };
                let ctx = self.handler_ctx();
                reconciler::reconcile(&ctx, &self.data, &mut task).await?;
                Ok::<(), EngineError>(())
            })
            .await?;

        match attempt {
            LockAttempt::Ran(result) => result,
            LockAttempt::Contended => Ok(()),
        }
    }
}
