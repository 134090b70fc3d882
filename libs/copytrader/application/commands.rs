//! External command surface
//!
//! Consumes `{action: add|stop|remove|restart, ...}` JSON from the
//! command channel (or a CLI) and drives task lifecycle transitions.
//! Invalid commands are rejected before any state changes, with a
//! `task_error` notification; successful transitions emit their
//! lifecycle event.

use chrono::Utc;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use super::engine::CopyEngine;
use super::scheduler::Scheduler;
use super::{EngineError, Result};
use crate::domain::{Task, TaskDraft, TaskMode, TaskStatus};
use crate::infrastructure::client::key_controls_wallet;
use crate::infrastructure::store::{
    pubsub, Notification, NotificationEvent, NotificationPublisher, RedisStore,
};

/// Live tasks must fund at least this many fixed-amount BUYs at creation.
const LIVE_BALANCE_MULTIPLE: f64 = 3.0;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TaskCommand {
    Add {
        #[serde(flatten)]
        draft: TaskDraft,
    },
    Stop {
        id: String,
    },
    Remove {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        all: bool,
    },
    Restart {
        id: String,
    },
}

pub struct CommandService {
    engine: Arc<CopyEngine>,
    scheduler: Arc<Scheduler>,
    notifier: NotificationPublisher,
}

impl CommandService {
    pub fn new(
        engine: Arc<CopyEngine>,
        scheduler: Arc<Scheduler>,
        notifier: NotificationPublisher,
    ) -> Self {
        Self {
            engine,
            scheduler,
            notifier,
        }
    }

    /// Execute one command, emitting the matching notification. Errors
    /// are also reported on the notification channel.
    pub async fn execute(&self, command: TaskCommand) -> Result<()> {
        let result = match command {
            TaskCommand::Add { draft } => self.add_task(draft).await.map(|_| ()),
            TaskCommand::Stop { id } => self.stop_task(&id).await,
            TaskCommand::Remove { id, all } => self.remove_task(id.as_deref(), all).await,
            TaskCommand::Restart { id } => self.restart_task(&id).await,
        };

        if let Err(e) = &result {
            self.notifier
                .publish(&Notification::error(None, e.to_string()))
                .await;
        }
        result
    }

    /// Register a new task and schedule its ticks.
    pub async fn add_task(&self, draft: TaskDraft) -> Result<Task> {
        if draft.fixed_amount <= 0.0 {
            return Err(EngineError::InvalidCommand(
                "fixedAmount must be positive".to_string(),
            ));
        }
        if draft.target_address.trim().is_empty() {
            return Err(EngineError::InvalidCommand(
                "targetAddress is required".to_string(),
            ));
        }
        if draft.initial_finance < 0.0 {
            return Err(EngineError::InvalidCommand(
                "initialFinance cannot be negative".to_string(),
            ));
        }

        let initial_finance = match &draft.mode {
            TaskMode::Mock => draft.initial_finance,
            TaskMode::Live {
                operator_wallet,
                private_key,
            } => {
                let controls = key_controls_wallet(private_key, operator_wallet)
                    .map_err(|e| EngineError::InvalidCommand(e.to_string()))?;
                if !controls {
                    return Err(EngineError::InvalidCommand(
                        "privateKey does not control operatorWallet".to_string(),
                    ));
                }

                let balance = self
                    .engine
                    .settlement()
                    .quote_balance(operator_wallet)
                    .await?;
                if balance < LIVE_BALANCE_MULTIPLE * draft.fixed_amount {
                    return Err(EngineError::InvalidCommand(format!(
                        "balance {:.2} below required {:.2}",
                        balance,
                        LIVE_BALANCE_MULTIPLE * draft.fixed_amount
                    )));
                }
                balance
            }
        };

        let task = Task {
            id: Uuid::new_v4().to_string(),
            mode: draft.mode,
            target_address: draft.target_address,
            profile_url: draft.profile_url,
            fixed_amount: draft.fixed_amount,
            initial_finance,
            current_balance: initial_finance,
            status: TaskStatus::Running,
            created_at: Utc::now(),
        };

        self.engine.task_store().put(&task).await?;
        self.scheduler.schedule(&task.id);

        info!(task_id = %task.id, mode = task.mode.as_str(), "Task created");
        self.notifier
            .publish(&Notification::new(
                NotificationEvent::TaskCreated,
                Some(task.id.clone()),
            ))
            .await;

        Ok(task)
    }

    /// Stop a task's ticks, keeping its state.
    pub async fn stop_task(&self, id: &str) -> Result<()> {
        let mut task = self.engine.task_store().get_required(id).await?;
        task.status = TaskStatus::Stopped;
        self.engine.task_store().put(&task).await?;
        self.scheduler.unschedule(id);

        info!(task_id = id, "Task stopped");
        self.notifier
            .publish(&Notification::new(
                NotificationEvent::TaskStopped,
                Some(id.to_string()),
            ))
            .await;
        Ok(())
    }

    /// Remove one task (or all), deleting its activities, positions and
    /// trade records.
    pub async fn remove_task(&self, id: Option<&str>, all: bool) -> Result<()> {
        if all {
            let ids = self.engine.task_store().remove_all().await?;
            for id in &ids {
                self.scheduler.unschedule(id);
                self.engine.database().purge_task(id).await?;
                self.notifier
                    .publish(&Notification::new(
                        NotificationEvent::TaskRemoved,
                        Some(id.clone()),
                    ))
                    .await;
            }
            info!("Removed {} task(s)", ids.len());
            return Ok(());
        }

        let Some(id) = id else {
            return Err(EngineError::InvalidCommand(
                "remove requires an id or all=true".to_string(),
            ));
        };

        self.scheduler.unschedule(id);
        if !self.engine.task_store().remove(id).await? {
            return Err(EngineError::InvalidCommand(format!("unknown task '{}'", id)));
        }
        self.engine.database().purge_task(id).await?;

        info!(task_id = id, "Task removed");
        self.notifier
            .publish(&Notification::new(
                NotificationEvent::TaskRemoved,
                Some(id.to_string()),
            ))
            .await;
        Ok(())
    }

    /// Bring a stopped task back to running and schedule it.
    pub async fn restart_task(&self, id: &str) -> Result<()> {
        let mut task = self.engine.task_store().get_required(id).await?;
        task.status = TaskStatus::Running;
        self.engine.task_store().put(&task).await?;
        self.scheduler.schedule(id);

        info!(task_id = id, "Task restarted");
        self.notifier
            .publish(&Notification::new(
                NotificationEvent::TaskRestarted,
                Some(id.to_string()),
            ))
            .await;
        Ok(())
    }

    /// Subscribe to the command channel and execute until shutdown.
    pub async fn run_listener(
        self: &Arc<Self>,
        store: &RedisStore,
        shutdown: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        let (tx, mut rx) = mpsc::channel::<String>(32);
        let listener = pubsub::spawn_command_listener(store.client().clone(), tx).await?;

        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while shutdown.load(Ordering::Acquire) {
                let Some(payload) = rx.recv().await else {
                    break;
                };
                service.handle_payload(&payload).await;
            }
            listener.abort();
        });
        Ok(handle)
    }

    async fn handle_payload(&self, payload: &str) {
        match serde_json::from_str::<TaskCommand>(payload) {
            Ok(command) => {
                if let Err(e) = self.execute(command).await {
                    warn!("Command failed: {}", e);
                }
            }
            Err(e) => {
                warn!("Undecodable command: {}", e);
                self.notifier
                    .publish(&Notification::error(None, format!("bad command: {}", e)))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_command_parses() {
        let json = r#"{
            "action": "add",
            "mode": "mock",
            "targetAddress": "0xabc",
            "fixedAmount": 100.0,
            "initialFinance": 1000.0
        }"#;
        let command: TaskCommand = serde_json::from_str(json).unwrap();
        match command {
            TaskCommand::Add { draft } => {
                assert_eq!(draft.fixed_amount, 100.0);
                assert!(!draft.mode.is_live());
            }
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_live_add_command_parses() {
        let json = r#"{
            "action": "add",
            "mode": "live",
            "operatorWallet": "0xoperator",
            "privateKey": "0xkey",
            "targetAddress": "0xabc",
            "fixedAmount": 25.0
        }"#;
        let command: TaskCommand = serde_json::from_str(json).unwrap();
        match command {
            TaskCommand::Add { draft } => assert!(draft.mode.is_live()),
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_remove_restart_parse() {
        let stop: TaskCommand = serde_json::from_str(r#"{"action":"stop","id":"t1"}"#).unwrap();
        assert!(matches!(stop, TaskCommand::Stop { .. }));

        let remove: TaskCommand =
            serde_json::from_str(r#"{"action":"remove","all":true}"#).unwrap();
        assert!(matches!(remove, TaskCommand::Remove { all: true, .. }));

        let restart: TaskCommand =
            serde_json::from_str(r#"{"action":"restart","id":"t2"}"#).unwrap();
        assert!(matches!(restart, TaskCommand::Restart { .. }));
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(serde_json::from_str::<TaskCommand>(r#"{"action":"pause","id":"t1"}"#).is_err());
    }
}
