//! Task registry (shared key-value store)
//!
//! Tasks live in a single Redis hash keyed by task id, with JSON values.
//! Writes are atomic per task; the engine loop only ever writes a task
//! while holding that task's lock, so last-writer-wins is sufficient.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use super::{Result, StoreError};
use crate::domain::{Task, TaskStatus};

const TASKS_KEY: &str = "tasks";

#[derive(Clone)]
pub struct TaskStore {
    con: MultiplexedConnection,
}

impl TaskStore {
    pub fn new(store: &super::RedisStore) -> Self {
        Self {
            con: store.connection(),
        }
    }

    /// Persist a task (insert or replace).
    pub async fn put(&self, task: &Task) -> Result<()> {
        let payload = serde_json::to_string(task)?;
        let mut con = self.con.clone();
        con.hset::<_, _, _, ()>(TASKS_KEY, &task.id, payload).await?;
        debug!(task_id = %task.id, "Task persisted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Task>> {
        let mut con = self.con.clone();
        let raw: Option<String> = con.hget(TASKS_KEY, id).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Like [`get`], but missing tasks are an error.
    pub async fn get_required(&self, id: &str) -> Result<Task> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))
    }

    /// All tasks, optionally filtered by mode ("mock" / "live").
    pub async fn list(&self, mode_filter: Option<&str>) -> Result<Vec<Task>> {
        let mut con = self.con.clone();
        let raw: Vec<String> = con.hvals(TASKS_KEY).await?;
        let mut tasks = Vec::with_capacity(raw.len());
        for json in raw {
            let task: Task = serde_json::from_str(&json)?;
            if let Some(mode) = mode_filter {
                if task.mode.as_str() != mode {
                    continue;
                }
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// All tasks currently in `status=running`.
    pub async fn list_running(&self) -> Result<Vec<Task>> {
        Ok(self
            .list(None)
            .await?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Running)
            .collect())
    }

    /// Delete one task. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut con = self.con.clone();
        let removed: i64 = con.hdel(TASKS_KEY, id).await?;
        Ok(removed > 0)
    }

    /// Delete every task, returning the removed ids so the caller can
    /// purge the per-task document stores.
    pub async fn remove_all(&self) -> Result<Vec<String>> {
        let mut con = self.con.clone();
        let ids: Vec<String> = con.hkeys(TASKS_KEY).await?;
        if !ids.is_empty() {
            con.del::<_, ()>(TASKS_KEY).await?;
        }
        Ok(ids)
    }
}
