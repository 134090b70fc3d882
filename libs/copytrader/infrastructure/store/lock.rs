//! Per-task distributed lock
//!
//! Single-writer mutual exclusion over a task id: a `task-lock:{id}` key
//! set with NX + PX and a unique token value. Release is a Lua
//! compare-and-delete so a holder whose TTL expired can never delete a
//! successor's lock. Contention policy is SKIP: a busy task's tick is
//! dropped and the next period re-fires it.

use futures::FutureExt;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Result;

const LOCK_PREFIX: &str = "task-lock:";

/// Delete the key only if it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Proof of acquisition; required for release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn fresh() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of a [`TaskLock::with_lock`] attempt.
#[derive(Debug)]
pub enum LockAttempt<T> {
    /// The closure ran to completion while holding the lock.
    Ran(T),
    /// Another holder owns the task; nothing ran.
    Contended,
}

impl<T> LockAttempt<T> {
    pub fn ran(&self) -> bool {
        matches!(self, LockAttempt::Ran(_))
    }
}

#[derive(Clone)]
pub struct TaskLock {
    con: MultiplexedConnection,
    ttl_ms: u64,
}

impl TaskLock {
    pub fn new(store: &super::RedisStore, ttl_ms: u64) -> Self {
        Self {
            con: store.connection(),
            ttl_ms,
        }
    }

    fn key(task_id: &str) -> String {
        format!("{}{}", LOCK_PREFIX, task_id)
    }

    /// Try to take the lock. `None` means somebody else holds it.
    pub async fn acquire(&self, task_id: &str) -> Result<Option<LockToken>> {
        let token = LockToken::fresh();
        let mut con = self.con.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(Self::key(task_id))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut con)
            .await?;

        match set {
            Some(_) => {
                debug!(task_id, "Lock acquired");
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Compare-and-delete release. Returns false when the key had already
    /// expired or was re-acquired by another holder.
    pub async fn release(&self, task_id: &str, token: &LockToken) -> Result<bool> {
        let mut con = self.con.clone();
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(Self::key(task_id))
            .arg(token.as_str())
            .invoke_async(&mut con)
            .await?;

        if deleted == 0 {
            warn!(task_id, "Lock was not ours to release (TTL expiry?)");
        }
        Ok(deleted > 0)
    }

    /// Confirm the lock is still held with the given token.
    ///
    /// Handlers call this before mutating state late in a long tick; a
    /// lost lock means the TTL elapsed and another worker may own the
    /// task now.
    pub async fn is_held(&self, task_id: &str, token: &LockToken) -> Result<bool> {
        let mut con = self.con.clone();
        let current: Option<String> = redis::cmd("GET")
            .arg(Self::key(task_id))
            .query_async(&mut con)
            .await?;
        Ok(current.as_deref() == Some(token.as_str()))
    }

    /// Run `fut` iff the lock is free, releasing it afterwards.
    ///
    /// The release also runs when the future panics (the panic is then
    /// resumed); if the holder process dies outright, the TTL guarantees
    /// eventual release.
    pub async fn with_lock<T, Fut>(&self, task_id: &str, fut: Fut) -> Result<LockAttempt<T>>
    where
        Fut: Future<Output = T>,
    {
        let token = match self.acquire(task_id).await? {
            Some(token) => token,
            None => return Ok(LockAttempt::Contended),
        };

        let outcome = AssertUnwindSafe(fut).catch_unwind().await;

        if let Err(e) = self.release(task_id, &token).await {
            warn!(task_id, "Lock release failed: {}", e);
        }

        match outcome {
            Ok(value) => Ok(LockAttempt::Ran(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(LockToken::fresh(), LockToken::fresh());
    }

    #[test]
    fn test_lock_key_shape() {
        assert_eq!(TaskLock::key("abc"), "task-lock:abc");
    }

    #[test]
    fn test_release_script_is_compare_and_delete() {
        assert!(RELEASE_SCRIPT.contains("GET"));
        assert!(RELEASE_SCRIPT.contains("DEL"));
        assert!(RELEASE_SCRIPT.contains("ARGV[1]"));
    }
}
