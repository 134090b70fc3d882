//! Copy-task domain model
//!
//! A task is the unit of copy-trading work: one target account mirrored
//! into either a simulated (Mock) or on-chain (Live) account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status. `Running` means a repeating tick is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Stopped,
}

/// Execution mode, carrying the mode-specific fields.
///
/// Live tasks sign real orders: `operator_wallet` controls the funds and
/// `private_key` must derive to it (checked at creation).
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TaskMode {
    Mock,
    Live {
        #[serde(rename = "operatorWallet")]
        operator_wallet: String,
        #[serde(rename = "privateKey")]
        private_key: String,
    },
}

impl TaskMode {
    pub fn is_live(&self) -> bool {
        matches!(self, TaskMode::Live { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Mock => "mock",
            TaskMode::Live { .. } => "live",
        }
    }
}

// Keep the signing key out of log output.
impl std::fmt::Debug for TaskMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskMode::Mock => write!(f, "Mock"),
            TaskMode::Live { operator_wallet, .. } => f
                .debug_struct("Live")
                .field("operator_wallet", operator_wallet)
                .field("private_key", &"<redacted>")
                .finish(),
        }
    }
}

/// A registered copy task, persisted as JSON in the task registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    #[serde(flatten)]
    pub mode: TaskMode,

    /// Account being mirrored.
    pub target_address: String,

    /// Human reference, not consumed by the engine.
    #[serde(default)]
    pub profile_url: Option<String>,

    /// Per-BUY notional in quote units.
    pub fixed_amount: f64,

    /// Balance snapshot at creation. Mock: user-supplied. Live: on-chain
    /// quote balance at creation.
    pub initial_finance: f64,

    /// Running cash balance. Mock tracks always; Live only when
    /// `initial_finance > 0`.
    pub current_balance: f64,

    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_live(&self) -> bool {
        self.mode.is_live()
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Whether the engine maintains `current_balance` for this task.
    pub fn tracks_balance(&self) -> bool {
        match self.mode {
            TaskMode::Mock => true,
            TaskMode::Live { .. } => self.initial_finance > 0.0,
        }
    }
}

/// Creation request for a task, as accepted by the command surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    #[serde(flatten)]
    pub mode: TaskMode,

    pub target_address: String,

    #[serde(default)]
    pub profile_url: Option<String>,

    pub fixed_amount: f64,

    /// Mock starting balance. Ignored for Live (snapshotted on-chain).
    #[serde(default)]
    pub initial_finance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_task() -> Task {
        Task {
            id: "t1".to_string(),
            mode: TaskMode::Mock,
            target_address: "0xtarget".to_string(),
            profile_url: None,
            fixed_amount: 100.0,
            initial_finance: 1000.0,
            current_balance: 1000.0,
            status: TaskStatus::Running,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_json_round_trip() {
        let task = mock_task();
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains(r#""mode":"mock""#));
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "t1");
        assert!(!back.is_live());
        assert!(back.tracks_balance());
    }

    #[test]
    fn test_live_task_flattens_mode_fields() {
        let mut task = mock_task();
        task.mode = TaskMode::Live {
            operator_wallet: "0xoperator".to_string(),
            private_key: "0xsecret".to_string(),
        };
        task.initial_finance = 0.0;
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains(r#""mode":"live""#));
        assert!(json.contains(r#""operatorWallet":"0xoperator""#));
        let back: Task = serde_json::from_str(&json).unwrap();
        assert!(back.is_live());
        // Live without an initial snapshot does not track cash.
        assert!(!back.tracks_balance());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let mode = TaskMode::Live {
            operator_wallet: "0xoperator".to_string(),
            private_key: "0xsupersecret".to_string(),
        };
        let rendered = format!("{:?}", mode);
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_draft_accepts_command_payload() {
        let json = r#"{
            "mode": "mock",
            "targetAddress": "0xabc",
            "fixedAmount": 50.0,
            "initialFinance": 500.0
        }"#;
        let draft: TaskDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.fixed_amount, 50.0);
        assert_eq!(draft.initial_finance, 500.0);
        assert!(!draft.mode.is_live());
    }
}
