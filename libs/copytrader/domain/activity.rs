//! Observed trader activity and its execution lifecycle
//!
//! An [`ActivityEvent`] is what the venue's data API reports about the
//! target account. Once ingested it becomes a [`StoredActivity`] scoped to
//! the owning task, carrying the execution state machine:
//!
//! ```text
//! new -> claimed -> { ok | skipped | exhausted }
//! ```
//!
//! Only `new` rows are eligible for handling. Startup recovery resets rows
//! stranded in `claimed` by a crash back to `new`.

use serde::{Deserialize, Serialize};

/// Attempt-counter value marking a duplicate BUY that was inserted
/// pre-closed and must never execute.
pub const DUPLICATE_SENTINEL: i32 = 999;

/// Action the target performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
    Redeem,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
            TradeSide::Redeem => "REDEEM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            "REDEEM" => Some(TradeSide::Redeem),
            _ => None,
        }
    }
}

/// Execution state of a stored activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Eligible for handling.
    New,
    /// A handler owns it; duplicate tick deliveries skip it.
    Claimed,
    /// Handled with a fill.
    Ok,
    /// Preconditions failed or nothing to do.
    Skipped,
    /// Live retry budget or funds drained.
    Exhausted,
}

impl ExecState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecState::New => "new",
            ExecState::Claimed => "claimed",
            ExecState::Ok => "ok",
            ExecState::Skipped => "skipped",
            ExecState::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ExecState::New),
            "claimed" => Some(ExecState::Claimed),
            "ok" => Some(ExecState::Ok),
            "skipped" => Some(ExecState::Skipped),
            "exhausted" => Some(ExecState::Exhausted),
            _ => None,
        }
    }

    /// Terminal states are never revisited by a handler.
    pub fn is_done(&self) -> bool {
        matches!(self, ExecState::Ok | ExecState::Skipped | ExecState::Exhausted)
    }
}

/// One event from `/activity?user={addr}&start={unix_sec}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub transaction_hash: String,

    /// Unix seconds.
    pub timestamp: i64,

    pub condition_id: String,

    /// Outcome token id.
    pub asset: String,

    pub side: TradeSide,

    /// Token quantity of the target's action.
    pub size: f64,

    /// Quote notional of the target's action.
    pub usdc_size: f64,

    pub price: f64,

    pub outcome_index: i32,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub slug: String,

    #[serde(default)]
    pub outcome: String,
}

/// A persisted activity, scoped to its owning task.
///
/// `(tx_hash, task_id)` is unique. `my_bought_size` records the token
/// quantity this engine actually acquired on a BUY; proportional SELLs
/// size off it in Live mode.
#[derive(Debug, Clone)]
pub struct StoredActivity {
    pub id: i64,
    pub task_id: String,
    pub tx_hash: String,
    pub timestamp: i64,
    pub condition_id: String,
    pub asset: String,
    pub side: TradeSide,
    pub size: f64,
    pub usdc_size: f64,
    pub price: f64,
    pub outcome_index: i32,
    pub title: String,
    pub slug: String,
    pub outcome: String,
    pub state: ExecState,
    pub exec_attempts: i32,
    pub my_bought_size: f64,
}

impl StoredActivity {
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_round_trip() {
        for side in [TradeSide::Buy, TradeSide::Sell, TradeSide::Redeem] {
            assert_eq!(TradeSide::parse(side.as_str()), Some(side));
        }
        assert_eq!(TradeSide::parse("MERGE"), None);
    }

    #[test]
    fn test_exec_state_round_trip() {
        for state in [
            ExecState::New,
            ExecState::Claimed,
            ExecState::Ok,
            ExecState::Skipped,
            ExecState::Exhausted,
        ] {
            assert_eq!(ExecState::parse(state.as_str()), Some(state));
        }
        assert!(!ExecState::New.is_done());
        assert!(!ExecState::Claimed.is_done());
        assert!(ExecState::Ok.is_done());
        assert!(ExecState::Skipped.is_done());
        assert!(ExecState::Exhausted.is_done());
    }

    #[test]
    fn test_activity_event_deserialization() {
        let json = r#"{
            "transactionHash": "0xdeadbeef",
            "timestamp": 1722500000,
            "conditionId": "0xc1",
            "asset": "123456",
            "side": "BUY",
            "size": 250.0,
            "usdcSize": 100.0,
            "price": 0.40,
            "outcomeIndex": 0,
            "title": "Will it rain?",
            "slug": "will-it-rain",
            "outcome": "Yes"
        }"#;
        let event: ActivityEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.side, TradeSide::Buy);
        assert_eq!(event.size, 250.0);
        assert_eq!(event.outcome_index, 0);
    }

    #[test]
    fn test_activity_event_tolerates_missing_metadata() {
        let json = r#"{
            "transactionHash": "0xfeed",
            "timestamp": 1722500000,
            "conditionId": "0xc2",
            "asset": "777",
            "side": "REDEEM",
            "size": 10.0,
            "usdcSize": 10.0,
            "price": 1.0,
            "outcomeIndex": 1
        }"#;
        let event: ActivityEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.side, TradeSide::Redeem);
        assert!(event.title.is_empty());
    }
}
