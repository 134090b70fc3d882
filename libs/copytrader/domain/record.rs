//! Trade record ledger rows
//!
//! Append-only audit trail: one row per executed fill (BUY, SELL or
//! REDEEM, Mock or Live), carrying the source activity's transaction hash
//! and the realized PnL computed at execution time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::activity::TradeSide;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Database-assigned; zero until persisted.
    #[serde(default)]
    pub id: i64,

    pub task_id: String,

    /// Transaction hash of the source activity, for audit.
    pub tx_hash: String,

    pub side: TradeSide,

    pub condition_id: String,

    pub asset: String,

    /// Tokens filled.
    pub size: f64,

    /// Weighted execution price (payout ratio for REDEEM).
    pub price: f64,

    /// Quote spent (BUY) or received (SELL/REDEEM).
    pub quote_amount: f64,

    pub realized_pnl: f64,

    /// "mock" or "live".
    pub mode: String,

    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn new(
        task_id: &str,
        tx_hash: &str,
        side: TradeSide,
        condition_id: &str,
        asset: &str,
        size: f64,
        price: f64,
        quote_amount: f64,
        realized_pnl: f64,
        mode: &str,
    ) -> Self {
        Self {
            id: 0,
            task_id: task_id.to_string(),
            tx_hash: tx_hash.to_string(),
            side,
            condition_id: condition_id.to_string(),
            asset: asset.to_string(),
            size,
            price,
            quote_amount,
            realized_pnl,
            mode: mode.to_string(),
            created_at: Utc::now(),
        }
    }
}
