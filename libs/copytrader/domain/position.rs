//! Position domain model
//!
//! Keyed by `(task_id, asset, condition_id)`. Mock positions are
//! authoritative rows in the database; Live positions are read-through
//! snapshots converted from the venue's position endpoint into the same
//! shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub task_id: String,
    pub asset: String,
    pub condition_id: String,

    /// Token quantity held. Never negative; a zero-size position is
    /// deleted rather than kept.
    pub size: f64,

    pub avg_price: f64,

    /// Running cost basis; decreases on SELL by `sold_tokens * avg_price`.
    pub total_bought: f64,

    pub current_value: f64,

    pub realized_pnl: f64,

    pub cur_price: f64,

    pub title: String,
    pub slug: String,
    pub outcome: String,
    pub outcome_index: i32,
}

impl Position {
    /// Open a fresh position from a BUY fill.
    pub fn from_buy(
        task_id: &str,
        asset: &str,
        condition_id: &str,
        fill_size: f64,
        fill_price: f64,
        quote_spent: f64,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            asset: asset.to_string(),
            condition_id: condition_id.to_string(),
            size: fill_size,
            avg_price: fill_price,
            total_bought: quote_spent,
            current_value: fill_size * fill_price,
            realized_pnl: 0.0,
            cur_price: fill_price,
            title: String::new(),
            slug: String::new(),
            outcome: String::new(),
            outcome_index: 0,
        }
    }

    pub fn with_market_meta(
        mut self,
        title: &str,
        slug: &str,
        outcome: &str,
        outcome_index: i32,
    ) -> Self {
        self.title = title.to_string();
        self.slug = slug.to_string();
        self.outcome = outcome.to_string();
        self.outcome_index = outcome_index;
        self
    }

    /// Book an exit fill against this position.
    ///
    /// Residuals at or below `residual_epsilon` close the position
    /// outright; otherwise the size shrinks, the cost basis drops by
    /// `sold * avg_price` (never below zero) and the realized PnL
    /// accumulates.
    pub fn after_exit(
        &self,
        sold: f64,
        received: f64,
        exit_price: f64,
        residual_epsilon: f64,
    ) -> PositionAfterExit {
        let residual = self.size - sold;
        if residual <= residual_epsilon {
            return PositionAfterExit::Closed;
        }

        let mut updated = self.clone();
        updated.size = residual;
        updated.total_bought = (self.total_bought - sold * self.avg_price).max(0.0);
        updated.realized_pnl = self.realized_pnl + (received - sold * self.avg_price);
        updated.cur_price = exit_price;
        updated.current_value = residual * exit_price;
        PositionAfterExit::Open(updated)
    }
}

/// What remains of a position after an exit fill.
#[derive(Debug, Clone)]
pub enum PositionAfterExit {
    /// Emptied; the ledger row is deleted, never kept at zero size.
    Closed,
    /// Still open with the updated accounting.
    Open(Position),
}

/// Venue position as served by `/positions?user={addr}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenuePosition {
    pub asset: String,
    pub condition_id: String,
    pub size: f64,
    pub avg_price: f64,
    #[serde(default)]
    pub total_bought: f64,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub cur_price: f64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub outcome_index: i32,
}

impl VenuePosition {
    /// Key a venue snapshot the same way the ledger keys its rows.
    pub fn into_position(self, task_id: &str) -> Position {
        Position {
            task_id: task_id.to_string(),
            asset: self.asset,
            condition_id: self.condition_id,
            size: self.size,
            avg_price: self.avg_price,
            total_bought: self.total_bought,
            current_value: self.current_value,
            realized_pnl: self.realized_pnl,
            cur_price: self.cur_price,
            title: self.title,
            slug: self.slug,
            outcome: self.outcome,
            outcome_index: self.outcome_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_buy() {
        let p = Position::from_buy("t1", "asset1", "0xc1", 250.0, 0.40, 100.0);
        assert_eq!(p.size, 250.0);
        assert_eq!(p.avg_price, 0.40);
        assert_eq!(p.total_bought, 100.0);
        assert_eq!(p.realized_pnl, 0.0);
    }

    #[test]
    fn test_exit_shrinks_position() {
        let p = Position::from_buy("t1", "a", "0xc", 100.0, 0.30, 30.0);
        match p.after_exit(40.0, 20.0, 0.50, 0.01) {
            PositionAfterExit::Open(updated) => {
                assert!((updated.size - 60.0).abs() < 1e-9);
                assert!((updated.total_bought - 18.0).abs() < 1e-9);
                assert!((updated.realized_pnl - 8.0).abs() < 1e-9);
                assert!((updated.current_value - 30.0).abs() < 1e-9);
            }
            other => panic!("expected open position, got {:?}", other),
        }
    }

    #[test]
    fn test_full_exit_closes_position() {
        let p = Position::from_buy("t1", "a", "0xc", 100.0, 0.30, 30.0);
        assert!(matches!(
            p.after_exit(100.0, 50.0, 0.50, 0.01),
            PositionAfterExit::Closed
        ));
    }

    #[test]
    fn test_dust_residual_closes_position() {
        let p = Position::from_buy("t1", "a", "0xc", 100.0, 0.30, 30.0);
        assert!(matches!(
            p.after_exit(99.995, 50.0, 0.50, 0.01),
            PositionAfterExit::Closed
        ));
    }

    #[test]
    fn test_cost_basis_never_negative() {
        let mut p = Position::from_buy("t1", "a", "0xc", 100.0, 0.30, 30.0);
        p.total_bought = 5.0;
        match p.after_exit(40.0, 20.0, 0.50, 0.01) {
            PositionAfterExit::Open(updated) => assert_eq!(updated.total_bought, 0.0),
            other => panic!("expected open position, got {:?}", other),
        }
    }

    #[test]
    fn test_venue_position_deserialization() {
        let json = r#"{
            "asset": "123",
            "conditionId": "0xc9",
            "size": 60.0,
            "avgPrice": 0.30,
            "curPrice": 0.55,
            "title": "Some market",
            "outcomeIndex": 1
        }"#;
        let venue: VenuePosition = serde_json::from_str(json).unwrap();
        let p = venue.into_position("t9");
        assert_eq!(p.task_id, "t9");
        assert_eq!(p.condition_id, "0xc9");
        assert_eq!(p.size, 60.0);
        assert_eq!(p.outcome_index, 1);
        assert_eq!(p.total_bought, 0.0);
    }
}
