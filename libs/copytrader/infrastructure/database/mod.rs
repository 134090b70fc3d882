//! Document stores for activities, positions and trade records
//!
//! All rows are scoped by `task_id`; only the task's lock holder writes
//! them. Trade records are append-only and survive until their task is
//! removed.

pub mod schema;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{debug, info};

pub use schema::{initialize_schema, SCHEMA_VERSION};

use crate::domain::{
    ActivityEvent, ExecState, Position, StoredActivity, TradeRecord, TradeSide,
};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    SchemaError(#[from] schema::SchemaError),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Engine database manager
pub struct CopyDatabase {
    pool: PgPool,
}

impl CopyDatabase {
    /// Create new database connection and initialize schema
    pub async fn new(db_url: &str) -> Result<Self> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(db_url)
            .await?;

        schema::initialize_schema(&pool).await?;

        info!("Database initialized successfully");

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== ACTIVITY OPERATIONS ====================

    /// Insert one observed activity for a task.
    ///
    /// Idempotent on `(task_id, tx_hash)`; returns whether a new row was
    /// written. Each insert stands alone so a failure mid-batch leaves
    /// earlier rows in place.
    pub async fn insert_activity(
        &self,
        task_id: &str,
        event: &ActivityEvent,
        state: ExecState,
        exec_attempts: i32,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO activities (
                task_id, tx_hash, timestamp, condition_id, asset, side,
                size, usdc_size, price, outcome_index, title, slug, outcome,
                state, exec_attempts
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (task_id, tx_hash) DO NOTHING
            "#,
        )
        .bind(task_id)
        .bind(&event.transaction_hash)
        .bind(event.timestamp)
        .bind(&event.condition_id)
        .bind(&event.asset)
        .bind(event.side.as_str())
        .bind(event.size)
        .bind(event.usdc_size)
        .bind(event.price)
        .bind(event.outcome_index)
        .bind(&event.title)
        .bind(&event.slug)
        .bind(&event.outcome)
        .bind(state.as_str())
        .bind(exec_attempts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn has_activity(&self, task_id: &str, tx_hash: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM activities WHERE task_id = $1 AND tx_hash = $2")
            .bind(task_id)
            .bind(tx_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Whether this task already holds a BUY row for the condition
    /// (any state). Used by ingestion's duplicate-BUY rule.
    pub async fn has_buy_for_condition(&self, task_id: &str, condition_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM activities WHERE task_id = $1 AND condition_id = $2 AND side = 'BUY' LIMIT 1",
        )
        .bind(task_id)
        .bind(condition_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Pending (`state=new`) activities in ingestion order.
    pub async fn pending_activities(&self, task_id: &str) -> Result<Vec<StoredActivity>> {
        let rows = sqlx::query(
            "SELECT * FROM activities WHERE task_id = $1 AND state = 'new' ORDER BY id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_activity_row).collect()
    }

    /// Claim an activity for handling. Returns false when another tick
    /// already claimed or finished it.
    pub async fn claim_activity(&self, activity_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE activities SET state = 'claimed', exec_attempts = exec_attempts + 1
             WHERE id = $1 AND state = 'new'",
        )
        .bind(activity_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hand a claimed activity back for a later tick (the handler hit a
    /// transient failure before reaching a terminal state).
    pub async fn unclaim_activity(&self, activity_id: i64) -> Result<()> {
        sqlx::query("UPDATE activities SET state = 'new' WHERE id = $1 AND state = 'claimed'")
            .bind(activity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Transition a claimed activity into a terminal state.
    pub async fn finish_activity(&self, activity_id: i64, state: ExecState) -> Result<()> {
        debug_assert!(state.is_done());
        sqlx::query("UPDATE activities SET state = $2 WHERE id = $1")
            .bind(activity_id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the token quantity this engine actually acquired for a BUY.
    pub async fn set_my_bought_size(&self, activity_id: i64, size: f64) -> Result<()> {
        sqlx::query("UPDATE activities SET my_bought_size = $2 WHERE id = $1")
            .bind(activity_id)
            .bind(size)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Total size of unprocessed SELL activities for one asset, the
    /// currently-claimed one included.
    pub async fn pending_sell_size(&self, task_id: &str, asset: &str) -> Result<f64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(size), 0) AS total FROM activities
             WHERE task_id = $1 AND asset = $2 AND side = 'SELL'
               AND state IN ('new', 'claimed')",
        )
        .bind(task_id)
        .bind(asset)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<f64, _>("total")?)
    }

    /// Whether an earlier BUY for this condition already completed with a
    /// tracked fill (Live double-buy guard against venue read lag).
    pub async fn has_recent_filled_buy(&self, task_id: &str, condition_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM activities
             WHERE task_id = $1 AND condition_id = $2 AND side = 'BUY'
               AND state = 'ok' AND my_bought_size > 0
             LIMIT 1",
        )
        .bind(task_id)
        .bind(condition_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Sum of tracked fills from completed BUYs for one asset.
    pub async fn tracked_bought_size(&self, task_id: &str, asset: &str) -> Result<f64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(my_bought_size), 0) AS total FROM activities
             WHERE task_id = $1 AND asset = $2 AND side = 'BUY' AND state = 'ok'",
        )
        .bind(task_id)
        .bind(asset)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<f64, _>("total")?)
    }

    /// Scale every tracked BUY fill for an asset by `factor` (partial
    /// exit bookkeeping).
    pub async fn scale_tracked_buys(&self, task_id: &str, asset: &str, factor: f64) -> Result<()> {
        sqlx::query(
            "UPDATE activities SET my_bought_size = my_bought_size * $3
             WHERE task_id = $1 AND asset = $2 AND side = 'BUY' AND my_bought_size > 0",
        )
        .bind(task_id)
        .bind(asset)
        .bind(factor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Zero every tracked BUY fill for an asset (full exit).
    pub async fn zero_tracked_buys(&self, task_id: &str, asset: &str) -> Result<()> {
        sqlx::query(
            "UPDATE activities SET my_bought_size = 0
             WHERE task_id = $1 AND asset = $2 AND side = 'BUY' AND my_bought_size > 0",
        )
        .bind(task_id)
        .bind(asset)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Startup recovery: activities stranded in `claimed` by a crash go
    /// back to `new` so they are re-handled.
    pub async fn reset_claimed(&self, task_ids: &[String]) -> Result<u64> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE activities SET state = 'new' WHERE state = 'claimed' AND task_id = ANY($1)",
        )
        .bind(task_ids)
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected();
        if reset > 0 {
            info!("Recovered {} stranded activity claim(s)", reset);
        }
        Ok(reset)
    }

    // ==================== POSITION OPERATIONS ====================

    pub async fn upsert_position(&self, position: &Position) -> Result<()> {
        debug!(
            task_id = %position.task_id,
            condition_id = %position.condition_id,
            size = position.size,
            "Upserting position"
        );
        sqlx::query(
            r#"
            INSERT INTO positions (
                task_id, asset, condition_id, size, avg_price, total_bought,
                current_value, realized_pnl, cur_price, title, slug, outcome, outcome_index
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (task_id, asset, condition_id) DO UPDATE SET
                size = EXCLUDED.size,
                avg_price = EXCLUDED.avg_price,
                total_bought = EXCLUDED.total_bought,
                current_value = EXCLUDED.current_value,
                realized_pnl = EXCLUDED.realized_pnl,
                cur_price = EXCLUDED.cur_price,
                title = EXCLUDED.title,
                slug = EXCLUDED.slug,
                outcome = EXCLUDED.outcome,
                outcome_index = EXCLUDED.outcome_index
            "#,
        )
        .bind(&position.task_id)
        .bind(&position.asset)
        .bind(&position.condition_id)
        .bind(position.size)
        .bind(position.avg_price)
        .bind(position.total_bought)
        .bind(position.current_value)
        .bind(position.realized_pnl)
        .bind(position.cur_price)
        .bind(&position.title)
        .bind(&position.slug)
        .bind(&position.outcome)
        .bind(position.outcome_index)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_position(
        &self,
        task_id: &str,
        asset: &str,
        condition_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "DELETE FROM positions WHERE task_id = $1 AND asset = $2 AND condition_id = $3",
        )
        .bind(task_id)
        .bind(asset)
        .bind(condition_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_positions(&self, task_id: &str) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE task_id = $1 ORDER BY id ASC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_position_row).collect()
    }

    pub async fn find_position_by_condition(
        &self,
        task_id: &str,
        condition_id: &str,
    ) -> Result<Option<Position>> {
        let row = sqlx::query(
            "SELECT * FROM positions WHERE task_id = $1 AND condition_id = $2 LIMIT 1",
        )
        .bind(task_id)
        .bind(condition_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(map_position_row).transpose()
    }

    // ==================== TRADE RECORD OPERATIONS ====================

    /// Append one fill to the audit ledger. Callers treat failures as
    /// log-and-continue; this method only reports them.
    pub async fn append_trade_record(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trade_records (
                task_id, tx_hash, side, condition_id, asset,
                size, price, quote_amount, realized_pnl, mode, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&record.task_id)
        .bind(&record.tx_hash)
        .bind(record.side.as_str())
        .bind(&record.condition_id)
        .bind(&record.asset)
        .bind(record.size)
        .bind(record.price)
        .bind(record.quote_amount)
        .bind(record.realized_pnl)
        .bind(&record.mode)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn trade_records(&self, task_id: &str) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM trade_records WHERE task_id = $1 ORDER BY id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_record_row).collect()
    }

    // ==================== TASK PURGE ====================

    /// Remove every document owned by a task (activities, positions and
    /// trade records).
    pub async fn purge_task(&self, task_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM activities WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM positions WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM trade_records WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        info!(task_id, "Purged task documents");
        Ok(())
    }
}

fn map_activity_row(row: &sqlx::postgres::PgRow) -> Result<StoredActivity> {
    let side_raw: String = row.try_get("side")?;
    let side = TradeSide::parse(&side_raw)
        .ok_or_else(|| DatabaseError::InvalidRow(format!("unknown side '{}'", side_raw)))?;

    let state_raw: String = row.try_get("state")?;
    let state = ExecState::parse(&state_raw)
        .ok_or_else(|| DatabaseError::InvalidRow(format!("unknown state '{}'", state_raw)))?;

    Ok(StoredActivity {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        tx_hash: row.try_get("tx_hash")?,
        timestamp: row.try_get("timestamp")?,
        condition_id: row.try_get("condition_id")?,
        asset: row.try_get("asset")?,
        side,
        size: row.try_get("size")?,
        usdc_size: row.try_get("usdc_size")?,
        price: row.try_get("price")?,
        outcome_index: row.try_get("outcome_index")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        outcome: row.try_get("outcome")?,
        state,
        exec_attempts: row.try_get("exec_attempts")?,
        my_bought_size: row.try_get("my_bought_size")?,
    })
}

fn map_position_row(row: &sqlx::postgres::PgRow) -> Result<Position> {
    Ok(Position {
        task_id: row.try_get("task_id")?,
        asset: row.try_get("asset")?,
        condition_id: row.try_get("condition_id")?,
        size: row.try_get("size")?,
        avg_price: row.try_get("avg_price")?,
        total_bought: row.try_get("total_bought")?,
        current_value: row.try_get("current_value")?,
        realized_pnl: row.try_get("realized_pnl")?,
        cur_price: row.try_get("cur_price")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        outcome: row.try_get("outcome")?,
        outcome_index: row.try_get("outcome_index")?,
    })
}

fn map_record_row(row: &sqlx::postgres::PgRow) -> Result<TradeRecord> {
    let side_raw: String = row.try_get("side")?;
    let side = TradeSide::parse(&side_raw)
        .ok_or_else(|| DatabaseError::InvalidRow(format!("unknown side '{}'", side_raw)))?;

    Ok(TradeRecord {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        tx_hash: row.try_get("tx_hash")?,
        side,
        condition_id: row.try_get("condition_id")?,
        asset: row.try_get("asset")?,
        size: row.try_get("size")?,
        price: row.try_get("price")?,
        quote_amount: row.try_get("quote_amount")?,
        realized_pnl: row.try_get("realized_pnl")?,
        mode: row.try_get("mode")?,
        created_at: row.try_get("created_at")?,
    })
}
