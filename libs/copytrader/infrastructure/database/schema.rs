use sqlx::PgPool;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Database schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize database schema
pub async fn initialize_schema(pool: &PgPool) -> Result<()> {
    // Activities: one row per observed target event, scoped per task
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            id BIGSERIAL PRIMARY KEY,
            task_id TEXT NOT NULL,
            tx_hash TEXT NOT NULL,
            timestamp BIGINT NOT NULL,
            condition_id TEXT NOT NULL,
            asset TEXT NOT NULL,
            side TEXT NOT NULL,
            size DOUBLE PRECISION NOT NULL,
            usdc_size DOUBLE PRECISION NOT NULL,
            price DOUBLE PRECISION NOT NULL,
            outcome_index INTEGER NOT NULL DEFAULT 0,
            title TEXT NOT NULL DEFAULT '',
            slug TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT 'new',
            exec_attempts INTEGER NOT NULL DEFAULT 0,
            my_bought_size DOUBLE PRECISION NOT NULL DEFAULT 0,
            UNIQUE (task_id, tx_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activities_pending ON activities(task_id, state)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activities_asset ON activities(task_id, asset, side)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_activities_condition ON activities(task_id, condition_id)",
    )
    .execute(pool)
    .await?;

    // Mock positions: authoritative ledger keyed (task, asset, condition)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            id BIGSERIAL PRIMARY KEY,
            task_id TEXT NOT NULL,
            asset TEXT NOT NULL,
            condition_id TEXT NOT NULL,
            size DOUBLE PRECISION NOT NULL,
            avg_price DOUBLE PRECISION NOT NULL,
            total_bought DOUBLE PRECISION NOT NULL,
            current_value DOUBLE PRECISION NOT NULL DEFAULT 0,
            realized_pnl DOUBLE PRECISION NOT NULL DEFAULT 0,
            cur_price DOUBLE PRECISION NOT NULL DEFAULT 0,
            title TEXT NOT NULL DEFAULT '',
            slug TEXT NOT NULL DEFAULT '',
            outcome TEXT NOT NULL DEFAULT '',
            outcome_index INTEGER NOT NULL DEFAULT 0,
            UNIQUE (task_id, asset, condition_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_task ON positions(task_id)")
        .execute(pool)
        .await?;

    // Trade records: append-only audit ledger
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trade_records (
            id BIGSERIAL PRIMARY KEY,
            task_id TEXT NOT NULL,
            tx_hash TEXT NOT NULL,
            side TEXT NOT NULL,
            condition_id TEXT NOT NULL,
            asset TEXT NOT NULL,
            size DOUBLE PRECISION NOT NULL,
            price DOUBLE PRECISION NOT NULL,
            quote_amount DOUBLE PRECISION NOT NULL,
            realized_pnl DOUBLE PRECISION NOT NULL,
            mode TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_records_task ON trade_records(task_id)")
        .execute(pool)
        .await?;

    Ok(())
}
