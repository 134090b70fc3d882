//! Trade handlers
//!
//! One handler per observed action (BUY / SELL / REDEEM), each with Mock
//! and Live variants. Handlers receive the pending activity, the owning
//! task, the task's own position in that market (if any) and the target's
//! current position (if any). Every handler claims its activity first so
//! duplicate tick deliveries skip it, and finishes it in a terminal
//! state; one activity's failure never aborts the tick.

pub mod buy;
pub mod redeem;
pub mod sell;

use tracing::{info, warn};

use super::ledger::PositionLedger;
use super::Result;
use crate::domain::{
    ExecState, Position, StoredActivity, Task, TradeRecord, TradeSide, VenuePosition,
};
use crate::infrastructure::client::{ClobClient, SettlementClient};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::database::CopyDatabase;
use crate::infrastructure::store::TaskStore;

/// Everything a handler needs to act.
pub struct HandlerCtx<'a> {
    pub cfg: &'a EngineConfig,
    pub db: &'a CopyDatabase,
    pub ledger: &'a PositionLedger,
    pub clob: &'a ClobClient,
    pub settlement: &'a SettlementClient,
    pub tasks: &'a TaskStore,
}

/// Why an activity was skipped without a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Unit price above the BUY cap; no upside left in the bet.
    PriceCapExceeded,
    /// Already holding this market; no pyramiding.
    AlreadyHolding,
    /// Capped notional below the venue minimum.
    BelowMinimumNotional,
    /// Reconstructed sell size below one token.
    BelowMinimumTokens,
    /// Empty or unusable book.
    NoLiquidity,
    /// Weighted fill strayed beyond the BUY ceiling.
    SlippageTooHigh,
    /// Nothing held to sell or redeem.
    NoPosition,
    /// Market not resolved yet.
    NotSettled,
    /// An earlier Live BUY filled but the venue snapshot has not caught
    /// up; buying again would double up.
    RecentBuyPending,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::PriceCapExceeded => "price above cap",
            SkipReason::AlreadyHolding => "already holding",
            SkipReason::BelowMinimumNotional => "below minimum notional",
            SkipReason::BelowMinimumTokens => "below minimum size",
            SkipReason::NoLiquidity => "no liquidity",
            SkipReason::SlippageTooHigh => "slippage too high",
            SkipReason::NoPosition => "no position",
            SkipReason::NotSettled => "not settled",
            SkipReason::RecentBuyPending => "recent buy pending",
        }
    }
}

/// Terminal result of handling one activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandlerOutcome {
    /// Fill executed (possibly partial).
    Executed {
        fill_size: f64,
        quote_amount: f64,
        realized_pnl: f64,
    },
    /// No fill possible or preconditions failed.
    Skipped(SkipReason),
    /// Live retry budget or funds drained; any partial fill is already
    /// recorded.
    Exhausted { fill_size: f64, quote_amount: f64 },
}

impl HandlerOutcome {
    pub fn final_state(&self) -> ExecState {
        match self {
            HandlerOutcome::Executed { .. } => ExecState::Ok,
            HandlerOutcome::Skipped(_) => ExecState::Skipped,
            HandlerOutcome::Exhausted { .. } => ExecState::Exhausted,
        }
    }
}

/// Claim, dispatch and finish one pending activity.
///
/// Returns `None` when the claim was lost to a concurrent delivery.
pub async fn dispatch(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own_position: Option<Position>,
    target_position: Option<&VenuePosition>,
) -> Result<Option<HandlerOutcome>> {
    if !ctx.db.claim_activity(activity.id).await? {
        return Ok(None);
    }

    let outcome = match (activity.side, task.is_live()) {
        (TradeSide::Buy, false) => buy::handle_mock(ctx, task, activity, own_position).await?,
        (TradeSide::Buy, true) => buy::handle_live(ctx, task, activity, own_position).await?,
        (TradeSide::Sell, _) => {
            sell::handle(ctx, task, activity, own_position, target_position).await?
        }
        (TradeSide::Redeem, _) => redeem::handle(ctx, task, activity, own_position).await?,
    };

    ctx.db
        .finish_activity(activity.id, outcome.final_state())
        .await?;

    match &outcome {
        HandlerOutcome::Executed {
            fill_size,
            quote_amount,
            ..
        } => info!(
            task_id = %task.id,
            tx_hash = %activity.tx_hash,
            side = activity.side.as_str(),
            fill_size,
            quote_amount,
            "Activity executed"
        ),
        HandlerOutcome::Skipped(reason) => info!(
            task_id = %task.id,
            tx_hash = %activity.tx_hash,
            side = activity.side.as_str(),
            reason = reason.as_str(),
            "Activity skipped"
        ),
        HandlerOutcome::Exhausted { fill_size, .. } => warn!(
            task_id = %task.id,
            tx_hash = %activity.tx_hash,
            side = activity.side.as_str(),
            fill_size,
            "Activity exhausted"
        ),
    }

    Ok(Some(outcome))
}

/// Apply a cash delta to the task and persist it, when the task tracks a
/// balance at all.
pub(crate) async fn settle_balance(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    delta: f64,
) -> Result<()> {
    if task.tracks_balance() && delta != 0.0 {
        task.current_balance += delta;
        ctx.tasks.put(task).await?;
    }
    Ok(())
}

/// Append to the audit ledger. Record writes never fail a handler.
pub(crate) async fn append_record(ctx: &HandlerCtx<'_>, record: &TradeRecord) {
    if let Err(e) = ctx.db.append_trade_record(record).await {
        warn!(
            task_id = %record.task_id,
            tx_hash = %record.tx_hash,
            "Trade record write failed: {}",
            e
        );
    }
}
