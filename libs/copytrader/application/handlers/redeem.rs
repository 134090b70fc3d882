//! REDEEM handler
//!
//! Converts outcome tokens of a resolved market into collateral. Mock
//! tasks book the payout directly; Live tasks execute the on-chain
//! redemption first and only book what confirmed. Unsettled markets are
//! left for a later sweep.

use tracing::warn;

use super::{append_record, settle_balance, HandlerCtx, HandlerOutcome, SkipReason};
use crate::domain::{
    redeem_figures, Position, StoredActivity, Task, TaskMode, TradeRecord, TradeSide,
};
use crate::infrastructure::client::settlement::SettlementError;

/// Outcome of attempting to redeem one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum RedeemResult {
    Done { value: f64, realized: f64 },
    NotSettled,
    Failed,
}

/// Redeem a position if its market has resolved.
///
/// Shared between the REDEEM activity handler and the reconciler's
/// escalation path; `source_tx` labels the audit record.
pub(crate) async fn redeem_position(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    own: &Position,
    source_tx: &str,
) -> super::Result<RedeemResult> {
    let payout = match ctx
        .settlement
        .payout_ratio(&own.condition_id, own.outcome_index)
        .await
    {
        Ok(payout) => payout,
        Err(
            e @ (SettlementError::InvalidOutcomeIndex { .. }
            | SettlementError::InvalidConditionId(_)),
        ) => {
            warn!(condition_id = %own.condition_id, "Unredeemable position: {}", e);
            return Ok(RedeemResult::NotSettled);
        }
        Err(e) => return Err(e.into()),
    };

    if !payout.settled {
        return Ok(RedeemResult::NotSettled);
    }

    let (value, realized) = redeem_figures(own.size, payout.payout, own.avg_price);

    if let TaskMode::Live {
        ref private_key, ..
    } = task.mode
    {
        let private_key = private_key.clone();
        match ctx
            .settlement
            .redeem_on_chain(&private_key, &own.condition_id)
            .await
        {
            Ok(outcome) => {
                tracing::info!(
                    condition_id = %own.condition_id,
                    tx_hash = %outcome.tx_hash,
                    gas_used = ?outcome.gas_used,
                    "On-chain redemption confirmed"
                );
            }
            Err(e) => {
                warn!(condition_id = %own.condition_id, "On-chain redemption failed: {}", e);
                return Ok(RedeemResult::Failed);
            }
        }
    }

    append_record(
        ctx,
        &TradeRecord::new(
            &task.id,
            source_tx,
            TradeSide::Redeem,
            &own.condition_id,
            &own.asset,
            own.size,
            payout.payout,
            value,
            realized,
            task.mode.as_str(),
        ),
    )
    .await;

    ctx.ledger
        .delete(&task.id, &own.asset, &own.condition_id)
        .await?;

    settle_balance(ctx, task, value).await?;

    Ok(RedeemResult::Done { value, realized })
}

pub(crate) async fn handle(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own_position: Option<Position>,
) -> super::Result<HandlerOutcome> {
    let Some(own) = own_position else {
        return Ok(HandlerOutcome::Skipped(SkipReason::NoPosition));
    };
    if own.size <= 0.0 {
        return Ok(HandlerOutcome::Skipped(SkipReason::NoPosition));
    }

    match redeem_position(ctx, task, &own, &activity.tx_hash).await? {
        RedeemResult::Done { value, realized } => Ok(HandlerOutcome::Executed {
            fill_size: own.size,
            quote_amount: value,
            realized_pnl: realized,
        }),
        // Either the market has not resolved or the chain call failed;
        // a later cycle may succeed.
        RedeemResult::NotSettled | RedeemResult::Failed => {
            Ok(HandlerOutcome::Skipped(SkipReason::NotSettled))
        }
    }
}
