//! Position reconciler
//!
//! Periodic sweep that closes positions the target no longer holds: the
//! target exited while we were down, or an exit activity fell outside the
//! ingestion window. Orphans are liquidated at the best bid with no
//! slippage cap; an empty book means the market resolved, so the redeem
//! path takes over.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::handlers::{
    redeem::{redeem_position, RedeemResult},
    sell::{apply_mock_exit, live_sell_tokens, rescale_tracked_buys, ExitFill},
    append_record, settle_balance, HandlerCtx,
};
use super::Result;
use crate::domain::{simulate_sell, Position, Task, TradeRecord, TradeSide};
use crate::infrastructure::client::DataApiClient;

/// Audit label for fills that have no source activity.
const FORCED_CLOSE_TX: &str = "forced-close";

#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileReport {
    /// Own positions inspected.
    pub checked: usize,
    /// Orphans liquidated on the book.
    pub closed: usize,
    /// Orphans settled via redemption.
    pub redeemed: usize,
    /// Orphans left in place (unresolved market, empty book, or error).
    pub left_open: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CloseAction {
    Sold,
    Redeemed,
    Unresolved,
}

/// Compare own holdings against the target's and force-close orphans.
pub(crate) async fn reconcile(
    ctx: &HandlerCtx<'_>,
    data: &DataApiClient,
    task: &mut Task,
) -> Result<ReconcileReport> {
    let own = ctx.ledger.find(task).await?;
    let mut report = ReconcileReport {
        checked: own.len(),
        ..Default::default()
    };
    if own.is_empty() {
        return Ok(report);
    }

    let target_positions = data.positions(&task.target_address).await?;
    let target_held: HashSet<&str> = target_positions
        .iter()
        .filter(|p| p.size > 0.0)
        .map(|p| p.condition_id.as_str())
        .collect();

    for position in &own {
        if target_held.contains(position.condition_id.as_str()) {
            continue;
        }

        debug!(
            task_id = %task.id,
            condition_id = %position.condition_id,
            size = position.size,
            "Orphaned position, forcing close"
        );

        match forced_close(ctx, task, position).await {
            Ok(CloseAction::Sold) => report.closed += 1,
            Ok(CloseAction::Redeemed) => report.redeemed += 1,
            Ok(CloseAction::Unresolved) => report.left_open += 1,
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    condition_id = %position.condition_id,
                    "Forced close failed: {}",
                    e
                );
                report.left_open += 1;
            }
        }
    }

    if report.closed > 0 || report.redeemed > 0 {
        info!(
            task_id = %task.id,
            closed = report.closed,
            redeemed = report.redeemed,
            "Reconciliation swept orphaned positions"
        );
    }
    Ok(report)
}

/// Liquidate one orphaned position at whatever the book offers, falling
/// back to redemption when there are no bids.
async fn forced_close(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    position: &Position,
) -> Result<CloseAction> {
    let book = ctx.clob.order_book(&position.asset).await?;

    if !book.has_bids() {
        return match redeem_position(ctx, task, position, FORCED_CLOSE_TX).await? {
            RedeemResult::Done { .. } => Ok(CloseAction::Redeemed),
            RedeemResult::NotSettled | RedeemResult::Failed => Ok(CloseAction::Unresolved),
        };
    }

    if task.is_live() {
        let fill = live_sell_tokens(ctx, &position.asset, position.size).await?;
        if fill.sold == 0.0 {
            return Ok(CloseAction::Unresolved);
        }

        rescale_tracked_buys(ctx, &task.id, &position.asset, fill.sold).await?;

        let realized = fill.received - fill.sold * position.avg_price;
        append_record(
            ctx,
            &TradeRecord::new(
                &task.id,
                FORCED_CLOSE_TX,
                TradeSide::Sell,
                &position.condition_id,
                &position.asset,
                fill.sold,
                fill.received / fill.sold,
                fill.received,
                realized,
                task.mode.as_str(),
            ),
        )
        .await;

        settle_balance(ctx, task, fill.received).await?;
        return Ok(CloseAction::Sold);
    }

    // Target price is the best bid itself: no slippage cap applies to a
    // forced exit.
    let best_bid = book.best_bid().map(|(price, _)| price).unwrap_or(0.0);
    let fill = match simulate_sell(&book, position.size, best_bid) {
        Ok(fill) => fill,
        Err(_) => return Ok(CloseAction::Unresolved),
    };

    let realized = fill.quote_amount - fill.fill_size * position.avg_price;
    apply_mock_exit(
        ctx,
        position,
        &ExitFill {
            sold: fill.fill_size,
            received: fill.quote_amount,
            price: fill.fill_price,
        },
    )
    .await?;

    append_record(
        ctx,
        &TradeRecord::new(
            &task.id,
            FORCED_CLOSE_TX,
            TradeSide::Sell,
            &position.condition_id,
            &position.asset,
            fill.fill_size,
            fill.fill_price,
            fill.quote_amount,
            realized,
            task.mode.as_str(),
        ),
    )
    .await;

    settle_balance(ctx, task, fill.quote_amount).await?;
    Ok(CloseAction::Sold)
}
