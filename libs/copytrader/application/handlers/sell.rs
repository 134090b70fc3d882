//! SELL handler
//!
//! The target reports only its own sell size, so the share of our holding
//! to liquidate has to be reconstructed: the target's position *before*
//! this sell equals its current size plus every still-unprocessed SELL we
//! have queued for the asset (this one included). The trade's size over
//! that reconstructed total is the fraction to mirror.

use tracing::{debug, warn};

use super::{append_record, settle_balance, HandlerCtx, HandlerOutcome, SkipReason};
use crate::domain::{
    reconstruct_sell_size, simulate_sell, FillRejection, Position, PositionAfterExit,
    StoredActivity, Task, TradeRecord, TradeSide, VenuePosition,
};
use crate::infrastructure::client::{OrderArgs, OrderSide, OrderType};

/// Residual below which a Mock position is considered emptied.
const RESIDUAL_EPSILON: f64 = 0.01;

/// Sold fraction above which tracked BUY fills are zeroed outright.
const FULL_EXIT_FRACTION: f64 = 0.99;

/// Mock + Live SELL entry point.
pub(crate) async fn handle(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own_position: Option<Position>,
    target_position: Option<&VenuePosition>,
) -> super::Result<HandlerOutcome> {
    let Some(own) = own_position else {
        return Ok(HandlerOutcome::Skipped(SkipReason::NoPosition));
    };
    if own.size <= 0.0 {
        return Ok(HandlerOutcome::Skipped(SkipReason::NoPosition));
    }

    let pending_sells = ctx.db.pending_sell_size(&task.id, &activity.asset).await?;

    let tracked_bought = if task.is_live() {
        Some(ctx.db.tracked_bought_size(&task.id, &activity.asset).await?)
    } else {
        None
    };

    let base_size = reconstruct_sell_size(
        activity.size,
        target_position.map(|p| p.size),
        pending_sells,
        own.size,
        tracked_bought,
    );

    debug!(
        tx_hash = %activity.tx_hash,
        trade_size = activity.size,
        pending_sells,
        own_size = own.size,
        base_size,
        "SELL sizing reconstructed"
    );

    if base_size < ctx.cfg.min_order_tokens {
        return Ok(HandlerOutcome::Skipped(SkipReason::BelowMinimumTokens));
    }

    if task.is_live() {
        handle_live(ctx, task, activity, &own, base_size).await
    } else {
        handle_mock(ctx, task, activity, &own, base_size).await
    }
}

async fn handle_mock(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own: &Position,
    base_size: f64,
) -> super::Result<HandlerOutcome> {
    let book = ctx.clob.order_book(&activity.asset).await?;
    let fill = match simulate_sell(&book, base_size, activity.price) {
        Ok(fill) => fill,
        Err(FillRejection::NoLiquidity) => {
            return Ok(HandlerOutcome::Skipped(SkipReason::NoLiquidity))
        }
        Err(FillRejection::SlippageExceeded { .. }) => {
            // Sells carry no ceiling; the simulator never returns this.
            return Ok(HandlerOutcome::Skipped(SkipReason::NoLiquidity));
        }
    };

    let realized = fill.quote_amount - fill.fill_size * own.avg_price;
    apply_mock_exit(ctx, own, &fill_to_exit(&fill)).await?;

    append_record(
        ctx,
        &TradeRecord::new(
            &task.id,
            &activity.tx_hash,
            TradeSide::Sell,
            &activity.condition_id,
            &activity.asset,
            fill.fill_size,
            fill.fill_price,
            fill.quote_amount,
            realized,
            task.mode.as_str(),
        ),
    )
    .await;

    settle_balance(ctx, task, fill.quote_amount).await?;

    Ok(HandlerOutcome::Executed {
        fill_size: fill.fill_size,
        quote_amount: fill.quote_amount,
        realized_pnl: realized,
    })
}

/// Sold tokens and proceeds, independent of how the fill happened.
pub(crate) struct ExitFill {
    pub sold: f64,
    pub received: f64,
    pub price: f64,
}

fn fill_to_exit(fill: &crate::domain::Fill) -> ExitFill {
    ExitFill {
        sold: fill.fill_size,
        received: fill.quote_amount,
        price: fill.fill_price,
    }
}

/// Shrink or delete a Mock position after an exit fill.
pub(crate) async fn apply_mock_exit(
    ctx: &HandlerCtx<'_>,
    own: &Position,
    exit: &ExitFill,
) -> super::Result<()> {
    match own.after_exit(exit.sold, exit.received, exit.price, RESIDUAL_EPSILON) {
        PositionAfterExit::Closed => {
            ctx.ledger
                .delete(&own.task_id, &own.asset, &own.condition_id)
                .await?;
        }
        PositionAfterExit::Open(updated) => {
            ctx.ledger.upsert(&updated).await?;
        }
    }
    Ok(())
}

pub(crate) struct LiveSellFill {
    pub sold: f64,
    pub received: f64,
    pub exhausted: bool,
}

/// Bounded fill-or-kill loop against the bids. No slippage ceiling:
/// liquidation proceeds at whatever the book offers.
pub(crate) async fn live_sell_tokens(
    ctx: &HandlerCtx<'_>,
    asset: &str,
    tokens: f64,
) -> super::Result<LiveSellFill> {
    let mut remaining = tokens;
    let mut sold = 0.0;
    let mut received = 0.0;
    let mut retries = 0u32;
    let mut exhausted = false;

    while retries < ctx.cfg.live_retry_limit {
        if remaining < ctx.cfg.min_order_tokens {
            break;
        }

        let book = ctx.clob.order_book(asset).await?;
        let Some((best_price, best_size)) = book.best_bid() else {
            break;
        };

        let order_size = remaining.min(best_size);

        let placement = ctx
            .clob
            .submit_order(&OrderArgs {
                token_id: asset.to_string(),
                price: best_price,
                size: order_size,
                side: OrderSide::Sell,
                order_type: OrderType::FOK,
            })
            .await?;

        if placement.success {
            sold += order_size;
            received += order_size * best_price;
            remaining -= order_size;
            retries = 0;
        } else if placement.is_insufficient_funds() {
            warn!(asset, "Live SELL stopped: insufficient allowance");
            exhausted = true;
            break;
        } else {
            retries += 1;
            if retries >= ctx.cfg.live_retry_limit {
                exhausted = true;
            }
        }
    }

    Ok(LiveSellFill {
        sold,
        received,
        exhausted,
    })
}

/// Rescale the tracked BUY fills after a Live exit: a near-complete exit
/// zeroes them, a partial one scales each by the unsold fraction.
pub(crate) async fn rescale_tracked_buys(
    ctx: &HandlerCtx<'_>,
    task_id: &str,
    asset: &str,
    sold: f64,
) -> super::Result<()> {
    let tracked = ctx.db.tracked_bought_size(task_id, asset).await?;
    if tracked <= 0.0 {
        return Ok(());
    }

    let sold_fraction = sold / tracked;
    if sold_fraction >= FULL_EXIT_FRACTION {
        ctx.db.zero_tracked_buys(task_id, asset).await?;
    } else {
        ctx.db
            .scale_tracked_buys(task_id, asset, 1.0 - sold_fraction)
            .await?;
    }
    Ok(())
}

async fn handle_live(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own: &Position,
    base_size: f64,
) -> super::Result<HandlerOutcome> {
    let fill = live_sell_tokens(ctx, &activity.asset, base_size).await?;

    if fill.sold > 0.0 {
        rescale_tracked_buys(ctx, &task.id, &activity.asset, fill.sold).await?;

        let realized = fill.received - fill.sold * own.avg_price;
        append_record(
            ctx,
            &TradeRecord::new(
                &task.id,
                &activity.tx_hash,
                TradeSide::Sell,
                &activity.condition_id,
                &activity.asset,
                fill.sold,
                fill.received / fill.sold,
                fill.received,
                realized,
                task.mode.as_str(),
            ),
        )
        .await;

        settle_balance(ctx, task, fill.received).await?;

        if fill.exhausted {
            return Ok(HandlerOutcome::Exhausted {
                fill_size: fill.sold,
                quote_amount: fill.received,
            });
        }
        return Ok(HandlerOutcome::Executed {
            fill_size: fill.sold,
            quote_amount: fill.received,
            realized_pnl: realized,
        });
    }

    if fill.exhausted {
        Ok(HandlerOutcome::Exhausted {
            fill_size: 0.0,
            quote_amount: 0.0,
        })
    } else {
        Ok(HandlerOutcome::Skipped(SkipReason::NoLiquidity))
    }
}
