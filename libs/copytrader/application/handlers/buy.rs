//! BUY handlers
//!
//! Mirror a target BUY with a fixed notional, capped by the available
//! balance. Mock fills come from the book simulator; Live fills come from
//! a bounded fill-or-kill loop against the live best ask.

use tracing::{debug, warn};

use super::{append_record, settle_balance, HandlerCtx, HandlerOutcome, SkipReason};
use crate::domain::{
    plan_buy, simulate_buy, BuyPlan, BuySkip, FillRejection, Position, StoredActivity, Task,
    TaskMode, TradeRecord, TradeSide,
};
use crate::infrastructure::client::{OrderArgs, OrderSide, OrderType};

fn skip_reason(skip: BuySkip) -> SkipReason {
    match skip {
        BuySkip::PriceCap => SkipReason::PriceCapExceeded,
        BuySkip::AlreadyHolding => SkipReason::AlreadyHolding,
        BuySkip::BelowMinimum => SkipReason::BelowMinimumNotional,
    }
}

/// Simulated BUY against the current depth snapshot.
pub(crate) async fn handle_mock(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own_position: Option<Position>,
) -> super::Result<HandlerOutcome> {
    let own_size = own_position.map(|p| p.size).unwrap_or(0.0);
    let plan = plan_buy(
        activity.price,
        own_size,
        task.fixed_amount,
        Some(task.current_balance),
        ctx.cfg.price_cap_buy,
        ctx.cfg.min_order_usd,
    );

    let notional = match plan {
        BuyPlan::Skip(skip) => return Ok(HandlerOutcome::Skipped(skip_reason(skip))),
        BuyPlan::Execute { notional } => notional,
    };

    let book = ctx.clob.order_book(&activity.asset).await?;
    let fill = match simulate_buy(
        &book,
        notional,
        activity.price,
        ctx.cfg.slippage_pct_limit_buy,
    ) {
        Ok(fill) => fill,
        Err(FillRejection::NoLiquidity) => {
            return Ok(HandlerOutcome::Skipped(SkipReason::NoLiquidity))
        }
        Err(FillRejection::SlippageExceeded { partial }) => {
            debug!(
                tx_hash = %activity.tx_hash,
                would_fill = partial.fill_size,
                slippage_pct = partial.slippage_pct,
                "BUY rejected on slippage"
            );
            return Ok(HandlerOutcome::Skipped(SkipReason::SlippageTooHigh));
        }
    };

    let position = Position::from_buy(
        &task.id,
        &activity.asset,
        &activity.condition_id,
        fill.fill_size,
        fill.fill_price,
        fill.quote_amount,
    )
    .with_market_meta(
        &activity.title,
        &activity.slug,
        &activity.outcome,
        activity.outcome_index,
    );
    ctx.ledger.upsert(&position).await?;

    ctx.db
        .set_my_bought_size(activity.id, fill.fill_size)
        .await?;

    append_record(
        ctx,
        &TradeRecord::new(
            &task.id,
            &activity.tx_hash,
            TradeSide::Buy,
            &activity.condition_id,
            &activity.asset,
            fill.fill_size,
            fill.fill_price,
            fill.quote_amount,
            0.0,
            task.mode.as_str(),
        ),
    )
    .await;

    settle_balance(ctx, task, -fill.quote_amount).await?;

    Ok(HandlerOutcome::Executed {
        fill_size: fill.fill_size,
        quote_amount: fill.quote_amount,
        realized_pnl: 0.0,
    })
}

/// How the Live fill loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    /// Remaining notional fell under the minimum, or nothing left to do.
    Finished,
    /// Best ask drifted past the absolute guard before any further fill.
    SlippageGuard,
    /// No usable ask on the book.
    NoAsk,
    /// Venue reported missing funds or allowance.
    FundsExhausted,
    /// Consecutive placement failures drained the retry budget.
    RetriesExhausted,
}

struct LiveBuyFill {
    tokens: f64,
    spent: f64,
    end: LoopEnd,
}

async fn live_buy_notional(
    ctx: &HandlerCtx<'_>,
    asset: &str,
    target_price: f64,
    notional: f64,
) -> super::Result<LiveBuyFill> {
    let mut remaining = notional;
    let mut tokens = 0.0;
    let mut spent = 0.0;
    let mut retries = 0u32;
    let mut end = LoopEnd::Finished;

    while retries < ctx.cfg.live_retry_limit {
        if remaining < ctx.cfg.min_order_usd {
            end = LoopEnd::Finished;
            break;
        }

        let book = ctx.clob.order_book(asset).await?;
        let Some((best_price, best_size)) = book.best_ask() else {
            end = LoopEnd::NoAsk;
            break;
        };

        if best_price > target_price + ctx.cfg.live_slippage_guard_abs {
            end = LoopEnd::SlippageGuard;
            break;
        }

        let order_quote = remaining.min(best_size * best_price);
        let order_size = order_quote / best_price;

        let placement = ctx
            .clob
            .submit_order(&OrderArgs {
                token_id: asset.to_string(),
                price: best_price,
                size: order_size,
                side: OrderSide::Buy,
                order_type: OrderType::FOK,
            })
            .await?;

        if placement.success {
            tokens += order_size;
            spent += order_quote;
            remaining -= order_quote;
            retries = 0;
        } else if placement.is_insufficient_funds() {
            warn!(asset, "Live BUY stopped: insufficient funds/allowance");
            end = LoopEnd::FundsExhausted;
            break;
        } else {
            retries += 1;
            if retries >= ctx.cfg.live_retry_limit {
                end = LoopEnd::RetriesExhausted;
            }
        }
    }

    Ok(LiveBuyFill { tokens, spent, end })
}

/// Live BUY: real fill-or-kill orders against the venue.
pub(crate) async fn handle_live(
    ctx: &HandlerCtx<'_>,
    task: &mut Task,
    activity: &StoredActivity,
    own_position: Option<Position>,
) -> super::Result<HandlerOutcome> {
    // The venue snapshot lags fresh fills; an earlier completed BUY in
    // this market means the position just isn't visible yet.
    if ctx
        .db
        .has_recent_filled_buy(&task.id, &activity.condition_id)
        .await?
    {
        return Ok(HandlerOutcome::Skipped(SkipReason::RecentBuyPending));
    }

    let TaskMode::Live {
        ref operator_wallet,
        ..
    } = task.mode
    else {
        return Ok(HandlerOutcome::Skipped(SkipReason::NoPosition));
    };

    let balance = ctx.settlement.quote_balance(operator_wallet).await?;

    let own_size = own_position.map(|p| p.size).unwrap_or(0.0);
    let plan = plan_buy(
        activity.price,
        own_size,
        task.fixed_amount,
        Some(balance),
        ctx.cfg.price_cap_buy,
        ctx.cfg.min_order_usd,
    );

    let notional = match plan {
        BuyPlan::Skip(skip) => return Ok(HandlerOutcome::Skipped(skip_reason(skip))),
        BuyPlan::Execute { notional } => notional,
    };

    let fill = live_buy_notional(ctx, &activity.asset, activity.price, notional).await?;

    if fill.tokens > 0.0 {
        // The acquired quantity drives later proportional SELLs; persist
        // it before the activity leaves the claimed state.
        ctx.db.set_my_bought_size(activity.id, fill.tokens).await?;

        append_record(
            ctx,
            &TradeRecord::new(
                &task.id,
                &activity.tx_hash,
                TradeSide::Buy,
                &activity.condition_id,
                &activity.asset,
                fill.tokens,
                fill.spent / fill.tokens,
                fill.spent,
                0.0,
                task.mode.as_str(),
            ),
        )
        .await;

        settle_balance(ctx, task, -fill.spent).await?;
    }

    let outcome = match fill.end {
        LoopEnd::FundsExhausted | LoopEnd::RetriesExhausted => HandlerOutcome::Exhausted {
            fill_size: fill.tokens,
            quote_amount: fill.spent,
        },
        _ if fill.tokens > 0.0 => HandlerOutcome::Executed {
            fill_size: fill.tokens,
            quote_amount: fill.spent,
            realized_pnl: 0.0,
        },
        LoopEnd::SlippageGuard => HandlerOutcome::Skipped(SkipReason::SlippageTooHigh),
        _ => HandlerOutcome::Skipped(SkipReason::NoLiquidity),
    };
    Ok(outcome)
}
