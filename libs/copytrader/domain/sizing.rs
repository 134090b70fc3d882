//! Trade sizing decisions
//!
//! The pure arithmetic behind the handlers: how large a mirrored BUY
//! should be, what share of a holding a SELL liquidates, and what a
//! redemption pays. Everything here is synchronous and deterministic;
//! the handlers wrap it with I/O.

/// Fraction of the available balance a BUY may consume, leaving a
/// safety buffer for fees and rounding.
pub const BALANCE_BUFFER: f64 = 0.99;

/// Why a BUY was not sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuySkip {
    /// Unit price above the cap; no upside left in the bet.
    PriceCap,
    /// Already holding this market; no pyramiding.
    AlreadyHolding,
    /// Capped notional under the venue minimum.
    BelowMinimum,
}

/// Sizing decision for a BUY.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuyPlan {
    Skip(BuySkip),
    Execute { notional: f64 },
}

/// Decide whether and how large to mirror a BUY.
///
/// `available` is `None` when the task does not track cash (Live with no
/// initial snapshot); the fixed amount then stands uncapped.
pub fn plan_buy(
    trade_price: f64,
    own_position_size: f64,
    fixed_amount: f64,
    available: Option<f64>,
    price_cap: f64,
    min_order_usd: f64,
) -> BuyPlan {
    if trade_price > price_cap {
        return BuyPlan::Skip(BuySkip::PriceCap);
    }

    if own_position_size > 0.0 {
        return BuyPlan::Skip(BuySkip::AlreadyHolding);
    }

    let mut notional = fixed_amount;
    if let Some(available) = available {
        notional = notional.min(available * BALANCE_BUFFER);
    }

    if notional < min_order_usd {
        return BuyPlan::Skip(BuySkip::BelowMinimum);
    }

    BuyPlan::Execute { notional }
}

/// Reconstruct how many tokens a mirrored SELL should liquidate.
///
/// The target reports only its own sell size, so its position *before*
/// this sell is rebuilt as its current size plus every still-unprocessed
/// SELL we have queued for the asset (this one included); the trade's
/// size over that total is the fraction to mirror.
///
/// * `target_position`: the target's current position size, `None` when
///   the venue no longer reports one (then we exit completely).
/// * `pending_sells`: total size of unprocessed SELL activities for the
///   asset, the current one included.
/// * `tracked_bought`: Live only, summed acquired quantity across prior
///   BUYs; sizing prefers it because venue snapshots lag our own fills.
pub fn reconstruct_sell_size(
    trade_size: f64,
    target_position: Option<f64>,
    pending_sells: f64,
    own_size: f64,
    tracked_bought: Option<f64>,
) -> f64 {
    let Some(target_now) = target_position else {
        return own_size;
    };

    let target_before = target_now + pending_sells;
    if target_before <= 0.0 {
        return own_size;
    }

    let ratio = trade_size / target_before;
    let base = match tracked_bought {
        Some(tracked) if tracked > 0.0 => tracked * ratio,
        _ => own_size * ratio,
    };

    base.min(own_size)
}

/// Payout and realized PnL for redeeming a holding:
/// `(size × ratio, size × ratio − size × avg_price)`.
pub fn redeem_figures(size: f64, payout_ratio: f64, avg_price: f64) -> (f64, f64) {
    let value = size * payout_ratio;
    (value, value - size * avg_price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_rejects_price_above_cap() {
        let plan = plan_buy(0.995, 0.0, 100.0, Some(1000.0), 0.99, 1.0);
        assert_eq!(plan, BuyPlan::Skip(BuySkip::PriceCap));
    }

    #[test]
    fn test_plan_rejects_pyramiding() {
        let plan = plan_buy(0.40, 25.0, 100.0, Some(1000.0), 0.99, 1.0);
        assert_eq!(plan, BuyPlan::Skip(BuySkip::AlreadyHolding));
    }

    #[test]
    fn test_plan_caps_by_balance_with_buffer() {
        let plan = plan_buy(0.40, 0.0, 100.0, Some(50.0), 0.99, 1.0);
        match plan {
            BuyPlan::Execute { notional } => assert!((notional - 49.5).abs() < 1e-9),
            other => panic!("expected execute, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_uses_fixed_amount_when_funded() {
        let plan = plan_buy(0.40, 0.0, 100.0, Some(1000.0), 0.99, 1.0);
        assert_eq!(plan, BuyPlan::Execute { notional: 100.0 });
    }

    #[test]
    fn test_plan_rejects_dust_notional() {
        let plan = plan_buy(0.40, 0.0, 100.0, Some(0.5), 0.99, 1.0);
        assert_eq!(plan, BuyPlan::Skip(BuySkip::BelowMinimum));
    }

    #[test]
    fn test_plan_without_balance_tracking_is_uncapped() {
        let plan = plan_buy(0.40, 0.0, 100.0, None, 0.99, 1.0);
        assert_eq!(plan, BuyPlan::Execute { notional: 100.0 });
    }

    #[test]
    fn test_partial_sell_ratio() {
        // Target held 100 (60 now + this 40-token sell pending), sells 40.
        let size = reconstruct_sell_size(40.0, Some(60.0), 40.0, 100.0, None);
        assert!((size - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_queued_full_exit_reconstruction() {
        // Two queued sells of 60 then 40; target already reports 0.
        let first = reconstruct_sell_size(60.0, Some(0.0), 100.0, 100.0, None);
        assert!((first - 60.0).abs() < 1e-9);

        let second = reconstruct_sell_size(40.0, Some(0.0), 40.0, 40.0, None);
        assert!((second - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_absent_target_sells_everything() {
        let size = reconstruct_sell_size(10.0, None, 10.0, 73.5, None);
        assert!((size - 73.5).abs() < 1e-9);
    }

    #[test]
    fn test_tracked_bought_drives_live_sizing() {
        // We actually acquired 50 tokens even though the venue snapshot
        // says 80; sizing follows what we bought.
        let size = reconstruct_sell_size(40.0, Some(60.0), 40.0, 80.0, Some(50.0));
        assert!((size - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_tracked_falls_back_to_position() {
        let size = reconstruct_sell_size(40.0, Some(60.0), 40.0, 80.0, Some(0.0));
        assert!((size - 32.0).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_to_own_holding() {
        let size = reconstruct_sell_size(90.0, Some(10.0), 90.0, 30.0, None);
        assert!((size - 27.0).abs() < 1e-9);

        // Ratio above 1 cannot sell more than we hold.
        let size = reconstruct_sell_size(200.0, Some(0.0), 100.0, 30.0, None);
        assert!((size - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_reconstruction_exits_fully() {
        let size = reconstruct_sell_size(5.0, Some(0.0), 0.0, 12.0, None);
        assert!((size - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_winning_redeem_figures() {
        let (value, realized) = redeem_figures(200.0, 1.0, 0.35);
        assert!((value - 200.0).abs() < 1e-9);
        assert!((realized - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_losing_redeem_figures() {
        let (value, realized) = redeem_figures(100.0, 0.0, 0.40);
        assert_eq!(value, 0.0);
        assert!((realized + 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_payout_figures() {
        let (value, realized) = redeem_figures(50.0, 0.5, 0.30);
        assert!((value - 25.0).abs() < 1e-9);
        assert!((realized - 10.0).abs() < 1e-9);
    }
}
