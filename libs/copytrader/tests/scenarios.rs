//! End-to-end scenarios over the pure trading core: sizing decisions,
//! book simulation and exit accounting, composed exactly as the handlers
//! compose them.

use copytrader::domain::{
    plan_buy, reconstruct_sell_size, redeem_figures, simulate_buy, simulate_sell, BookLevel,
    BuyPlan, FillRejection, OrderBook, Position,
};

const SLIPPAGE_LIMIT_BUY: f64 = 5.0;
const PRICE_CAP_BUY: f64 = 0.99;
const MIN_ORDER_USD: f64 = 1.0;

fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
    OrderBook {
        bids: bids.iter().map(|&(p, s)| BookLevel::new(p, s)).collect(),
        asks: asks.iter().map(|&(p, s)| BookLevel::new(p, s)).collect(),
    }
}

fn planned_notional(plan: BuyPlan) -> f64 {
    match plan {
        BuyPlan::Execute { notional } => notional,
        other => panic!("expected an executable plan, got {:?}", other),
    }
}

#[test]
fn scenario_simple_copy_buy() {
    // Mock task: fixed 100, balance 1000. Target buys 250 @ 0.40.
    let mut balance = 1000.0;
    let plan = plan_buy(0.40, 0.0, 100.0, Some(balance), PRICE_CAP_BUY, MIN_ORDER_USD);
    let notional = planned_notional(plan);
    assert!((notional - 100.0).abs() < 1e-9);

    let depth = book(&[], &[(0.40, 400.0), (0.41, 1000.0)]);
    let fill = simulate_buy(&depth, notional, 0.40, SLIPPAGE_LIMIT_BUY).unwrap();

    let position = Position::from_buy("t1", "asset1", "0xc1", fill.fill_size, fill.fill_price, fill.quote_amount);
    balance -= fill.quote_amount;

    assert!((position.size - 250.0).abs() < 1e-9);
    assert!((position.avg_price - 0.40).abs() < 1e-9);
    assert!((position.total_bought - 100.0).abs() < 1e-9);
    assert!((balance - 900.0).abs() < 1e-9);
}

#[test]
fn scenario_slippage_rejection() {
    // Thin top of book: 10 tokens at 0.40, the rest at 0.60.
    let balance = 1000.0;
    let notional = planned_notional(plan_buy(
        0.40,
        0.0,
        100.0,
        Some(balance),
        PRICE_CAP_BUY,
        MIN_ORDER_USD,
    ));

    let depth = book(&[], &[(0.40, 10.0), (0.60, 1000.0)]);
    let rejection = simulate_buy(&depth, notional, 0.40, SLIPPAGE_LIMIT_BUY).unwrap_err();

    match rejection {
        FillRejection::SlippageExceeded { partial } => {
            assert!(partial.slippage_pct > SLIPPAGE_LIMIT_BUY);
        }
        other => panic!("expected slippage rejection, got {:?}", other),
    }
    // No position, no balance movement.
    assert!((balance - 1000.0).abs() < 1e-9);
}

#[test]
fn scenario_partial_sell() {
    // Own position: 100 tokens @ 0.30. Target sells 40 out of a
    // reconstructed 100 (60 still held + this 40 pending).
    let own = Position::from_buy("t1", "asset2", "0xc2", 100.0, 0.30, 30.0);
    let mut balance = 0.0;

    let base = reconstruct_sell_size(40.0, Some(60.0), 40.0, own.size, None);
    assert!((base - 40.0).abs() < 1e-9);

    let depth = book(&[(0.50, 1000.0)], &[]);
    let fill = simulate_sell(&depth, base, 0.50).unwrap();
    assert!((fill.fill_price - 0.50).abs() < 1e-9);
    assert!((fill.quote_amount - 20.0).abs() < 1e-9);

    let realized = fill.quote_amount - fill.fill_size * own.avg_price;
    assert!((realized - 8.0).abs() < 1e-9);

    let residual = own.size - fill.fill_size;
    let total_bought = own.total_bought - fill.fill_size * own.avg_price;
    balance += fill.quote_amount;

    assert!((residual - 60.0).abs() < 1e-9);
    assert!((total_bought - 18.0).abs() < 1e-9);
    assert!((balance - 20.0).abs() < 1e-9);
}

#[test]
fn scenario_full_exit_with_pending_queue() {
    // Own position: 100 tokens @ 0.20. Two queued sells (60, then 40);
    // the target already reports zero.
    let mut own_size = 100.0;

    // First leg: pending = 60 + 40, reconstructed before-size 100.
    let first = reconstruct_sell_size(60.0, Some(0.0), 100.0, own_size, None);
    assert!((first - 60.0).abs() < 1e-9);
    own_size -= first;

    // Second leg: only itself pending now.
    let second = reconstruct_sell_size(40.0, Some(0.0), 40.0, own_size, None);
    assert!((second - 40.0).abs() < 1e-9);
    own_size -= second;

    // Emptied: the ledger deletes residuals this small.
    assert!(own_size.abs() < 0.01);
}

#[test]
fn scenario_redeem_winning_position() {
    // 200 tokens @ 0.35 in a market that resolved to payout 1.
    let (value, realized) = redeem_figures(200.0, 1.0, 0.35);
    assert!((value - 200.0).abs() < 1e-9);
    assert!((realized - 130.0).abs() < 1e-9);

    let mut balance = 0.0;
    balance += value;
    assert!((balance - 200.0).abs() < 1e-9);
}

#[test]
fn scenario_reconciler_force_close() {
    // Orphan: 50 tokens @ 0.40 the target no longer holds. Forced close
    // sells at best bid with no slippage cap.
    let own = Position::from_buy("t1", "asset5", "0xc5", 50.0, 0.40, 20.0);
    let depth = book(&[(0.45, 1000.0)], &[]);

    let best_bid = depth.best_bid().map(|(price, _)| price).unwrap();
    let fill = simulate_sell(&depth, own.size, best_bid).unwrap();

    let realized = fill.quote_amount - fill.fill_size * own.avg_price;
    assert!((fill.quote_amount - 22.5).abs() < 1e-9);
    assert!((realized - 2.5).abs() < 1e-9);

    // Whole holding gone.
    assert!((own.size - fill.fill_size).abs() < 1e-9);
}

#[test]
fn buy_below_minimum_never_creates_a_position() {
    // Balance so low the capped notional is dust.
    let plan = plan_buy(0.40, 0.0, 100.0, Some(0.90), PRICE_CAP_BUY, MIN_ORDER_USD);
    assert!(matches!(plan, BuyPlan::Skip(_)));
}

#[test]
fn buy_above_price_cap_never_creates_a_position() {
    let plan = plan_buy(0.995, 0.0, 100.0, Some(1000.0), PRICE_CAP_BUY, MIN_ORDER_USD);
    assert!(matches!(plan, BuyPlan::Skip(_)));
}

#[test]
fn fill_quote_consistency_holds_across_books() {
    let books = [
        book(&[(0.48, 120.0)], &[(0.52, 80.0), (0.55, 400.0)]),
        book(&[(0.10, 5.0), (0.09, 5000.0)], &[(0.11, 5.0), (0.90, 10.0)]),
        book(&[(0.99, 1.0)], &[(0.995, 1.0)]),
    ];

    for depth in &books {
        if let Ok(fill) = simulate_buy(depth, 37.0, 0.5, 1e9) {
            assert!((fill.fill_size * fill.fill_price - fill.quote_amount).abs() < 1e-9);
        }
        if let Ok(fill) = simulate_sell(depth, 42.0, 0.5) {
            assert!((fill.fill_size * fill.fill_price - fill.quote_amount).abs() < 1e-9);
        }
    }
}

#[test]
fn slippage_sign_matches_direction() {
    // Buying through a rising book fills above target: positive slippage.
    let depth = book(&[(0.30, 100.0)], &[(0.50, 100.0)]);
    let buy = simulate_buy(&depth, 10.0, 0.40, 1e9).unwrap();
    assert!(buy.slippage_pct > 0.0);

    // Selling into lower bids fills below target: negative slippage.
    let sell = simulate_sell(&depth, 10.0, 0.40).unwrap();
    assert!(sell.slippage_pct < 0.0);
}

#[test]
fn mock_cash_conservation_over_a_round_trip() {
    // Buy then fully exit on a deterministic book; cash + realized PnL
    // must add up against the initial balance.
    let initial = 500.0;
    let mut balance = initial;

    let notional = planned_notional(plan_buy(
        0.40,
        0.0,
        100.0,
        Some(balance),
        PRICE_CAP_BUY,
        MIN_ORDER_USD,
    ));
    let entry = simulate_buy(&book(&[], &[(0.40, 1000.0)]), notional, 0.40, SLIPPAGE_LIMIT_BUY)
        .unwrap();
    balance -= entry.quote_amount;

    let exit = simulate_sell(&book(&[(0.44, 1000.0)], &[]), entry.fill_size, 0.44).unwrap();
    let realized = exit.quote_amount - exit.fill_size * entry.fill_price;
    balance += exit.quote_amount;

    // No open positions remain, so balance == initial + realized PnL.
    assert!((balance - (initial + realized)).abs() < 1e-9);
}
