//! Order-book fill simulation
//!
//! Walks a depth snapshot and computes the weighted fill a market order
//! would receive: average price, filled size, quote spent/received and the
//! signed slippage against a target price. BUY consumes asks (cheapest
//! first) and enforces a slippage ceiling; SELL consumes bids (highest
//! first) with no ceiling, so liquidations always proceed.

use serde::{Deserialize, Serialize};

/// One price level of an order book snapshot.
///
/// The venue returns prices and sizes as strings; [`BookLevel::price_f64`]
/// and [`BookLevel::size_f64`] convert with a zero fallback so malformed
/// levels are discarded by the depth walk instead of aborting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self {
            price: price.to_string(),
            size: size.to_string(),
        }
    }

    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn size_f64(&self) -> f64 {
        self.size.parse().unwrap_or(0.0)
    }

    /// A level is usable only with strictly positive price and size.
    pub fn is_valid(&self) -> bool {
        self.price_f64() > 0.0 && self.size_f64() > 0.0
    }
}

/// Order book snapshot as served by `/orderbook/{asset}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Highest valid bid, if any.
    pub fn best_bid(&self) -> Option<(f64, f64)> {
        self.bids
            .iter()
            .filter(|l| l.is_valid())
            .map(|l| (l.price_f64(), l.size_f64()))
            .max_by(|a, b| a.0.total_cmp(&b.0))
    }

    /// Lowest valid ask, if any.
    pub fn best_ask(&self) -> Option<(f64, f64)> {
        self.asks
            .iter()
            .filter(|l| l.is_valid())
            .map(|l| (l.price_f64(), l.size_f64()))
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }

    pub fn has_bids(&self) -> bool {
        self.bids.iter().any(|l| l.is_valid())
    }
}

/// Aggregate result of walking the book.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    /// Weighted average execution price.
    pub fill_price: f64,
    /// Tokens acquired (BUY) or disposed (SELL).
    pub fill_size: f64,
    /// Quote spent (BUY) or received (SELL).
    pub quote_amount: f64,
    /// Signed relative gap vs the target price, in percent.
    pub slippage_pct: f64,
}

/// Why a simulated order could not be accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum FillRejection {
    /// No valid level on the relevant side.
    NoLiquidity,
    /// The weighted price strayed beyond the ceiling; carries the fill the
    /// walk would have produced, for diagnostics.
    SlippageExceeded { partial: Fill },
}

impl FillRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            FillRejection::NoLiquidity => "no liquidity",
            FillRejection::SlippageExceeded { .. } => "slippage too high",
        }
    }
}

pub type FillResult = Result<Fill, FillRejection>;

fn signed_slippage_pct(fill_price: f64, target_price: f64) -> f64 {
    if target_price == 0.0 {
        return 0.0;
    }
    (fill_price - target_price) / target_price * 100.0
}

/// Simulate a market BUY of `notional` quote units against the asks.
///
/// Walks levels cheapest-first, consuming `min(remaining, size * price)`
/// quote at each. Partial fills are accepted as long as at least one token
/// was acquired and the weighted price stays within
/// `slippage_limit_pct` of `target_price`.
pub fn simulate_buy(
    book: &OrderBook,
    notional: f64,
    target_price: f64,
    slippage_limit_pct: f64,
) -> FillResult {
    let mut asks: Vec<(f64, f64)> = book
        .asks
        .iter()
        .filter(|l| l.is_valid())
        .map(|l| (l.price_f64(), l.size_f64()))
        .collect();
    asks.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut remaining = notional;
    let mut tokens = 0.0;
    let mut spent = 0.0;

    for (price, size) in asks {
        if remaining <= 0.0 {
            break;
        }
        let level_quote = size * price;
        let take = remaining.min(level_quote);
        tokens += take / price;
        spent += take;
        remaining -= take;
    }

    if tokens == 0.0 {
        return Err(FillRejection::NoLiquidity);
    }

    let fill_price = spent / tokens;
    let slippage_pct = signed_slippage_pct(fill_price, target_price);
    let fill = Fill {
        fill_price,
        fill_size: tokens,
        quote_amount: spent,
        slippage_pct,
    };

    if slippage_pct.abs() > slippage_limit_pct {
        return Err(FillRejection::SlippageExceeded { partial: fill });
    }

    Ok(fill)
}

/// Simulate a market SELL of `tokens` against the bids.
///
/// Walks levels highest-first. There is no slippage ceiling on this side:
/// exits must complete even at adverse prices, so the reported
/// `slippage_pct` is informational only.
pub fn simulate_sell(book: &OrderBook, tokens: f64, target_price: f64) -> FillResult {
    let mut bids: Vec<(f64, f64)> = book
        .bids
        .iter()
        .filter(|l| l.is_valid())
        .map(|l| (l.price_f64(), l.size_f64()))
        .collect();
    bids.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut remaining = tokens;
    let mut sold = 0.0;
    let mut received = 0.0;

    for (price, size) in bids {
        if remaining <= 0.0 {
            break;
        }
        let take = remaining.min(size);
        sold += take;
        received += take * price;
        remaining -= take;
    }

    if sold == 0.0 {
        return Err(FillRejection::NoLiquidity);
    }

    let fill_price = received / sold;
    Ok(Fill {
        fill_price,
        fill_size: sold,
        quote_amount: received,
        slippage_pct: signed_slippage_pct(fill_price, target_price),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBook {
        OrderBook {
            bids: bids.iter().map(|&(p, s)| BookLevel::new(p, s)).collect(),
            asks: asks.iter().map(|&(p, s)| BookLevel::new(p, s)).collect(),
        }
    }

    #[test]
    fn test_buy_single_level() {
        let b = book(&[], &[(0.40, 400.0), (0.41, 1000.0)]);
        let fill = simulate_buy(&b, 100.0, 0.40, 5.0).unwrap();
        assert!((fill.fill_price - 0.40).abs() < 1e-9);
        assert!((fill.fill_size - 250.0).abs() < 1e-9);
        assert!((fill.quote_amount - 100.0).abs() < 1e-9);
        assert!(fill.slippage_pct.abs() < 1e-9);
    }

    #[test]
    fn test_buy_walks_multiple_levels() {
        // 10 tokens at 0.40 (=4.0 quote), rest at 0.50
        let b = book(&[], &[(0.50, 1000.0), (0.40, 10.0)]);
        let fill = simulate_buy(&b, 9.0, 0.45, 25.0).unwrap();
        let tokens = 10.0 + 5.0 / 0.50;
        assert!((fill.fill_size - tokens).abs() < 1e-9);
        assert!((fill.quote_amount - 9.0).abs() < 1e-9);
        // fill_size * fill_price == quote_amount
        assert!((fill.fill_size * fill.fill_price - fill.quote_amount).abs() < 1e-9);
    }

    #[test]
    fn test_buy_rejects_on_slippage() {
        let b = book(&[], &[(0.40, 10.0), (0.60, 1000.0)]);
        let err = simulate_buy(&b, 100.0, 0.40, 5.0).unwrap_err();
        match err {
            FillRejection::SlippageExceeded { partial } => {
                assert!(partial.slippage_pct > 5.0);
                assert!(partial.fill_size > 0.0);
            }
            other => panic!("expected slippage rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_buy_empty_book_is_no_liquidity() {
        let b = book(&[(0.40, 100.0)], &[]);
        assert_eq!(simulate_buy(&b, 50.0, 0.40, 5.0), Err(FillRejection::NoLiquidity));
    }

    #[test]
    fn test_buy_ignores_invalid_levels() {
        let b = book(&[], &[(0.0, 500.0), (-0.1, 500.0), (0.40, 0.0)]);
        assert_eq!(simulate_buy(&b, 50.0, 0.40, 5.0), Err(FillRejection::NoLiquidity));
    }

    #[test]
    fn test_sell_has_no_slippage_ceiling() {
        let b = book(&[(0.10, 1000.0)], &[]);
        let fill = simulate_sell(&b, 40.0, 0.50).unwrap();
        assert!((fill.fill_price - 0.10).abs() < 1e-9);
        assert!((fill.quote_amount - 4.0).abs() < 1e-9);
        // Adverse sell reports negative slippage but still fills.
        assert!(fill.slippage_pct < -75.0);
    }

    #[test]
    fn test_sell_partial_on_thin_book() {
        let b = book(&[(0.50, 25.0)], &[]);
        let fill = simulate_sell(&b, 40.0, 0.50).unwrap();
        assert!((fill.fill_size - 25.0).abs() < 1e-9);
        assert!((fill.quote_amount - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_sell_walks_bids_descending() {
        let b = book(&[(0.45, 10.0), (0.50, 10.0)], &[]);
        let fill = simulate_sell(&b, 15.0, 0.50).unwrap();
        // 10 @ 0.50 then 5 @ 0.45
        assert!((fill.quote_amount - (5.0 + 2.25)).abs() < 1e-9);
        assert!((fill.fill_size - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_best_bid_and_ask() {
        let b = book(&[(0.45, 10.0), (0.50, 10.0)], &[(0.55, 5.0), (0.52, 1.0)]);
        assert_eq!(b.best_bid(), Some((0.50, 10.0)));
        assert_eq!(b.best_ask(), Some((0.52, 1.0)));
    }

    #[test]
    fn test_quote_consistency_round_trip() {
        let b = book(
            &[(0.48, 120.0), (0.46, 300.0), (0.42, 50.0)],
            &[(0.52, 80.0), (0.55, 400.0)],
        );
        let buy = simulate_buy(&b, 150.0, 0.52, 10.0).unwrap();
        assert!((buy.fill_size * buy.fill_price - buy.quote_amount).abs() < 1e-9);
        let sell = simulate_sell(&b, 200.0, 0.48).unwrap();
        assert!((sell.fill_size * sell.fill_price - sell.quote_amount).abs() < 1e-9);
    }
}
