//! Fill simulation: slippage, commissions, sizing and exit triggers.
//!
//! All percentages are in percent units (0.1 means 0.1%).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ohlcv::OhlcvBar;
use super::portfolio::Portfolio;
use super::position::{Direction, ExitReason, Position, Trade};

/// Which price of the day entries, rebalances and marks use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillConvention {
    #[default]
    Open,
    Close,
}

impl FillConvention {
    pub fn price(self, bar: &OhlcvBar) -> f64 {
        match self {
            FillConvention::Open => bar.open,
            FillConvention::Close => bar.close,
        }
    }
}

/// Resolution when a bar touches both take-profit and stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// Assume the stop was hit first.
    #[default]
    Conservative,
    /// Assume the take-profit was hit first.
    Optimistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
    pub slippage_pct: f64,
    pub allow_shorting: bool,
    pub whole_shares: bool,
    pub fill_convention: FillConvention,
    pub tie_break: TieBreak,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_per_trade: 0.0,
            commission_pct: 0.0,
            slippage_pct: 0.0,
            allow_shorting: false,
            whole_shares: false,
            fill_convention: FillConvention::Open,
            tie_break: TieBreak::Conservative,
        }
    }
}

/// Per-position exit levels in percent of the entry price; 0 disables.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitLevels {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
}

/// flat_fee + trade_value * pct / 100
pub fn calculate_commission(trade_value: f64, config: &ExecutionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

/// Buying pays up, selling receives less.
pub fn apply_slippage(market_price: f64, buying: bool, slippage_pct: f64) -> f64 {
    if buying {
        market_price * (1.0 + slippage_pct / 100.0)
    } else {
        market_price * (1.0 - slippage_pct / 100.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        shares: f64,
        execution_price: f64,
        commission: f64,
        /// Cash could not fund the full requested notional.
        partial: bool,
    },
    InsufficientCapital,
    ShortingDisabled,
}

pub struct EntryOrder<'a> {
    pub symbol: &'a str,
    pub direction: Direction,
    pub market_price: f64,
    /// Unsigned notional the strategy asked for.
    pub target_value: f64,
    pub date: NaiveDate,
    pub index: usize,
    pub levels: ExitLevels,
}

/// Opens a position, limited by available cash.
///
/// Longs pay `shares * price + commission` out of cash. Shorts receive
/// `shares * price - commission`; cash still caps their size so both sides
/// are funded the same way.
pub fn open_position(
    portfolio: &mut Portfolio,
    order: &EntryOrder<'_>,
    config: &ExecutionConfig,
) -> EntryResult {
    if order.direction == Direction::Short && !config.allow_shorting {
        return EntryResult::ShortingDisabled;
    }

    let buying = order.direction == Direction::Long;
    let execution_price = apply_slippage(order.market_price, buying, config.slippage_pct);
    if execution_price <= 0.0 || order.target_value <= 0.0 {
        return EntryResult::InsufficientCapital;
    }

    let affordable =
        (portfolio.cash - config.commission_per_trade) / (1.0 + config.commission_pct / 100.0);
    let notional = order.target_value.min(affordable);
    if notional <= 0.0 {
        return EntryResult::InsufficientCapital;
    }

    let mut shares = notional / execution_price;
    if config.whole_shares {
        shares = shares.floor();
    }
    if shares <= 0.0 {
        return EntryResult::InsufficientCapital;
    }

    let cost = shares * execution_price;
    let commission = calculate_commission(cost, config);
    let sign = order.direction.sign();
    portfolio.cash -= sign * cost + commission;

    let tp = order.levels.take_profit_pct;
    let sl = order.levels.stop_loss_pct;
    let position = Position {
        symbol: order.symbol.to_string(),
        direction: order.direction,
        entry_date: order.date,
        entry_index: order.index,
        entry_price: execution_price,
        shares: sign * shares,
        take_profit: (tp > 0.0).then(|| execution_price * (1.0 + sign * tp / 100.0)),
        stop_loss: (sl > 0.0).then(|| execution_price * (1.0 - sign * sl / 100.0)),
        entry_commission: commission,
    };
    portfolio.add_position(position);

    EntryResult::Entered {
        shares: sign * shares,
        execution_price,
        commission,
        partial: notional < order.target_value,
    }
}

/// Closes the position at `market_price`, settles cash and appends the trade.
pub fn close_position(
    portfolio: &mut Portfolio,
    symbol: &str,
    market_price: f64,
    exit_date: NaiveDate,
    exit_reason: ExitReason,
    config: &ExecutionConfig,
) -> Option<Trade> {
    let position = portfolio.remove_position(symbol)?;

    let buying_to_cover = position.is_short();
    let exit_price = apply_slippage(market_price, buying_to_cover, config.slippage_pct);
    let exit_value = position.shares.abs() * exit_price;
    let exit_commission = calculate_commission(exit_value, config);

    portfolio.cash += position.shares * exit_price - exit_commission;

    let pnl = position.shares * (exit_price - position.entry_price)
        - position.entry_commission
        - exit_commission;

    let trade = Trade {
        symbol: position.symbol,
        direction: position.direction,
        shares: position.shares,
        entry_date: position.entry_date,
        entry_price: position.entry_price,
        exit_date,
        exit_price,
        exit_reason,
        pnl,
    };
    portfolio.record_trade(trade.clone());
    Some(trade)
}

/// Decides whether the bar hits take-profit or stop-loss and at which price.
///
/// A level the open already gapped through fills at the open. When the bar
/// touches both levels without gapping, `tie_break` decides.
pub fn intrabar_exit(
    position: &Position,
    bar: &OhlcvBar,
    tie_break: TieBreak,
) -> Option<(ExitReason, f64)> {
    let hits_tp = position.touches_take_profit(bar.high, bar.low);
    let hits_sl = position.touches_stop_loss(bar.high, bar.low);

    let tp_fill = position.take_profit.map(|tp| {
        let gapped = match position.direction {
            Direction::Long => bar.open >= tp,
            Direction::Short => bar.open <= tp,
        };
        (gapped, if gapped { bar.open } else { tp })
    });
    let sl_fill = position.stop_loss.map(|sl| {
        let gapped = match position.direction {
            Direction::Long => bar.open <= sl,
            Direction::Short => bar.open >= sl,
        };
        (gapped, if gapped { bar.open } else { sl })
    });

    match (hits_tp, hits_sl, tp_fill, sl_fill) {
        (true, true, Some((tp_gap, tp_px)), Some((sl_gap, sl_px))) => {
            if tp_gap {
                Some((ExitReason::TakeProfit, tp_px))
            } else if sl_gap {
                Some((ExitReason::StopLoss, sl_px))
            } else {
                match tie_break {
                    TieBreak::Conservative => Some((ExitReason::StopLoss, sl_px)),
                    TieBreak::Optimistic => Some((ExitReason::TakeProfit, tp_px)),
                }
            }
        }
        (true, _, Some((_, px)), _) => Some((ExitReason::TakeProfit, px)),
        (_, true, _, Some((_, px))) => Some((ExitReason::StopLoss, px)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn bar(open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "AAA".into(),
            date: date(),
            open,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    fn order(direction: Direction, price: f64, target: f64) -> EntryOrder<'static> {
        EntryOrder {
            symbol: "AAA",
            direction,
            market_price: price,
            target_value: target,
            date: date(),
            index: 0,
            levels: ExitLevels {
                take_profit_pct: 10.0,
                stop_loss_pct: 5.0,
            },
        }
    }

    #[test]
    fn commission_flat_plus_pct() {
        let config = ExecutionConfig {
            commission_per_trade: 10.0,
            commission_pct: 0.1,
            ..Default::default()
        };
        assert_relative_eq!(calculate_commission(10_000.0, &config), 20.0);
    }

    #[test]
    fn slippage_direction() {
        assert_relative_eq!(apply_slippage(100.0, true, 0.5), 100.5);
        assert_relative_eq!(apply_slippage(100.0, false, 0.5), 99.5);
    }

    #[test]
    fn long_entry_debits_cash_and_sets_levels() {
        let mut p = Portfolio::new(10_000.0);
        let config = ExecutionConfig {
            commission_per_trade: 5.0,
            ..Default::default()
        };
        let result = open_position(&mut p, &order(Direction::Long, 100.0, 5_000.0), &config);
        assert!(matches!(result, EntryResult::Entered { partial: false, .. }));
        assert_relative_eq!(p.cash, 4_995.0);
        let pos = p.get_position("AAA").unwrap();
        assert_relative_eq!(pos.shares, 50.0);
        assert_relative_eq!(pos.take_profit.unwrap(), 110.0);
        assert_relative_eq!(pos.stop_loss.unwrap(), 95.0);
    }

    #[test]
    fn entry_is_partially_filled_when_cash_is_short() {
        let mut p = Portfolio::new(1_000.0);
        let result = open_position(
            &mut p,
            &order(Direction::Long, 100.0, 5_000.0),
            &ExecutionConfig::default(),
        );
        match result {
            EntryResult::Entered { shares, partial, .. } => {
                assert!(partial);
                assert_relative_eq!(shares, 10.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(p.cash.abs() < 1e-9);
    }

    #[test]
    fn whole_shares_round_down() {
        let mut p = Portfolio::new(1_000.0);
        let config = ExecutionConfig {
            whole_shares: true,
            ..Default::default()
        };
        open_position(&mut p, &order(Direction::Long, 300.0, 1_000.0), &config);
        assert_relative_eq!(p.get_position("AAA").unwrap().shares, 3.0);
        assert_relative_eq!(p.cash, 100.0);
    }

    #[test]
    fn short_requires_permission() {
        let mut p = Portfolio::new(1_000.0);
        let result = open_position(
            &mut p,
            &order(Direction::Short, 100.0, 500.0),
            &ExecutionConfig::default(),
        );
        assert_eq!(result, EntryResult::ShortingDisabled);
        assert!(p.positions.is_empty());
    }

    #[test]
    fn short_round_trip_settles_cash() {
        let mut p = Portfolio::new(1_000.0);
        let config = ExecutionConfig {
            allow_shorting: true,
            ..Default::default()
        };
        open_position(&mut p, &order(Direction::Short, 100.0, 500.0), &config);
        assert_relative_eq!(p.cash, 1_500.0);
        let pos = p.get_position("AAA").unwrap();
        assert_relative_eq!(pos.shares, -5.0);
        assert_relative_eq!(pos.take_profit.unwrap(), 90.0);
        assert_relative_eq!(pos.stop_loss.unwrap(), 105.0);

        let trade = close_position(&mut p, "AAA", 80.0, date(), ExitReason::TakeProfit, &config)
            .unwrap();
        assert_relative_eq!(trade.pnl, 100.0);
        assert_relative_eq!(p.cash, 1_100.0);
    }

    #[test]
    fn close_records_round_trip_commissions() {
        let mut p = Portfolio::new(10_000.0);
        let config = ExecutionConfig {
            commission_per_trade: 10.0,
            ..Default::default()
        };
        open_position(&mut p, &order(Direction::Long, 100.0, 1_000.0), &config);
        let trade =
            close_position(&mut p, "AAA", 110.0, date(), ExitReason::Rebalance, &config).unwrap();
        assert_relative_eq!(trade.pnl, 100.0 - 20.0);
        assert_relative_eq!(p.cash, 10_000.0 + 80.0);
        assert_eq!(p.trades.len(), 1);
    }

    #[test]
    fn close_missing_position_is_none() {
        let mut p = Portfolio::new(1_000.0);
        let config = ExecutionConfig::default();
        assert!(close_position(&mut p, "ZZZ", 1.0, date(), ExitReason::Rebalance, &config).is_none());
    }

    fn long_position() -> Position {
        Position {
            symbol: "AAA".into(),
            direction: Direction::Long,
            entry_date: date(),
            entry_index: 0,
            entry_price: 100.0,
            shares: 10.0,
            take_profit: Some(110.0),
            stop_loss: Some(95.0),
            entry_commission: 0.0,
        }
    }

    #[test]
    fn take_profit_fills_at_level() {
        let exit = intrabar_exit(&long_position(), &bar(105.0, 112.0, 101.0, 108.0), TieBreak::Conservative);
        assert_eq!(exit, Some((ExitReason::TakeProfit, 110.0)));
    }

    #[test]
    fn gap_through_take_profit_fills_at_open() {
        let exit = intrabar_exit(&long_position(), &bar(115.0, 116.0, 113.0, 114.0), TieBreak::Conservative);
        assert_eq!(exit, Some((ExitReason::TakeProfit, 115.0)));
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let exit = intrabar_exit(&long_position(), &bar(90.0, 111.0, 89.0, 100.0), TieBreak::Optimistic);
        assert_eq!(exit, Some((ExitReason::StopLoss, 90.0)));
    }

    #[test]
    fn same_bar_tie_conservative_takes_stop() {
        let b = bar(100.0, 111.0, 94.0, 100.0);
        assert_eq!(
            intrabar_exit(&long_position(), &b, TieBreak::Conservative),
            Some((ExitReason::StopLoss, 95.0))
        );
        assert_eq!(
            intrabar_exit(&long_position(), &b, TieBreak::Optimistic),
            Some((ExitReason::TakeProfit, 110.0))
        );
    }

    #[test]
    fn quiet_bar_has_no_exit() {
        assert_eq!(
            intrabar_exit(&long_position(), &bar(100.0, 105.0, 96.0, 101.0), TieBreak::Conservative),
            None
        );
    }

    #[test]
    fn fill_convention_picks_price() {
        let b = bar(100.0, 105.0, 96.0, 101.0);
        assert_eq!(FillConvention::Open.price(&b), 100.0);
        assert_eq!(FillConvention::Close.price(&b), 101.0);
    }
}
