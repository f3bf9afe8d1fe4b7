//! Open positions and closed trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    HoldingHorizon,
    TrendReversal,
    Rebalance,
    EndOfWindow,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::HoldingHorizon => "holding_horizon",
            ExitReason::TrendReversal => "trend_reversal",
            ExitReason::Rebalance => "rebalance",
            ExitReason::EndOfWindow => "end_of_window",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "take_profit" => Ok(ExitReason::TakeProfit),
            "stop_loss" => Ok(ExitReason::StopLoss),
            "holding_horizon" => Ok(ExitReason::HoldingHorizon),
            "trend_reversal" => Ok(ExitReason::TrendReversal),
            "rebalance" => Ok(ExitReason::Rebalance),
            "end_of_window" => Ok(ExitReason::EndOfWindow),
            other => Err(format!("unknown exit reason '{other}'")),
        }
    }
}

/// An open holding. Only the engine creates, mutates and closes positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: Direction,
    pub entry_date: NaiveDate,
    /// Timeline index of the entry day, used for the holding horizon.
    pub entry_index: usize,
    pub entry_price: f64,
    /// Signed: negative for shorts.
    pub shares: f64,
    pub take_profit: Option<f64>,
    pub stop_loss: Option<f64>,
    pub entry_commission: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    /// Signed mark-to-market value. Short positions carry negative value
    /// because their sale proceeds already sit in cash.
    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares * (price - self.entry_price)
    }

    /// True when the bar's range reaches the take-profit level.
    pub fn touches_take_profit(&self, high: f64, low: f64) -> bool {
        match (self.take_profit, self.direction) {
            (Some(tp), Direction::Long) => high >= tp,
            (Some(tp), Direction::Short) => low <= tp,
            (None, _) => false,
        }
    }

    /// True when the bar's range reaches the stop-loss level.
    pub fn touches_stop_loss(&self, high: f64, low: f64) -> bool {
        match (self.stop_loss, self.direction) {
            (Some(sl), Direction::Long) => low <= sl,
            (Some(sl), Direction::Short) => high >= sl,
            (None, _) => false,
        }
    }

    pub fn holding_days(&self, today_index: usize) -> usize {
        today_index.saturating_sub(self.entry_index)
    }
}

/// A closed position. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub direction: Direction,
    pub shares: f64,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Net of entry and exit commissions.
    pub pnl: f64,
}

impl Trade {
    pub fn duration_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(direction: Direction, shares: f64) -> Position {
        Position {
            symbol: "AAA".into(),
            direction,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            entry_index: 10,
            entry_price: 100.0,
            shares,
            take_profit: Some(if direction == Direction::Long { 110.0 } else { 90.0 }),
            stop_loss: Some(if direction == Direction::Long { 95.0 } else { 105.0 }),
            entry_commission: 0.0,
        }
    }

    #[test]
    fn market_value_is_signed() {
        assert_eq!(position(Direction::Long, 10.0).market_value(50.0), 500.0);
        assert_eq!(position(Direction::Short, -10.0).market_value(50.0), -500.0);
    }

    #[test]
    fn unrealized_pnl_short_profit() {
        let pos = position(Direction::Short, -10.0);
        assert!((pos.unrealized_pnl(90.0) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn long_triggers() {
        let pos = position(Direction::Long, 10.0);
        assert!(pos.touches_take_profit(110.0, 100.0));
        assert!(!pos.touches_take_profit(109.9, 100.0));
        assert!(pos.touches_stop_loss(105.0, 95.0));
        assert!(!pos.touches_stop_loss(105.0, 95.1));
    }

    #[test]
    fn short_triggers_are_mirrored() {
        let pos = position(Direction::Short, -10.0);
        assert!(pos.touches_take_profit(100.0, 90.0));
        assert!(pos.touches_stop_loss(105.0, 100.0));
        assert!(!pos.touches_stop_loss(104.0, 100.0));
    }

    #[test]
    fn disabled_levels_never_trigger() {
        let mut pos = position(Direction::Long, 10.0);
        pos.take_profit = None;
        pos.stop_loss = None;
        assert!(!pos.touches_take_profit(1e9, 0.0));
        assert!(!pos.touches_stop_loss(1e9, 0.0));
    }

    #[test]
    fn holding_days_counts_timeline_steps() {
        let pos = position(Direction::Long, 10.0);
        assert_eq!(pos.holding_days(15), 5);
        assert_eq!(pos.holding_days(3), 0);
    }
}
