//! Portfolio state and equity tracking.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::position::{Position, Trade};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
}

/// Cash, open positions and the append-only trade ledger.
///
/// Short sales credit their proceeds to cash, so equity is always
/// `cash + sum(shares * mark)` with signed shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    pub trades: Vec<Trade>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn remove_position(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    /// Equity at the given marks. Positions without a mark are valued at
    /// their entry price.
    pub fn total_equity(&self, marks: &BTreeMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| {
                let price = marks.get(&pos.symbol).copied().unwrap_or(pos.entry_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }

    /// Signed fraction of equity held in each position.
    pub fn weights(&self, marks: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let equity = self.total_equity(marks);
        if equity <= 0.0 {
            return BTreeMap::new();
        }
        self.positions
            .values()
            .map(|pos| {
                let price = marks.get(&pos.symbol).copied().unwrap_or(pos.entry_price);
                (pos.symbol.clone(), pos.market_value(price) / equity)
            })
            .collect()
    }
}
