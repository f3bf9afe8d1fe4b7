//! Backtest engine and day loop.
//!
//! Each simulated day runs strictly in this order:
//!
//! 1. Mark open positions at the day's fill price (open or close).
//! 2. Exit checks in priority order: take-profit/stop-loss from the day's
//!    range, then the holding horizon, then a trend reversal judged on the
//!    previous day's features and regime.
//! 3. Signals from the previous day's features and regime.
//! 4. Rebalance at the day's fill price, subject to the risk budget.
//! 5. Equity snapshot at the close.
//!
//! All state lives in [`EngineState`], which `step_day` consumes and returns.

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::StriderError;
use super::execution::{
    EntryOrder, EntryResult, ExecutionConfig, FillConvention, close_position, intrabar_exit,
    open_position,
};
use super::features::FeatureRow;
use super::market_data::{MarketSnapshot, SymbolData};
use super::ohlcv::OhlcvBar;
use super::portfolio::{EquityPoint, Portfolio};
use super::position::{Direction, ExitReason, Position, Trade};
use super::regime::{MarketRegime, RegimeConfig, classify_series};
use super::risk_budget::{RiskBudgetConfig, RiskBudgetState};
use super::strategy::{FeatureView, Strategy};

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, StriderError> {
        if start >= end {
            return Err(StriderError::ConfigInvalid {
                section: "backtest".into(),
                key: "end_date".into(),
                reason: format!("end {end} must be after start {start}"),
            });
        }
        Ok(DateWindow { start, end })
    }

    /// Window covering `start..=last` inclusive.
    pub fn inclusive(start: NaiveDate, last: NaiveDate) -> Result<Self, StriderError> {
        let end = last.succ_opt().ok_or_else(|| StriderError::ConfigInvalid {
            section: "backtest".into(),
            key: "end_date".into(),
            reason: "end_date out of range".into(),
        })?;
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub execution: ExecutionConfig,
    pub risk: RiskBudgetConfig,
    pub regime: RegimeConfig,
    /// Substitute a flat bar at the last close when a listed symbol is missing a day.
    pub forward_fill_gaps: bool,
    /// Close whatever is still open at the close of the window's last day.
    pub close_at_end: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            execution: ExecutionConfig::default(),
            risk: RiskBudgetConfig::default(),
            regime: RegimeConfig::default(),
            forward_fill_gaps: false,
            close_at_end: true,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), StriderError> {
        let invalid = |key: &str, reason: &str| StriderError::ConfigInvalid {
            section: "backtest".into(),
            key: key.into(),
            reason: reason.into(),
        };
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(invalid("initial_capital", "initial_capital must be positive"));
        }
        let e = &self.execution;
        if e.commission_per_trade < 0.0 || e.commission_pct < 0.0 {
            return Err(invalid("commission_pct", "commissions must be non-negative"));
        }
        if !(0.0..100.0).contains(&e.slippage_pct) {
            return Err(invalid("slippage_pct", "slippage_pct must be within [0, 100)"));
        }
        self.risk.validate()
    }
}

/// A listed symbol with no bar on a simulated day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGap {
    pub symbol: String,
    pub date: NaiveDate,
}

/// Everything carried from one day to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub portfolio: Portfolio,
    pub equity_curve: Vec<EquityPoint>,
    pub risk: RiskBudgetState,
    /// Last observed close per symbol, used for valuation across gaps.
    pub last_close: BTreeMap<String, f64>,
    pub gaps: Vec<DataGap>,
}

impl EngineState {
    pub fn new(initial_capital: f64) -> Self {
        EngineState {
            portfolio: Portfolio::new(initial_capital),
            equity_curve: Vec::new(),
            risk: RiskBudgetState::new(initial_capital),
            last_close: BTreeMap::new(),
            gaps: Vec::new(),
        }
    }

    /// cash + sum(shares * last close) over open positions.
    pub fn equity(&self) -> f64 {
        self.portfolio.total_equity(&self.last_close)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub window: DateWindow,
    pub initial_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub gaps: Vec<DataGap>,
    /// Positions still open when `close_at_end` is off.
    pub open_positions: Vec<Position>,
}

impl BacktestResult {
    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.initial_capital)
    }
}

/// What today's rebalance may trade against.
#[derive(Clone, Copy)]
struct Entries<'d> {
    today: &'d BTreeMap<String, OhlcvBar>,
    marks: &'d BTreeMap<String, f64>,
    /// Symbols closed at an intrabar level today.
    blocked: &'d BTreeSet<String>,
    date: NaiveDate,
    idx: usize,
}

pub struct BacktestEngine<'a> {
    snapshot: &'a MarketSnapshot,
    strategy: &'a dyn Strategy,
    config: &'a BacktestConfig,
    regimes: Vec<MarketRegime>,
}

impl<'a> BacktestEngine<'a> {
    /// Validates parameters and configuration before any day is simulated.
    pub fn new(
        snapshot: &'a MarketSnapshot,
        strategy: &'a dyn Strategy,
        config: &'a BacktestConfig,
    ) -> Result<Self, StriderError> {
        strategy.params().validate()?;
        config.validate()?;
        let regimes = classify_series(
            snapshot.benchmark.as_deref(),
            &snapshot.timeline,
            &config.regime,
        );
        Ok(BacktestEngine {
            snapshot,
            strategy,
            config,
            regimes,
        })
    }

    pub fn regimes(&self) -> &[MarketRegime] {
        &self.regimes
    }

    pub fn initial_state(&self) -> EngineState {
        EngineState::new(self.config.initial_capital)
    }

    pub fn run(&self, window: DateWindow) -> Result<BacktestResult, StriderError> {
        let days: Vec<usize> = self
            .snapshot
            .timeline
            .iter()
            .enumerate()
            .filter(|(_, d)| window.contains(**d))
            .map(|(i, _)| i)
            .collect();
        debug!(
            "{}: simulating {} days in {}",
            self.strategy.name(),
            days.len(),
            window
        );

        let mut state = self.initial_state();
        for &idx in &days {
            state = self.step_day(state, idx)?;
        }
        if self.config.close_at_end {
            if let Some(&last) = days.last() {
                state = self.liquidate(state, last);
            }
        }

        if !state.gaps.is_empty() {
            warn!(
                "{}: {} symbol-days skipped for missing bars in {}",
                self.strategy.name(),
                state.gaps.len(),
                window
            );
        }

        Ok(BacktestResult {
            window,
            initial_capital: self.config.initial_capital,
            trades: state.portfolio.trades,
            equity_curve: state.equity_curve,
            gaps: state.gaps,
            open_positions: state.portfolio.positions.into_values().collect(),
        })
    }

    /// Advances `state` through timeline day `idx`.
    pub fn step_day(&self, mut state: EngineState, idx: usize) -> Result<EngineState, StriderError> {
        let date = *self
            .snapshot
            .timeline
            .get(idx)
            .ok_or_else(|| StriderError::Computation {
                reason: format!("day index {idx} outside timeline"),
            })?;
        let exec = &self.config.execution;
        let fill = exec.fill_convention;

        let today = self.todays_bars(&mut state, date);

        // 1. mark
        let mut marks = state.last_close.clone();
        for (symbol, bar) in &today {
            marks.insert(symbol.clone(), fill.price(bar));
        }

        // 2. exits
        let yesterday = idx
            .checked_sub(1)
            .map(|i| (self.snapshot.timeline[i], self.regimes[i]));
        let held: Vec<String> = state.portfolio.positions.keys().cloned().collect();
        let mut exited_after_fill = BTreeSet::new();
        for symbol in held {
            let Some(bar) = today.get(&symbol) else {
                continue;
            };
            let Some(position) = state.portfolio.get_position(&symbol) else {
                continue;
            };
            let exit = self.exit_for(position, bar, idx, yesterday);
            if let Some((reason, price)) = exit {
                // An intrabar level fill happens after the open, so its
                // proceeds cannot fund an entry at that same open.
                let intrabar = matches!(reason, ExitReason::TakeProfit | ExitReason::StopLoss) && price != bar.open;
                if intrabar && fill == FillConvention::Open {
                    exited_after_fill.insert(symbol.clone());
                }
                close_position(&mut state.portfolio, &symbol, price, date, reason, exec);
            }
        }

        // 3. signals from yesterday, 4. rebalance today
        if let Some((prev_date, prev_regime)) = yesterday {
            let view: FeatureView<'_> = self
                .snapshot
                .symbols
                .iter()
                .filter_map(|(symbol, sd)| {
                    self.features_for(sd, prev_date)
                        .map(|row| (symbol.as_str(), row))
                })
                .collect();
            let scores = self.strategy.generate_signals(&view, prev_regime, prev_date);
            let current = state.portfolio.weights(&marks);
            let targets = self
                .strategy
                .size_positions(&scores, &view, &current, &state.risk);
            let entries = Entries {
                today: &today,
                marks: &marks,
                blocked: &exited_after_fill,
                date,
                idx,
            };
            self.rebalance(&mut state, &targets, &entries);
        }

        // 5. snapshot
        for (symbol, bar) in &today {
            state.last_close.insert(symbol.clone(), bar.close);
        }
        let equity = state.equity();
        if !equity.is_finite() {
            return Err(StriderError::Computation {
                reason: format!("non-finite equity on {date}"),
            });
        }
        state.equity_curve.push(EquityPoint {
            date,
            equity,
            cash: state.portfolio.cash,
        });
        state.risk = state.risk.update(equity, &self.config.risk);
        Ok(state)
    }

    fn exit_for(
        &self,
        position: &Position,
        bar: &OhlcvBar,
        idx: usize,
        yesterday: Option<(NaiveDate, MarketRegime)>,
    ) -> Option<(ExitReason, f64)> {
        let exec = &self.config.execution;
        if let Some(hit) = intrabar_exit(position, bar, exec.tie_break) {
            return Some(hit);
        }
        let fill_price = exec.fill_convention.price(bar);
        if position.holding_days(idx) >= self.strategy.params().holding_horizon {
            return Some((ExitReason::HoldingHorizon, fill_price));
        }
        let (prev_date, prev_regime) = yesterday?;
        let row = self
            .snapshot
            .symbol(&position.symbol)
            .and_then(|sd| self.features_for(sd, prev_date))?;
        self.strategy
            .trend_reversal(position, row, prev_regime)
            .then_some((ExitReason::TrendReversal, fill_price))
    }

    fn rebalance(&self, state: &mut EngineState, targets: &BTreeMap<String, f64>, entries: &Entries<'_>) {
        let exec = &self.config.execution;
        let fill = exec.fill_convention;
        let Entries {
            today,
            marks,
            blocked,
            date,
            idx,
        } = *entries;

        let held: Vec<(String, Direction)> = state
            .portfolio
            .positions
            .values()
            .map(|p| (p.symbol.clone(), p.direction))
            .collect();
        for (symbol, direction) in held {
            let keep = targets
                .get(&symbol)
                .is_some_and(|w| *w != 0.0 && w.signum() == direction.sign());
            if keep {
                continue;
            }
            if let Some(bar) = today.get(&symbol) {
                close_position(
                    &mut state.portfolio,
                    &symbol,
                    fill.price(bar),
                    date,
                    ExitReason::Rebalance,
                    exec,
                );
            }
        }

        let equity = state.portfolio.total_equity(marks);
        let levels = self.strategy.params().exit_levels();
        for (symbol, &weight) in targets {
            if weight == 0.0 || !weight.is_finite() || state.portfolio.has_position(symbol) {
                continue;
            }
            if blocked.contains(symbol) {
                debug!("{symbol}: exited intrabar on {date}, no re-entry at the open");
                continue;
            }
            let Some(bar) = today.get(symbol) else {
                continue;
            };
            let order = EntryOrder {
                symbol,
                direction: if weight > 0.0 {
                    Direction::Long
                } else {
                    Direction::Short
                },
                market_price: fill.price(bar),
                target_value: weight.abs() * equity,
                date,
                index: idx,
                levels,
            };
            match open_position(&mut state.portfolio, &order, exec) {
                EntryResult::Entered { partial: true, .. } => {
                    debug!("{symbol}: partial fill on {date}, cash limited");
                }
                EntryResult::Entered { .. } => {}
                EntryResult::InsufficientCapital => {
                    debug!("{symbol}: no cash for entry on {date}");
                }
                EntryResult::ShortingDisabled => {
                    debug!("{symbol}: short entry ignored, shorting disabled");
                }
            }
        }
    }

    fn liquidate(&self, mut state: EngineState, idx: usize) -> EngineState {
        let date = self.snapshot.timeline[idx];
        let held: Vec<String> = state.portfolio.positions.keys().cloned().collect();
        for symbol in held {
            let price = self
                .snapshot
                .symbol(&symbol)
                .and_then(|sd| sd.get_bar(date))
                .map(|b| b.close)
                .or_else(|| state.last_close.get(&symbol).copied());
            let Some(price) = price else {
                continue;
            };
            close_position(
                &mut state.portfolio,
                &symbol,
                price,
                date,
                ExitReason::EndOfWindow,
                &self.config.execution,
            );
        }

        let equity = state.equity();
        let cash = state.portfolio.cash;
        if let Some(last) = state.equity_curve.last_mut() {
            if last.date == date {
                last.equity = equity;
                last.cash = cash;
            }
        }
        state
    }

    /// Bars available today. Listed symbols without a bar are recorded as
    /// gaps, or filled flat at their last close when forward fill is on.
    fn todays_bars(&self, state: &mut EngineState, date: NaiveDate) -> BTreeMap<String, OhlcvBar> {
        let mut today = BTreeMap::new();
        for (symbol, sd) in &self.snapshot.symbols {
            if let Some(bar) = sd.get_bar(date) {
                today.insert(symbol.clone(), bar.clone());
                continue;
            }
            let listed = sd.first_date().is_some_and(|first| first <= date)
                && sd.last_date().is_some_and(|last| last >= date);
            if !listed {
                continue;
            }
            if self.config.forward_fill_gaps {
                if let Some(close) = sd.latest_close(date) {
                    today.insert(
                        symbol.clone(),
                        OhlcvBar {
                            symbol: symbol.clone(),
                            date,
                            open: close,
                            high: close,
                            low: close,
                            close,
                            volume: 0,
                        },
                    );
                    continue;
                }
            }
            debug!("data gap: {symbol} has no bar on {date}");
            state.gaps.push(DataGap {
                symbol: symbol.clone(),
                date,
            });
        }
        today
    }

    fn features_for<'s>(&self, sd: &'s SymbolData, date: NaiveDate) -> Option<&'s FeatureRow> {
        if self.config.forward_fill_gaps {
            sd.latest_features(date)
        } else {
            sd.get_features(date)
        }
    }
}

/// Builds the engine and runs one window.
pub fn run_backtest(
    snapshot: &MarketSnapshot,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
    window: DateWindow,
) -> Result<BacktestResult, StriderError> {
    BacktestEngine::new(snapshot, strategy, config)?.run(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::{IndicatorSet, compute_features};
    use crate::domain::strategy::{LongTrend, StrategyParams};
    use approx::assert_relative_eq;

    fn d(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(offset)
    }

    fn bars(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| OhlcvBar {
                symbol: symbol.into(),
                date: d(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1000,
            })
            .collect()
    }

    fn snapshot(symbols: Vec<(&str, Vec<OhlcvBar>)>, bench: Vec<OhlcvBar>, rs: usize) -> MarketSnapshot {
        let set = IndicatorSet::new(
            RegimeConfig {
                ma_period: 3,
                slope_lookback: 1,
                adx_period: 2,
                trend_threshold: 0.0,
                confirm_days: 0,
            }
            .required_indicators(),
            rs,
            Some("BENCH".into()),
        );
        let bench_features = compute_features("BENCH", &bench, Some(&bench), &set);
        let data = symbols
            .into_iter()
            .map(|(s, b)| {
                let f = compute_features(s, &b, Some(&bench), &set);
                SymbolData::new(s.into(), b, f)
            })
            .collect();
        MarketSnapshot::new(data, Some(SymbolData::new("BENCH".into(), bench, bench_features)))
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            regime: RegimeConfig {
                ma_period: 3,
                slope_lookback: 1,
                adx_period: 2,
                trend_threshold: 0.0,
                confirm_days: 0,
            },
            risk: RiskBudgetConfig::disabled(),
            ..Default::default()
        }
    }

    fn strategy(horizon: usize, tp: f64) -> LongTrend {
        LongTrend::new(StrategyParams {
            position_count: 1,
            holding_horizon: horizon,
            take_profit_pct: tp,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(DateWindow::new(d(5), d(5)).is_err());
        let w = DateWindow::inclusive(d(0), d(9)).unwrap();
        assert_eq!(w.days(), 10);
        assert!(w.contains(d(9)));
        assert!(!w.contains(d(10)));
    }

    #[test]
    fn invalid_params_fail_before_simulation() {
        let snap = MarketSnapshot::default();
        let bad = StrategyParams {
            holding_horizon: 0,
            ..Default::default()
        };
        struct Raw(StrategyParams);
        impl Strategy for Raw {
            fn name(&self) -> &str {
                "raw"
            }
            fn params(&self) -> &StrategyParams {
                &self.0
            }
            fn direction(&self) -> Direction {
                Direction::Long
            }
            fn required_indicators(&self) -> Vec<crate::domain::indicator::IndicatorType> {
                Vec::new()
            }
            fn generate_signals(
                &self,
                _: &FeatureView<'_>,
                _: MarketRegime,
                _: NaiveDate,
            ) -> BTreeMap<String, f64> {
                BTreeMap::new()
            }
            fn trend_reversal(&self, _: &Position, _: &FeatureRow, _: MarketRegime) -> bool {
                false
            }
        }
        let cfg = config();
        let err = BacktestEngine::new(&snap, &Raw(bad), &cfg).err().unwrap();
        assert!(matches!(err, StriderError::InvalidParams { .. }));
    }

    #[test]
    fn entry_happens_the_day_after_the_signal() {
        let up: Vec<f64> = (0..12).map(|i| 100.0 * 1.02f64.powi(i)).collect();
        let bench: Vec<f64> = (0..12).map(|i| 100.0 + i as f64).collect();
        let snap = snapshot(vec![("AAA", bars("AAA", &up))], bars("BENCH", &bench), 2);
        let s = strategy(100, 0.0);
        let cfg = config();
        let engine = BacktestEngine::new(&snap, &s, &cfg).unwrap();
        let result = engine.run(DateWindow::new(d(0), d(12)).unwrap()).unwrap();

        let first_signal_day = (0..12)
            .find(|&i| {
                engine.regimes()[i] == MarketRegime::TrendingUp
                    && snap.symbol("AAA").unwrap().features[i]
                        .relative_strength
                        .is_some_and(|rs| rs > 0.0)
            })
            .unwrap();
        let trade = &result.trades[0];
        assert_eq!(trade.entry_date, d(first_signal_day as i64 + 1));
        assert_eq!(trade.exit_reason, ExitReason::EndOfWindow);
        assert_eq!(trade.exit_date, d(11));
    }

    #[test]
    fn equity_curve_has_one_point_per_day() {
        let closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();
        let snap = snapshot(vec![("AAA", bars("AAA", &closes))], bars("BENCH", &closes), 2);
        let s = strategy(3, 0.0);
        let cfg = config();
        let result = run_backtest(&snap, &s, &cfg, DateWindow::new(d(2), d(8)).unwrap()).unwrap();
        let dates: Vec<NaiveDate> = result.equity_curve.iter().map(|p| p.date).collect();
        assert_eq!(dates, (2..8).map(d).collect::<Vec<_>>());
        for t in &result.trades {
            assert!(t.entry_date >= d(2) && t.exit_date < d(8));
        }
    }

    #[test]
    fn holding_horizon_forces_exit() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 * 1.03f64.powi(i)).collect();
        let bench: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let snap = snapshot(vec![("AAA", bars("AAA", &up))], bars("BENCH", &bench), 2);
        let s = strategy(4, 0.0);
        let cfg = config();
        let result = run_backtest(&snap, &s, &cfg, DateWindow::new(d(0), d(30)).unwrap()).unwrap();
        let horizon_exits: Vec<&Trade> = result
            .trades
            .iter()
            .filter(|t| t.exit_reason == ExitReason::HoldingHorizon)
            .collect();
        assert!(!horizon_exits.is_empty());
        for t in horizon_exits {
            assert_eq!(t.duration_days(), 4);
        }
    }

    #[test]
    fn missing_bar_is_recorded_as_gap_and_run_continues() {
        let closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();
        let mut aaa = bars("AAA", &closes);
        aaa.remove(5);
        let snap = snapshot(
            vec![("AAA", aaa), ("BBB", bars("BBB", &closes))],
            bars("BENCH", &closes),
            2,
        );
        let s = strategy(100, 0.0);
        let cfg = config();
        let result = run_backtest(&snap, &s, &cfg, DateWindow::new(d(0), d(10)).unwrap()).unwrap();
        assert_eq!(
            result.gaps,
            vec![DataGap {
                symbol: "AAA".into(),
                date: d(5)
            }]
        );
        assert_eq!(result.equity_curve.len(), 10);
    }

    #[test]
    fn forward_fill_removes_gaps() {
        let closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();
        let mut aaa = bars("AAA", &closes);
        aaa.remove(5);
        let snap = snapshot(
            vec![("AAA", aaa), ("BBB", bars("BBB", &closes))],
            bars("BENCH", &closes),
            2,
        );
        let s = strategy(100, 0.0);
        let cfg = BacktestConfig {
            forward_fill_gaps: true,
            ..config()
        };
        let result = run_backtest(&snap, &s, &cfg, DateWindow::new(d(0), d(10)).unwrap()).unwrap();
        assert!(result.gaps.is_empty());
    }

    #[test]
    fn step_day_keeps_equity_identity() {
        let up: Vec<f64> = (0..20).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64).collect();
        let bench: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let snap = snapshot(vec![("AAA", bars("AAA", &up))], bars("BENCH", &bench), 2);
        let s = strategy(3, 2.0);
        let cfg = BacktestConfig {
            execution: ExecutionConfig {
                commission_per_trade: 1.0,
                commission_pct: 0.1,
                slippage_pct: 0.05,
                ..Default::default()
            },
            ..config()
        };
        let engine = BacktestEngine::new(&snap, &s, &cfg).unwrap();
        let mut state = engine.initial_state();
        for idx in 0..20 {
            state = engine.step_day(state, idx).unwrap();
            let marked: f64 = state
                .portfolio
                .positions
                .values()
                .map(|p| p.shares * state.last_close[&p.symbol])
                .sum();
            let point = state.equity_curve.last().unwrap();
            assert_relative_eq!(point.equity, state.portfolio.cash + marked, max_relative = 1e-12);
        }
    }

    #[test]
    fn engine_state_serializes() {
        let state = EngineState::new(1_000.0);
        let json = serde_json::to_string(&state).unwrap();
        let back: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
