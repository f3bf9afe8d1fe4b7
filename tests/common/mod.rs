#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use strider::domain::backtest::BacktestConfig;
use strider::domain::error::StriderError;
use strider::domain::features::{FeatureRow, IndicatorSet, compute_features};
use strider::domain::indicator::IndicatorType;
use strider::domain::market_data::{MarketSnapshot, SymbolData};
pub use strider::domain::ohlcv::OhlcvBar;
use strider::domain::position::{Direction, Position};
use strider::domain::regime::{MarketRegime, RegimeConfig};
use strider::domain::risk_budget::RiskBudgetConfig;
use strider::domain::strategy::{FeatureView, Strategy, StrategyParams};
use strider::ports::data_port::DataPort;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<OhlcvBar>, StriderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(StriderError::Database {
                reason: reason.clone(),
            });
        }
        let bars: Vec<OhlcvBar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(StriderError::DataUnavailable {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, StriderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StriderError> {
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let first = bars.iter().map(|b| b.date).min().unwrap();
                let last = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((first, last, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn day(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(offset)
}

/// Flat intraday bar: open, high, low and close all equal.
pub fn flat_bar(symbol: &str, offset: i64, price: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date: day(offset),
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 10_000,
    }
}

/// `days` consecutive flat bars compounding at `daily_growth` from 100.
pub fn drifting_bars(symbol: &str, days: usize, daily_growth: f64) -> Vec<OhlcvBar> {
    (0..days)
        .map(|i| flat_bar(symbol, i as i64, 100.0 * (1.0 + daily_growth).powi(i as i32)))
        .collect()
}

/// Deterministic zig-zag path with drift, for strategies that need both
/// winners and losers.
pub fn wavy_bars(symbol: &str, days: usize, seed: u32) -> Vec<OhlcvBar> {
    (0..days)
        .map(|i| {
            let t = i as f64;
            let phase = seed as f64 * 0.7;
            let close = 100.0 + 0.05 * t + 4.0 * ((t / 6.0) + phase).sin();
            let open = close - 0.3 * ((t / 3.0) + phase).cos();
            OhlcvBar {
                symbol: symbol.to_string(),
                date: day(i as i64),
                open,
                high: open.max(close) + 0.8,
                low: open.min(close) - 0.8,
                close,
                volume: 5_000,
            }
        })
        .collect()
}

/// Regime settings short enough for small synthetic fixtures.
pub fn fast_regime() -> RegimeConfig {
    RegimeConfig {
        ma_period: 5,
        slope_lookback: 2,
        adx_period: 3,
        trend_threshold: 20.0,
        confirm_days: 0,
    }
}

pub fn plain_config() -> BacktestConfig {
    BacktestConfig {
        initial_capital: 100_000.0,
        risk: RiskBudgetConfig::disabled(),
        regime: fast_regime(),
        ..BacktestConfig::default()
    }
}

/// Builds a snapshot the same way the loader does, without a data port.
pub fn snapshot(
    symbols: Vec<(&str, Vec<OhlcvBar>)>,
    benchmark: Option<(&str, Vec<OhlcvBar>)>,
    indicators: Vec<IndicatorType>,
    rs_period: usize,
    regime: &RegimeConfig,
) -> MarketSnapshot {
    let bench_name = benchmark.as_ref().map(|(name, _)| name.to_string());
    let set = IndicatorSet::new(indicators, rs_period, bench_name);
    let bench_bars = benchmark.as_ref().map(|(_, bars)| bars.clone());

    let data: Vec<SymbolData> = symbols
        .into_iter()
        .map(|(name, bars)| {
            let features = compute_features(name, &bars, bench_bars.as_deref(), &set);
            SymbolData::new(name.to_string(), bars, features)
        })
        .collect();

    let bench = benchmark.map(|(name, bars)| {
        let regime_set = IndicatorSet::new(regime.required_indicators(), 0, None);
        let features = compute_features(name, &bars, None, &regime_set);
        SymbolData::new(name.to_string(), bars, features)
    });

    MarketSnapshot::new(data, bench)
}

/// Scores every symbol with a feature row at 1.0 regardless of regime.
#[derive(Debug, Clone)]
pub struct AlwaysLong {
    pub params: StrategyParams,
}

impl AlwaysLong {
    pub fn new(params: StrategyParams) -> Self {
        Self { params }
    }
}

impl Strategy for AlwaysLong {
    fn name(&self) -> &str {
        "always_long"
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn direction(&self) -> Direction {
        Direction::Long
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        Vec::new()
    }

    fn generate_signals(
        &self,
        features: &FeatureView<'_>,
        _regime: MarketRegime,
        _date: NaiveDate,
    ) -> BTreeMap<String, f64> {
        features.keys().map(|s| (s.to_string(), 1.0)).collect()
    }

    fn trend_reversal(&self, _position: &Position, _features: &FeatureRow, _regime: MarketRegime) -> bool {
        false
    }
}
