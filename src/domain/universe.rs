//! Symbol universe parsing and market snapshot loading.
//!
//! Bars and feature rows for every symbol are loaded in full before a
//! simulation starts. Loading reaches back before the requested window far
//! enough to cover indicator warmup, so early window days see real values.

use chrono::{Days, NaiveDate};
use log::{info, warn};
use std::collections::HashSet;

use crate::domain::backtest::DateWindow;
use crate::domain::error::StriderError;
use crate::domain::features::IndicatorSet;
use crate::domain::indicator::IndicatorType;
use crate::domain::market_data::{MarketSnapshot, SymbolData};
use crate::domain::regime::RegimeConfig;
use crate::domain::strategy::Strategy;
use crate::ports::data_port::DataPort;
use crate::ports::feature_cache_port::FeatureCachePort;

/// Extra calendar days fetched on top of the trading-day warmup.
const WARMUP_PADDING_DAYS: u64 = 10;

fn symbols_error(reason: String) -> StriderError {
    StriderError::ConfigInvalid {
        section: "universe".into(),
        key: "symbols".into(),
        reason,
    }
}

/// Splits a comma list into upper-cased symbols, rejecting empty entries
/// and repeats.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, StriderError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(symbols_error("empty token in symbol list".into()));
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(symbols_error(format!("duplicate symbol: {symbol}")));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// Union of the indicators every strategy reads.
pub fn required_indicators(strategies: &[Box<dyn Strategy>]) -> Vec<IndicatorType> {
    let mut all: Vec<IndicatorType> = strategies
        .iter()
        .flat_map(|s| s.required_indicators())
        .collect();
    all.sort();
    all.dedup();
    all
}

/// Calendar date far enough before `start` to hold `lookback` trading days.
pub fn warmup_start(start: NaiveDate, lookback: usize) -> NaiveDate {
    let days = lookback as u64 * 7 / 5 + WARMUP_PADDING_DAYS;
    start.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug)]
pub struct LoadedUniverse {
    pub snapshot: MarketSnapshot,
    pub skipped: Vec<SkippedSymbol>,
}

impl LoadedUniverse {
    pub fn symbols(&self) -> Vec<String> {
        self.snapshot.symbols.keys().cloned().collect()
    }
}

pub struct UniverseLoader<'a> {
    data: &'a dyn DataPort,
    cache: &'a dyn FeatureCachePort,
}

impl<'a> UniverseLoader<'a> {
    pub fn new(data: &'a dyn DataPort, cache: &'a dyn FeatureCachePort) -> Self {
        Self { data, cache }
    }

    fn load_symbol(&self, symbol: &str, range: DateWindow, set: &IndicatorSet) -> Result<SymbolData, StriderError> {
        let last = range.end.pred_opt().unwrap_or(range.end);
        let bars = self.data.fetch(symbol, range.start, last)?;
        let features = self.cache.get_or_compute(symbol, range, set)?;
        if features.len() != bars.len() {
            return Err(StriderError::DataIntegrity {
                symbol: symbol.to_string(),
                reason: format!("{} feature rows for {} bars", features.len(), bars.len()),
            });
        }
        Ok(SymbolData::new(symbol.to_string(), bars, (*features).clone()))
    }

    /// Loads `symbols` and the optional benchmark over `window` plus warmup.
    ///
    /// Symbols without data are skipped with a warning. Fails when no symbol
    /// has data or when a configured benchmark has none.
    pub fn load(
        &self,
        symbols: &[String],
        benchmark: Option<&str>,
        window: DateWindow,
        set: &IndicatorSet,
        regime: &RegimeConfig,
    ) -> Result<LoadedUniverse, StriderError> {
        let regime_set = IndicatorSet::new(regime.required_indicators(), 0, None);
        let lookback = set.min_lookback().max(regime_set.min_lookback());
        let range = DateWindow::new(warmup_start(window.start, lookback), window.end)?;
        info!(
            "loading {} symbols over {} ({} bars warmup)",
            symbols.len(),
            range,
            lookback
        );

        let benchmark = match benchmark {
            Some(name) => Some(self.load_symbol(name, range, &regime_set)?),
            None => None,
        };

        let mut loaded = Vec::new();
        let mut skipped = Vec::new();
        for symbol in symbols {
            match self.load_symbol(symbol, range, set) {
                Ok(data) => loaded.push(data),
                Err(StriderError::DataUnavailable { .. }) => {
                    warn!("skipping {symbol}: no data in {range}");
                    skipped.push(SkippedSymbol {
                        symbol: symbol.clone(),
                        reason: SkipReason::NoData,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if loaded.is_empty() {
            let last = window.end.pred_opt().unwrap_or(window.end);
            return Err(StriderError::DataUnavailable {
                symbol: symbols.join(","),
                start: window.start,
                end: last,
            });
        }

        Ok(LoadedUniverse {
            snapshot: MarketSnapshot::new(loaded, benchmark),
            skipped,
        })
    }
}
