//! Per-(symbol, date) feature rows derived from bars.
//!
//! A row only carries indicators that are past their warmup on that date, so
//! a missing key always means "not yet computable" and never a fabricated
//! value. Relative strength is the symbol's rate of change minus the
//! benchmark's over the same lookback, both as fractions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::indicator::IndicatorType;
use crate::domain::indicator::roc::calculate_roc;
use crate::domain::indicator_helpers::compute_indicators;
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub values: BTreeMap<String, f64>,
    pub relative_strength: Option<f64>,
}

impl FeatureRow {
    pub fn get(&self, indicator: &IndicatorType) -> Option<f64> {
        self.values.get(&indicator.to_string()).copied()
    }
}

/// The indicator set a feature computation is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorSet {
    indicators: Vec<IndicatorType>,
    pub rs_period: usize,
    pub benchmark: Option<String>,
}

impl IndicatorSet {
    pub fn new(
        indicators: impl IntoIterator<Item = IndicatorType>,
        rs_period: usize,
        benchmark: Option<String>,
    ) -> Self {
        let mut indicators: Vec<IndicatorType> = indicators.into_iter().collect();
        indicators.sort();
        indicators.dedup();
        IndicatorSet {
            indicators,
            rs_period,
            benchmark,
        }
    }

    pub fn indicators(&self) -> &[IndicatorType] {
        &self.indicators
    }

    /// Bars needed before every requested feature is defined.
    pub fn min_lookback(&self) -> usize {
        let rs = if self.benchmark.is_some() {
            self.rs_period
        } else {
            0
        };
        self.indicators
            .iter()
            .map(IndicatorType::warmup)
            .max()
            .unwrap_or(0)
            .max(rs)
    }
}

/// Builds one row per bar. `benchmark` bars are only consulted when the set
/// names a benchmark and `rs_period > 0`.
pub fn compute_features(
    symbol: &str,
    bars: &[OhlcvBar],
    benchmark: Option<&[OhlcvBar]>,
    set: &IndicatorSet,
) -> Vec<FeatureRow> {
    let series = compute_indicators(bars, set.indicators());

    let rs_inputs = match (benchmark, set.rs_period) {
        (Some(bench), period) if period > 0 && set.benchmark.is_some() => {
            let own = calculate_roc(bars, period);
            let bench_roc = calculate_roc(bench, period);
            let bench_by_date: HashMap<NaiveDate, f64> = bench_roc
                .values
                .iter()
                .filter(|p| p.valid)
                .map(|p| (p.date, p.value))
                .collect();
            Some((own, bench_by_date))
        }
        _ => None,
    };

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let values = series
                .iter()
                .filter_map(|(t, s)| s.value_at(i).map(|v| (t.to_string(), v)))
                .collect();
            let relative_strength = rs_inputs.as_ref().and_then(|(own, bench_by_date)| {
                let mine = own.value_at(i)?;
                let theirs = bench_by_date.get(&bar.date)?;
                Some((mine - theirs) / 100.0)
            });
            FeatureRow {
                symbol: symbol.to_string(),
                date: bar.date,
                close: bar.close,
                values,
                relative_strength,
            }
        })
        .collect()
}
