//! Dispatch from `IndicatorType` to its calculation.

use std::collections::BTreeMap;

use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, adx::calculate_adx, atr::calculate_atr, ema::calculate_ema,
    roc::calculate_roc, rsi::calculate_rsi, sma::calculate_sma, sma::calculate_sma_slope,
    stddev::calculate_stddev,
};
use crate::domain::ohlcv::OhlcvBar;

pub fn compute_indicator(bars: &[OhlcvBar], indicator_type: &IndicatorType) -> IndicatorSeries {
    match *indicator_type {
        IndicatorType::Sma(n) => calculate_sma(bars, n),
        IndicatorType::SmaSlope { period, lookback } => calculate_sma_slope(bars, period, lookback),
        IndicatorType::Ema(n) => calculate_ema(bars, n),
        IndicatorType::Rsi(n) => calculate_rsi(bars, n),
        IndicatorType::Roc(n) => calculate_roc(bars, n),
        IndicatorType::Atr(n) => calculate_atr(bars, n),
        IndicatorType::Adx(n) => calculate_adx(bars, n),
        IndicatorType::Stddev(n) => calculate_stddev(bars, n),
    }
}

/// Computes every requested indicator once, keyed by type.
pub fn compute_indicators(
    bars: &[OhlcvBar],
    indicator_types: &[IndicatorType],
) -> BTreeMap<IndicatorType, IndicatorSeries> {
    indicator_types
        .iter()
        .map(|t| (t.clone(), compute_indicator(bars, t)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(n: usize) -> Vec<OhlcvBar> {
        (0..n)
            .map(|i| OhlcvBar {
                symbol: "TEST".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: 10.0 + i as f64,
                high: 11.0 + i as f64,
                low: 9.0 + i as f64,
                close: 10.0 + i as f64,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn every_series_aligns_with_bars() {
        let bars = make_bars(40);
        let types = vec![
            IndicatorType::Sma(5),
            IndicatorType::SmaSlope {
                period: 5,
                lookback: 3,
            },
            IndicatorType::Ema(5),
            IndicatorType::Rsi(5),
            IndicatorType::Roc(5),
            IndicatorType::Atr(5),
            IndicatorType::Adx(5),
            IndicatorType::Stddev(5),
        ];
        let all = compute_indicators(&bars, &types);
        assert_eq!(all.len(), types.len());
        for (t, series) in &all {
            assert_eq!(series.values.len(), bars.len(), "{t}");
            let first_valid = series.values.iter().position(|p| p.valid);
            assert_eq!(first_valid, Some(t.warmup()), "{t}");
        }
    }

    #[test]
    fn duplicate_requests_collapse() {
        let bars = make_bars(10);
        let all = compute_indicators(&bars, &[IndicatorType::Sma(3), IndicatorType::Sma(3)]);
        assert_eq!(all.len(), 1);
    }
}
