//! Rate of Change.
//!
//! ROC(n)[i] = (C[i] - C[i-n]) / C[i-n] * 100; 0 when C[i-n] == 0.
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_roc(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Roc(period));
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i < period {
                return IndicatorPoint::invalid(bar.date);
            }
            let prev_close = bars[i - period].close;
            let value = if prev_close == 0.0 {
                0.0
            } else {
                (bar.close - prev_close) / prev_close * 100.0
            };
            IndicatorPoint::valid(bar.date, value)
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                symbol: "TEST".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn roc_basic() {
        let roc = calculate_roc(&make_bars(&[100.0, 105.0, 110.0]), 2);
        assert!(!roc.values[1].valid);
        assert!((roc.values[2].value - 10.0).abs() < 1e-12);
    }

    #[test]
    fn roc_zero_base_is_zero() {
        let roc = calculate_roc(&make_bars(&[0.0, 5.0]), 1);
        assert_eq!(roc.value_at(1), Some(0.0));
    }
}
