//! Simple Moving Average and its slope.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]). Warmup: first (n-1) bars are invalid.
//!
//! SMA_SLOPE(n,k)[i] = (SMA(n)[i] - SMA(n)[i-k]) / k, the average per-bar
//! change of the moving average. Warmup: first (n-1+k) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Sma(period));
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i + 1 < period {
                IndicatorPoint::invalid(bar.date)
            } else {
                let window = &bars[i + 1 - period..=i];
                let mean = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
                IndicatorPoint::valid(bar.date, mean)
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}

pub fn calculate_sma_slope(bars: &[OhlcvBar], period: usize, lookback: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::SmaSlope { period, lookback };
    if period == 0 || lookback == 0 {
        return IndicatorSeries::empty(indicator_type);
    }

    let sma = calculate_sma(bars, period);
    let values = sma
        .values
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let prior = i.checked_sub(lookback).and_then(|j| sma.value_at(j));
            match (point.valid, prior) {
                (true, Some(prev)) => {
                    IndicatorPoint::valid(point.date, (point.value - prev) / lookback as f64)
                }
                _ => IndicatorPoint::invalid(point.date),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
