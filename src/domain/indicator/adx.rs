//! Average Directional Index (Wilder).
//!
//! For i >= 1:
//! - +DM = up move when it exceeds the down move and is positive, else 0
//! - -DM = down move when it exceeds the up move and is positive, else 0
//!
//! TR, +DM and -DM are Wilder-smoothed (seeded with the sum of the first n
//! values, then S = S - S/n + x). DX = 100 * |+DI - -DI| / (+DI + -DI),
//! 0 when both are 0. ADX seeds with the mean of the first n DX values and is
//! then Wilder-averaged. Warmup: first (2n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_adx(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Adx(period));
    }

    let n = period as f64;
    let mut values = Vec::with_capacity(bars.len());
    let (mut s_tr, mut s_plus, mut s_minus) = (0.0, 0.0, 0.0);
    let mut dx_sum = 0.0;
    let mut adx = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        if i == 0 {
            values.push(IndicatorPoint::invalid(bar.date));
            continue;
        }
        let prev = &bars[i - 1];
        let tr = bar.true_range(prev.close);
        let up_move = bar.high - prev.high;
        let down_move = prev.low - bar.low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        if i <= period {
            s_tr += tr;
            s_plus += plus_dm;
            s_minus += minus_dm;
        } else {
            s_tr = s_tr - s_tr / n + tr;
            s_plus = s_plus - s_plus / n + plus_dm;
            s_minus = s_minus - s_minus / n + minus_dm;
        }

        if i < period {
            values.push(IndicatorPoint::invalid(bar.date));
            continue;
        }

        let (plus_di, minus_di) = if s_tr > 0.0 {
            (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
        } else {
            (0.0, 0.0)
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        let first_valid = 2 * period - 1;
        if i < first_valid {
            dx_sum += dx;
            values.push(IndicatorPoint::invalid(bar.date));
        } else if i == first_valid {
            adx = (dx_sum + dx) / n;
            values.push(IndicatorPoint::valid(bar.date, adx));
        } else {
            adx = (adx * (n - 1.0) + dx) / n;
            values.push(IndicatorPoint::valid(bar.date, adx));
        }
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Adx(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bar(day: i64, close: f64, half_range: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "TEST".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day),
            open: close,
            high: close + half_range,
            low: close - half_range,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn steady_uptrend_is_maximally_directional() {
        let bars: Vec<OhlcvBar> = (0..40).map(|i| make_bar(i, 100.0 + i as f64, 0.5)).collect();
        let adx = calculate_adx(&bars, 14);
        assert_eq!(adx.values.iter().position(|p| p.valid), Some(27));
        for p in adx.values.iter().filter(|p| p.valid) {
            assert!((p.value - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn flat_market_has_zero_adx() {
        let bars: Vec<OhlcvBar> = (0..30).map(|i| make_bar(i, 50.0, 1.0)).collect();
        let adx = calculate_adx(&bars, 5);
        assert_eq!(adx.value_at(29), Some(0.0));
    }

    #[test]
    fn oscillating_market_is_weak() {
        let bars: Vec<OhlcvBar> = (0..60)
            .map(|i| make_bar(i, if i % 2 == 0 { 100.0 } else { 101.0 }, 0.5))
            .collect();
        let adx = calculate_adx(&bars, 14);
        assert!(adx.value_at(59).unwrap() < 20.0);
    }
}
