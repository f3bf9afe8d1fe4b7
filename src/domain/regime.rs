//! Market regime classification from benchmark features.
//!
//! The raw label is a pure function of one day's inputs:
//!
//! - `TrendingUp` iff close > MA, slope > 0 and trend strength >= threshold
//! - `TrendingDown` iff close < MA, slope < 0 and trend strength >= threshold
//! - `Ranging` otherwise, including any day with a missing input
//!
//! [`RegimeTracker`] adds optional hysteresis through `confirm_days`. With the
//! default of 0 it returns the raw label unchanged.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::features::FeatureRow;
use crate::domain::indicator::IndicatorType;
use crate::domain::market_data::SymbolData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketRegime::TrendingUp => write!(f, "TRENDING_UP"),
            MarketRegime::TrendingDown => write!(f, "TRENDING_DOWN"),
            MarketRegime::Ranging => write!(f, "RANGING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeConfig {
    pub ma_period: usize,
    pub slope_lookback: usize,
    pub adx_period: usize,
    pub trend_threshold: f64,
    /// Consecutive days a new raw label must persist before it is adopted.
    pub confirm_days: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        RegimeConfig {
            ma_period: 200,
            slope_lookback: 20,
            adx_period: 14,
            trend_threshold: 20.0,
            confirm_days: 0,
        }
    }
}

impl RegimeConfig {
    pub fn moving_average(&self) -> IndicatorType {
        IndicatorType::Sma(self.ma_period)
    }

    pub fn slope(&self) -> IndicatorType {
        IndicatorType::SmaSlope {
            period: self.ma_period,
            lookback: self.slope_lookback,
        }
    }

    pub fn trend_strength(&self) -> IndicatorType {
        IndicatorType::Adx(self.adx_period)
    }

    pub fn required_indicators(&self) -> Vec<IndicatorType> {
        vec![self.moving_average(), self.slope(), self.trend_strength()]
    }
}

/// One day's classifier inputs; `None` means the value is still in warmup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeInputs {
    pub close: f64,
    pub moving_average: Option<f64>,
    pub slope: Option<f64>,
    pub trend_strength: Option<f64>,
}

impl RegimeInputs {
    pub fn from_row(row: &FeatureRow, config: &RegimeConfig) -> Self {
        RegimeInputs {
            close: row.close,
            moving_average: row.get(&config.moving_average()),
            slope: row.get(&config.slope()),
            trend_strength: row.get(&config.trend_strength()),
        }
    }
}

pub fn classify(inputs: &RegimeInputs, trend_threshold: f64) -> MarketRegime {
    let (Some(ma), Some(slope), Some(strength)) =
        (inputs.moving_average, inputs.slope, inputs.trend_strength)
    else {
        return MarketRegime::Ranging;
    };

    if strength < trend_threshold {
        return MarketRegime::Ranging;
    }
    if inputs.close > ma && slope > 0.0 {
        MarketRegime::TrendingUp
    } else if inputs.close < ma && slope < 0.0 {
        MarketRegime::TrendingDown
    } else {
        MarketRegime::Ranging
    }
}

/// Explicit hysteresis state. Serializable so it can live inside engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTracker {
    pub confirm_days: usize,
    pub current: MarketRegime,
    pub pending: Option<(MarketRegime, usize)>,
}

impl RegimeTracker {
    pub fn new(confirm_days: usize) -> Self {
        RegimeTracker {
            confirm_days,
            current: MarketRegime::Ranging,
            pending: None,
        }
    }

    pub fn update(&mut self, raw: MarketRegime) -> MarketRegime {
        if self.confirm_days == 0 || raw == self.current {
            self.current = raw;
            self.pending = None;
            return self.current;
        }

        let seen = match self.pending {
            Some((label, count)) if label == raw => count + 1,
            _ => 1,
        };
        if seen >= self.confirm_days {
            self.current = raw;
            self.pending = None;
        } else {
            self.pending = Some((raw, seen));
        }
        self.current
    }
}

/// Labels every timeline date. Dates without a benchmark row, or a snapshot
/// without a benchmark, are `Ranging`.
pub fn classify_series(
    benchmark: Option<&SymbolData>,
    timeline: &[NaiveDate],
    config: &RegimeConfig,
) -> Vec<MarketRegime> {
    let mut tracker = RegimeTracker::new(config.confirm_days);
    timeline
        .iter()
        .map(|date| {
            let raw = benchmark
                .and_then(|b| b.get_features(*date))
                .map(|row| classify(&RegimeInputs::from_row(row, config), config.trend_threshold))
                .unwrap_or(MarketRegime::Ranging);
            tracker.update(raw)
        })
        .collect()
}
