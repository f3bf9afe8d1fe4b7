//! Technical indicator implementations.
//!
//! - `IndicatorType`: indicator identity + parameters, also the feature key
//! - `IndicatorPoint`: one point of a series, flagged invalid during warmup
//! - `IndicatorSeries`: a full series aligned one-to-one with the input bars
//!
//! Every calculation is causal: point `i` only reads bars `0..=i`.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

impl IndicatorPoint {
    pub fn invalid(date: NaiveDate) -> Self {
        IndicatorPoint {
            date,
            valid: false,
            value: 0.0,
        }
    }

    pub fn valid(date: NaiveDate, value: f64) -> Self {
        IndicatorPoint {
            date,
            valid: true,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndicatorType {
    Sma(usize),
    /// Per-bar change of SMA(period) measured over `lookback` bars.
    SmaSlope { period: usize, lookback: usize },
    Ema(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Adx(usize),
    Stddev(usize),
}

impl IndicatorType {
    /// Number of leading bars for which the indicator is undefined.
    pub fn warmup(&self) -> usize {
        match self {
            IndicatorType::Sma(n)
            | IndicatorType::Ema(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Stddev(n) => n.saturating_sub(1),
            IndicatorType::Rsi(n) | IndicatorType::Roc(n) => *n,
            IndicatorType::Adx(n) => (2 * n).saturating_sub(1),
            IndicatorType::SmaSlope { period, lookback } => period.saturating_sub(1) + lookback,
        }
    }

    pub fn period(&self) -> usize {
        match self {
            IndicatorType::Sma(n)
            | IndicatorType::Ema(n)
            | IndicatorType::Rsi(n)
            | IndicatorType::Roc(n)
            | IndicatorType::Atr(n)
            | IndicatorType::Adx(n)
            | IndicatorType::Stddev(n) => *n,
            IndicatorType::SmaSlope { period, .. } => *period,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn empty(indicator_type: IndicatorType) -> Self {
        IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        }
    }

    /// Value at `index` if it lies past the warmup.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::SmaSlope { period, lookback } => {
                write!(f, "SMA_SLOPE({},{})", period, lookback)
            }
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
        }
    }
}

/// Parses `name:period`, or `sma_slope:period:lookback`. Names are
/// case-insensitive.
impl FromStr for IndicatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').map(str::trim).collect();
        let number = |raw: &str| -> Result<usize, String> {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(format!("'{raw}' is not a positive period in '{s}'")),
            }
        };
        let name = parts[0].to_ascii_lowercase();
        match (name.as_str(), &parts[1..]) {
            ("sma_slope", [period, lookback]) => Ok(IndicatorType::SmaSlope {
                period: number(*period)?,
                lookback: number(*lookback)?,
            }),
            ("sma", [n]) => Ok(IndicatorType::Sma(number(*n)?)),
            ("ema", [n]) => Ok(IndicatorType::Ema(number(*n)?)),
            ("rsi", [n]) => Ok(IndicatorType::Rsi(number(*n)?)),
            ("roc", [n]) => Ok(IndicatorType::Roc(number(*n)?)),
            ("atr", [n]) => Ok(IndicatorType::Atr(number(*n)?)),
            ("adx", [n]) => Ok(IndicatorType::Adx(number(*n)?)),
            ("stddev", [n]) => Ok(IndicatorType::Stddev(number(*n)?)),
            _ => Err(format!(
                "unknown indicator '{s}', expected e.g. ema:20 or sma_slope:200:20"
            )),
        }
    }
}
