//! Daily OHLCV bar representation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::StriderError;

/// One trading day for one symbol. Bars are immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_finite(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
    }
}

/// Checks the data-source contract: ascending dates, no duplicates, finite prices.
pub fn check_ordered(symbol: &str, bars: &[OhlcvBar]) -> Result<(), StriderError> {
    for pair in bars.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(StriderError::DataIntegrity {
                symbol: symbol.to_string(),
                reason: format!(
                    "bars not strictly ascending at {} -> {}",
                    pair[0].date, pair[1].date
                ),
            });
        }
    }
    if let Some(bad) = bars.iter().find(|b| !b.is_finite()) {
        return Err(StriderError::DataIntegrity {
            symbol: symbol.to_string(),
            reason: format!("non-finite price on {}", bad.date),
        });
    }
    Ok(())
}
