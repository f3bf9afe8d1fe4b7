//! Market data access port trait.

use crate::domain::error::StriderError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort: Send + Sync {
    /// Bars dated within `start..=end`, ascending with no repeated dates.
    /// An empty result is reported as [`StriderError::DataUnavailable`].
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<OhlcvBar>, StriderError>;

    fn list_symbols(&self) -> Result<Vec<String>, StriderError>;

    /// First date, last date and bar count, or `None` when the symbol is unknown.
    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StriderError>;
}
