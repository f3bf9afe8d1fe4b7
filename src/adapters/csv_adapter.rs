//! CSV directory data adapter.
//!
//! One file per symbol named `<SYMBOL>.csv` with a header row
//! `date,open,high,low,close,volume` and ISO dates.

use crate::domain::error::StriderError;
use crate::domain::ohlcv::{OhlcvBar, check_ordered};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Every bar in the symbol's file, sorted, or `None` when there is no file.
    fn read_all(&self, symbol: &str) -> Result<Option<Vec<OhlcvBar>>, StriderError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Ok(None);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| StriderError::DataIntegrity {
                symbol: symbol.to_string(),
                reason: format!("failed to open {}: {e}", path.display()),
            })?;

        let mut bars = Vec::new();
        for result in rdr.deserialize::<CsvRow>() {
            let row = result.map_err(|e| StriderError::DataIntegrity {
                symbol: symbol.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume.round() as i64,
            });
        }

        bars.sort_by_key(|b| b.date);
        check_ordered(symbol, &bars)?;
        Ok(Some(bars))
    }
}

impl DataPort for CsvAdapter {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<OhlcvBar>, StriderError> {
        let bars: Vec<OhlcvBar> = self
            .read_all(symbol)?
            .unwrap_or_default()
            .into_iter()
            .filter(|b| b.date >= start && b.date <= end)
            .collect();

        if bars.is_empty() {
            return Err(StriderError::DataUnavailable {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, StriderError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StriderError> {
        let Some(bars) = self.read_all(symbol)? else {
            return Ok(None);
        };
        match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Ok(Some((first.date, last.date, bars.len()))),
            _ => Ok(None),
        }
    }
}
