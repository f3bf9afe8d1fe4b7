//! JSON report adapter implementing `ReportPort`.
//!
//! Backtest reports carry the full run plus a compounded monthly return
//! table derived from the equity curve.

use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::error::StriderError;
use crate::domain::portfolio::EquityPoint;
use crate::domain::walk_forward::WalkForwardReport;
use crate::ports::report_port::{BacktestReport, ReportPort};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturnRow {
    pub year: i32,
    /// Percent, January first; `None` for months without data.
    pub months: Vec<Option<f64>>,
}

#[derive(Serialize)]
struct BacktestDocument<'a> {
    #[serde(flatten)]
    report: &'a BacktestReport,
    monthly_returns: Vec<MonthlyReturnRow>,
}

pub fn compute_monthly_returns(equity_curve: &[EquityPoint]) -> Vec<MonthlyReturnRow> {
    if equity_curve.len() < 2 {
        return Vec::new();
    }

    let mut monthly_data: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for window in equity_curve.windows(2) {
        let prev = &window[0];
        let curr = &window[1];
        let return_rate = if prev.equity > 0.0 {
            (curr.equity - prev.equity) / prev.equity
        } else {
            0.0
        };
        let key = (curr.date.year(), curr.date.month());
        monthly_data.entry(key).or_default().push(return_rate);
    }

    let returns: BTreeMap<(i32, u32), f64> = monthly_data
        .iter()
        .map(|(&key, daily)| {
            let compounded = daily.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
            (key, compounded * 100.0)
        })
        .collect();

    let (Some(min_year), Some(max_year)) = (
        returns.keys().map(|k| k.0).min(),
        returns.keys().map(|k| k.0).max(),
    ) else {
        return Vec::new();
    };

    (min_year..=max_year)
        .map(|year| MonthlyReturnRow {
            year,
            months: (1..=12u32)
                .map(|month| returns.get(&(year, month)).copied())
                .collect(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct JsonReportAdapter;

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write<T: Serialize>(value: &T, output: &Path) -> Result<(), StriderError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(output)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write_backtest(&self, report: &BacktestReport, output: &Path) -> Result<(), StriderError> {
        let document = BacktestDocument {
            report,
            monthly_returns: compute_monthly_returns(&report.equity_curve),
        };
        Self::write(&document, output)
    }

    fn write_walk_forward(&self, report: &WalkForwardReport, output: &Path) -> Result<(), StriderError> {
        Self::write(report, output)
    }
}
