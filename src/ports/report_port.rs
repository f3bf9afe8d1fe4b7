//! Report generation port trait.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::backtest::{DataGap, DateWindow};
use crate::domain::error::StriderError;
use crate::domain::metrics::Metrics;
use crate::domain::monte_carlo::MonteCarloResult;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::Trade;
use crate::domain::strategy::StrategyParams;
use crate::domain::walk_forward::WalkForwardReport;

/// Everything a single backtest report shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub run_id: Option<String>,
    pub strategy: String,
    pub params: StrategyParams,
    pub window: DateWindow,
    pub symbols: Vec<String>,
    pub metrics: Metrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub gaps: Vec<DataGap>,
    pub monte_carlo: Option<MonteCarloResult>,
}

pub trait ReportPort {
    fn write_backtest(&self, report: &BacktestReport, output: &Path) -> Result<(), StriderError>;

    fn write_walk_forward(&self, report: &WalkForwardReport, output: &Path) -> Result<(), StriderError>;
}
