//! Run store port trait.
//!
//! Stores are append-only: a record is written once under its content
//! digest and never updated in place.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::backtest::{BacktestConfig, DateWindow};
use crate::domain::error::StriderError;
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::Trade;
use crate::domain::strategy::StrategyParams;

/// Hex digits of the SHA-256 digest kept in a run id.
pub const RUN_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub strategy: String,
    pub params: StrategyParams,
    pub config: BacktestConfig,
    pub window: DateWindow,
    pub symbols: Vec<String>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub strategy: String,
    pub window: DateWindow,
    pub trade_count: usize,
    pub total_return: f64,
    pub sharpe_ratio: f64,
}

impl RunSummary {
    pub fn of(run_id: &str, record: &RunRecord) -> Self {
        RunSummary {
            run_id: run_id.to_string(),
            strategy: record.strategy.clone(),
            window: record.window,
            trade_count: record.metrics.trade_count,
            total_return: record.metrics.total_return,
            sharpe_ratio: record.metrics.sharpe_ratio,
        }
    }
}

/// Id derived from the record's JSON, so identical content maps to one id.
pub fn run_id(record: &RunRecord) -> Result<String, StriderError> {
    let json = serde_json::to_vec(record)?;
    let digest = format!("{:x}", Sha256::digest(&json));
    Ok(digest[..RUN_ID_LEN].to_string())
}

pub trait RunStorePort {
    fn save_run(&self, record: &RunRecord) -> Result<String, StriderError>;

    /// Fails with [`StriderError::RunNotFound`] for an unknown id.
    fn load_run(&self, run_id: &str) -> Result<RunRecord, StriderError>;

    fn list_runs(&self) -> Result<Vec<RunSummary>, StriderError>;
}
