//! Monte Carlo resampling of a closed-trade ledger.
//!
//! Only runs when explicitly requested, and always from a caller-supplied
//! seed so that two runs with the same seed agree exactly.

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::StriderError;
use super::position::Trade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMode {
    /// Permute the trade sequence; final equity is unchanged, drawdown varies.
    #[default]
    Reorder,
    /// Draw trades with replacement.
    Bootstrap,
}

impl FromStr for ResampleMode {
    type Err = StriderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reorder" => Ok(ResampleMode::Reorder),
            "bootstrap" => Ok(ResampleMode::Bootstrap),
            other => Err(StriderError::ConfigInvalid {
                section: "monte_carlo".into(),
                key: "mode".into(),
                reason: format!("expected reorder or bootstrap, got '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub iterations: usize,
    pub seed: u64,
    pub mode: ResampleMode,
}

impl MonteCarloConfig {
    pub fn new(iterations: usize, seed: u64) -> Self {
        MonteCarloConfig {
            iterations,
            seed,
            mode: ResampleMode::Reorder,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

impl Percentiles {
    fn from_sorted(sorted: &[f64]) -> Self {
        Percentiles {
            p5: percentile(sorted, 0.05),
            p50: percentile(sorted, 0.50),
            p95: percentile(sorted, 0.95),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub config: MonteCarloConfig,
    pub trade_count: usize,
    pub max_drawdown: Percentiles,
    pub final_equity: Percentiles,
    /// Share of simulations whose drawdown exceeded the historical one.
    pub worse_drawdown_fraction: f64,
}

/// Nearest-rank percentile of already sorted data.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Final equity and max drawdown fraction of applying `pnls` in order.
fn replay(initial_capital: f64, pnls: &[f64]) -> (f64, f64) {
    let mut equity = initial_capital;
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;
    for pnl in pnls {
        equity += pnl;
        peak = peak.max(equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    (equity, max_dd)
}

pub fn simulate(trades: &[Trade], initial_capital: f64, config: &MonteCarloConfig) -> MonteCarloResult {
    info!(
        "monte carlo: {} iterations over {} trades, mode {:?}, seed {}",
        config.iterations,
        trades.len(),
        config.mode,
        config.seed
    );

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let (_, historical_dd) = replay(initial_capital, &pnls);

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut drawdowns = Vec::with_capacity(config.iterations);
    let mut finals = Vec::with_capacity(config.iterations);
    let mut sample = pnls.clone();

    if !pnls.is_empty() {
        for _ in 0..config.iterations {
            match config.mode {
                ResampleMode::Reorder => sample.shuffle(&mut rng),
                ResampleMode::Bootstrap => {
                    for slot in sample.iter_mut() {
                        *slot = pnls[rng.gen_range(0..pnls.len())];
                    }
                }
            }
            let (final_equity, dd) = replay(initial_capital, &sample);
            finals.push(final_equity);
            drawdowns.push(dd);
        }
    }

    let worse = drawdowns.iter().filter(|&&dd| dd > historical_dd).count();
    let worse_drawdown_fraction = if drawdowns.is_empty() {
        0.0
    } else {
        worse as f64 / drawdowns.len() as f64
    };

    drawdowns.sort_by(f64::total_cmp);
    finals.sort_by(f64::total_cmp);

    MonteCarloResult {
        config: config.clone(),
        trade_count: trades.len(),
        max_drawdown: Percentiles::from_sorted(&drawdowns),
        final_equity: Percentiles::from_sorted(&finals),
        worse_drawdown_fraction,
    }
}
