//! Walk-forward optimization.
//!
//! Periods are processed in calendar order. Within a period every candidate
//! parameter set is backtested in parallel over the training window on a
//! snapshot truncated at the training end, the best one is picked from
//! training metrics alone, and that choice is re-run unchanged over the test
//! window. Cancellation is checked before each unit of work; periods finished
//! before the signal stay in the report.

use chrono::{Days, NaiveDate};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::backtest::{BacktestConfig, BacktestEngine, DateWindow};
use super::error::StriderError;
use super::market_data::MarketSnapshot;
use super::metrics::Metrics;
use super::strategy::{Strategy, StrategyParams, StrategyRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    #[default]
    Rolling,
    /// Training always starts at the range start and grows by `step_days`.
    Anchored,
}

impl FromStr for WindowMode {
    type Err = StriderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling" => Ok(WindowMode::Rolling),
            "anchored" => Ok(WindowMode::Anchored),
            other => Err(StriderError::ConfigInvalid {
                section: "walk_forward".into(),
                key: "mode".into(),
                reason: format!("expected rolling or anchored, got '{other}'"),
            }),
        }
    }
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMode::Rolling => write!(f, "rolling"),
            WindowMode::Anchored => write!(f, "anchored"),
        }
    }
}

/// Window lengths are calendar days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub train_days: u32,
    pub test_days: u32,
    pub step_days: u32,
    pub mode: WindowMode,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
    pub risk_free_rate: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            train_days: 365,
            test_days: 90,
            step_days: 90,
            mode: WindowMode::Rolling,
            threads: None,
            risk_free_rate: 0.0,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), StriderError> {
        for (key, value) in [
            ("train_days", self.train_days),
            ("test_days", self.test_days),
            ("step_days", self.step_days),
        ] {
            if value == 0 {
                return Err(StriderError::ConfigInvalid {
                    section: "walk_forward".into(),
                    key: key.into(),
                    reason: "must be positive".into(),
                });
            }
        }
        if self.threads == Some(0) {
            return Err(StriderError::ConfigInvalid {
                section: "walk_forward".into(),
                key: "threads".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// Every full train+test period inside `range`. Partial trailing periods
    /// are dropped.
    pub fn generate_periods(&self, range: DateWindow) -> Result<Vec<WalkForwardPeriod>, StriderError> {
        self.validate()?;
        let add = |date: NaiveDate, days: u64| date.checked_add_days(Days::new(days));

        let mut periods = Vec::new();
        for index in 0.. {
            let offset = self.step_days as u64 * index as u64;
            let (train_start, train_end) = match self.mode {
                WindowMode::Rolling => {
                    let Some(start) = add(range.start, offset) else { break };
                    let Some(end) = add(start, self.train_days as u64) else { break };
                    (start, end)
                }
                WindowMode::Anchored => {
                    let Some(end) = add(range.start, self.train_days as u64 + offset) else {
                        break;
                    };
                    (range.start, end)
                }
            };
            let Some(test_end) = add(train_end, self.test_days as u64) else {
                break;
            };
            if test_end > range.end {
                break;
            }
            periods.push(WalkForwardPeriod {
                index,
                train: DateWindow {
                    start: train_start,
                    end: train_end,
                },
                test: DateWindow {
                    start: train_end,
                    end: test_end,
                },
            });
        }
        Ok(periods)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardPeriod {
    pub index: usize,
    pub train: DateWindow,
    /// Starts exactly where `train` ends.
    pub test: DateWindow,
}

/// Shared flag checked between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Train,
    Test,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub period_index: usize,
    pub param_index: usize,
    pub phase: Phase,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunCounts {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub param_index: usize,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeriodOutcome {
    Completed {
        param_index: usize,
        params: StrategyParams,
        in_sample: Metrics,
        out_of_sample: Metrics,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub period: WalkForwardPeriod,
    pub candidates: Vec<CandidateScore>,
    pub outcome: PeriodOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub periods_completed: usize,
    pub mean_in_sample_sharpe: f64,
    pub std_in_sample_sharpe: f64,
    pub mean_out_of_sample_sharpe: f64,
    pub std_out_of_sample_sharpe: f64,
    pub degradation_ratio: f64,
    /// parameter -> selected value -> number of periods it was selected in.
    pub parameter_frequency: BTreeMap<String, BTreeMap<String, usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub strategy: String,
    pub range: DateWindow,
    pub config: WalkForwardConfig,
    pub candidates: Vec<StrategyParams>,
    pub periods: Vec<PeriodResult>,
    pub summary: WalkForwardSummary,
    pub counts: RunCounts,
    pub failures: Vec<RunFailure>,
    pub cancelled: bool,
}

/// 1 - mean_oos / mean_is, with 0 when the in-sample mean is 0.
pub fn degradation_ratio(mean_in_sample: f64, mean_out_of_sample: f64) -> f64 {
    if mean_in_sample == 0.0 {
        0.0
    } else {
        1.0 - mean_out_of_sample / mean_in_sample
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Picks the best training result: highest Sharpe, then lowest max
/// drawdown, then lowest grid index. Only training metrics are visible here.
pub fn select_best(candidates: &[(usize, &Metrics)]) -> Option<usize> {
    candidates
        .iter()
        .min_by(|(ia, a), (ib, b)| {
            b.sharpe_ratio
                .total_cmp(&a.sharpe_ratio)
                .then(a.max_drawdown.total_cmp(&b.max_drawdown))
                .then(ia.cmp(ib))
        })
        .map(|(i, _)| *i)
}

/// Aggregates completed periods. `keys` limits the frequency table to the
/// parameters that actually vary across candidates.
pub fn summarize(periods: &[PeriodResult], keys: &[String]) -> WalkForwardSummary {
    let mut is_sharpes = Vec::new();
    let mut oos_sharpes = Vec::new();
    let mut parameter_frequency: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

    for period in periods {
        let PeriodOutcome::Completed {
            params,
            in_sample,
            out_of_sample,
            ..
        } = &period.outcome
        else {
            continue;
        };
        is_sharpes.push(in_sample.sharpe_ratio);
        oos_sharpes.push(out_of_sample.sharpe_ratio);
        let values = params.to_map();
        for key in keys {
            if let Some(v) = values.get(key) {
                *parameter_frequency
                    .entry(key.clone())
                    .or_default()
                    .entry(format!("{v}"))
                    .or_default() += 1;
            }
        }
    }

    let (mean_is, std_is) = mean_std(&is_sharpes);
    let (mean_oos, std_oos) = mean_std(&oos_sharpes);
    WalkForwardSummary {
        periods_completed: is_sharpes.len(),
        mean_in_sample_sharpe: mean_is,
        std_in_sample_sharpe: std_is,
        mean_out_of_sample_sharpe: mean_oos,
        std_out_of_sample_sharpe: std_oos,
        degradation_ratio: degradation_ratio(mean_is, mean_oos),
        parameter_frequency,
    }
}

/// Parameter keys whose value is not the same in every candidate.
pub fn varying_keys(candidates: &[StrategyParams]) -> Vec<String> {
    let maps: Vec<BTreeMap<String, f64>> = candidates.iter().map(StrategyParams::to_map).collect();
    let Some(first) = maps.first() else {
        return Vec::new();
    };
    first
        .iter()
        .filter(|(key, value)| maps.iter().any(|m| m.get(*key) != Some(value)))
        .map(|(key, _)| key.clone())
        .collect()
}

/// Data visible to a period's optimization: nothing dated on or after the
/// start of its test window.
pub fn training_view(snapshot: &MarketSnapshot, period: &WalkForwardPeriod) -> MarketSnapshot {
    snapshot.up_to(period.train.end)
}

enum RunOutcome {
    Completed(Metrics),
    Failed(String),
    Cancelled,
}

pub struct WalkForwardOptimizer<'a> {
    snapshot: &'a MarketSnapshot,
    strategy_name: String,
    strategies: Vec<Box<dyn Strategy>>,
    candidates: Vec<StrategyParams>,
    backtest: &'a BacktestConfig,
    config: WalkForwardConfig,
}

impl<'a> WalkForwardOptimizer<'a> {
    /// Builds every candidate up front so a bad grid fails before any run.
    pub fn new(
        snapshot: &'a MarketSnapshot,
        registry: &StrategyRegistry,
        strategy_name: &str,
        candidates: Vec<StrategyParams>,
        backtest: &'a BacktestConfig,
        config: WalkForwardConfig,
    ) -> Result<Self, StriderError> {
        config.validate()?;
        backtest.validate()?;
        if candidates.is_empty() {
            return Err(StriderError::InvalidParams {
                reason: "parameter grid is empty".into(),
            });
        }
        let strategies = candidates
            .iter()
            .map(|p| registry.create(strategy_name, p.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WalkForwardOptimizer {
            snapshot,
            strategy_name: strategy_name.to_string(),
            strategies,
            candidates,
            backtest,
            config,
        })
    }

    pub fn run(&self, range: DateWindow, cancel: &CancellationToken) -> Result<WalkForwardReport, StriderError> {
        let periods = self.config.generate_periods(range)?;
        if periods.is_empty() {
            return Err(StriderError::ConfigInvalid {
                section: "walk_forward".into(),
                key: "train_days".into(),
                reason: format!(
                    "{range} is shorter than one {}+{} day period",
                    self.config.train_days, self.config.test_days
                ),
            });
        }
        info!(
            "walk-forward {}: {} periods x {} candidates ({} mode)",
            self.strategy_name,
            periods.len(),
            self.candidates.len(),
            self.config.mode
        );

        match self.config.threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| StriderError::Computation {
                        reason: format!("thread pool: {e}"),
                    })?;
                Ok(pool.install(|| self.run_periods(range, &periods, cancel)))
            }
            None => Ok(self.run_periods(range, &periods, cancel)),
        }
    }

    fn run_periods(
        &self,
        range: DateWindow,
        periods: &[WalkForwardPeriod],
        cancel: &CancellationToken,
    ) -> WalkForwardReport {
        let mut counts = RunCounts::default();
        let mut failures = Vec::new();
        let mut results = Vec::with_capacity(periods.len());

        for period in periods {
            let result = self.run_period(period, cancel, &mut counts, &mut failures);
            results.push(result);
        }

        let summary = summarize(&results, &varying_keys(&self.candidates));
        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!(
                "walk-forward {} cancelled: {} of {} periods completed",
                self.strategy_name,
                summary.periods_completed,
                periods.len()
            );
        }
        info!(
            "walk-forward {}: {} runs succeeded, {} failed, {} cancelled; degradation {:.4}",
            self.strategy_name, counts.succeeded, counts.failed, counts.cancelled, summary.degradation_ratio
        );

        WalkForwardReport {
            strategy: self.strategy_name.clone(),
            range,
            config: self.config.clone(),
            candidates: self.candidates.clone(),
            periods: results,
            summary,
            counts,
            failures,
            cancelled,
        }
    }

    fn run_period(
        &self,
        period: &WalkForwardPeriod,
        cancel: &CancellationToken,
        counts: &mut RunCounts,
        failures: &mut Vec<RunFailure>,
    ) -> PeriodResult {
        let view = training_view(self.snapshot, period);
        let train: BTreeMap<usize, RunOutcome> = self
            .strategies
            .par_iter()
            .enumerate()
            .map(|(ci, strategy)| {
                if cancel.is_cancelled() {
                    return (ci, RunOutcome::Cancelled);
                }
                (ci, self.run_one(&view, strategy.as_ref(), period.train))
            })
            .collect();

        let mut scored: Vec<(usize, &Metrics)> = Vec::new();
        let mut any_cancelled = false;
        for (&ci, outcome) in &train {
            match outcome {
                RunOutcome::Completed(m) => {
                    counts.succeeded += 1;
                    scored.push((ci, m));
                }
                RunOutcome::Failed(reason) => {
                    counts.failed += 1;
                    failures.push(RunFailure {
                        period_index: period.index,
                        param_index: ci,
                        phase: Phase::Train,
                        reason: reason.clone(),
                    });
                }
                RunOutcome::Cancelled => {
                    counts.cancelled += 1;
                    any_cancelled = true;
                }
            }
        }
        let candidates = scored
            .iter()
            .map(|(ci, m)| CandidateScore {
                param_index: *ci,
                sharpe_ratio: m.sharpe_ratio,
                max_drawdown: m.max_drawdown,
            })
            .collect();

        let finish = |outcome| PeriodResult {
            period: *period,
            candidates,
            outcome,
        };

        if any_cancelled || cancel.is_cancelled() {
            counts.cancelled += 1;
            return finish(PeriodOutcome::Cancelled);
        }
        let Some(best) = select_best(&scored) else {
            counts.failed += 1;
            let reason = "every candidate failed in training".to_string();
            failures.push(RunFailure {
                period_index: period.index,
                param_index: 0,
                phase: Phase::Test,
                reason: reason.clone(),
            });
            return finish(PeriodOutcome::Failed { reason });
        };
        let Some(RunOutcome::Completed(in_sample)) = train.get(&best) else {
            return finish(PeriodOutcome::Failed {
                reason: "selected candidate has no training metrics".into(),
            });
        };

        let test_view = self.snapshot.up_to(period.test.end);
        match self.run_one(&test_view, self.strategies[best].as_ref(), period.test) {
            RunOutcome::Completed(out_of_sample) => {
                counts.succeeded += 1;
                finish(PeriodOutcome::Completed {
                    param_index: best,
                    params: self.candidates[best].clone(),
                    in_sample: in_sample.clone(),
                    out_of_sample,
                })
            }
            RunOutcome::Failed(reason) => {
                counts.failed += 1;
                failures.push(RunFailure {
                    period_index: period.index,
                    param_index: best,
                    phase: Phase::Test,
                    reason: reason.clone(),
                });
                finish(PeriodOutcome::Failed { reason })
            }
            RunOutcome::Cancelled => {
                counts.cancelled += 1;
                finish(PeriodOutcome::Cancelled)
            }
        }
    }

    fn run_one(&self, view: &MarketSnapshot, strategy: &dyn Strategy, window: DateWindow) -> RunOutcome {
        let result = BacktestEngine::new(view, strategy, self.backtest).and_then(|engine| engine.run(window));
        match result {
            Ok(result) => RunOutcome::Completed(Metrics::from_result(&result, self.config.risk_free_rate)),
            Err(e) => {
                warn!("{} {}: {e}", self.strategy_name, window);
                RunOutcome::Failed(e.to_string())
            }
        }
    }
}
