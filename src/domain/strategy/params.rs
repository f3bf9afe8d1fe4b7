//! Immutable strategy parameter record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::StriderError;
use crate::domain::execution::ExitLevels;

pub const PARAM_KEYS: [&str; 8] = [
    "position_count",
    "holding_horizon",
    "take_profit_pct",
    "stop_loss_pct",
    "exposure",
    "rsi_period",
    "rsi_entry",
    "rsi_exit",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub position_count: usize,
    /// Maximum holding period in trading days.
    pub holding_horizon: usize,
    /// Percent above (long) or below (short) entry; 0 disables.
    pub take_profit_pct: f64,
    /// Percent against the entry; 0 disables.
    pub stop_loss_pct: f64,
    /// Fraction of equity the strategy may deploy, in (0, 1].
    pub exposure: f64,
    pub rsi_period: usize,
    pub rsi_entry: f64,
    pub rsi_exit: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            position_count: 5,
            holding_horizon: 10,
            take_profit_pct: 5.0,
            stop_loss_pct: 0.0,
            exposure: 1.0,
            rsi_period: 14,
            rsi_entry: 30.0,
            rsi_exit: 55.0,
        }
    }
}

fn positive_integer(key: &str, value: f64) -> Result<usize, StriderError> {
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(StriderError::InvalidParams {
            reason: format!("{key} must be a positive integer, got {value}"),
        })
    }
}

impl StrategyParams {
    /// Applies `overrides` on top of `base`; unknown keys are rejected.
    pub fn from_map(
        base: &StrategyParams,
        overrides: &BTreeMap<String, f64>,
    ) -> Result<StrategyParams, StriderError> {
        let mut p = base.clone();
        for (key, &value) in overrides {
            match key.as_str() {
                "position_count" => p.position_count = positive_integer(key, value)?,
                "holding_horizon" => p.holding_horizon = positive_integer(key, value)?,
                "rsi_period" => p.rsi_period = positive_integer(key, value)?,
                "take_profit_pct" => p.take_profit_pct = value,
                "stop_loss_pct" => p.stop_loss_pct = value,
                "exposure" => p.exposure = value,
                "rsi_entry" => p.rsi_entry = value,
                "rsi_exit" => p.rsi_exit = value,
                other => {
                    return Err(StriderError::InvalidParams {
                        reason: format!("unknown parameter '{other}'"),
                    });
                }
            }
        }
        p.validate()?;
        Ok(p)
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("position_count".to_string(), self.position_count as f64),
            ("holding_horizon".to_string(), self.holding_horizon as f64),
            ("take_profit_pct".to_string(), self.take_profit_pct),
            ("stop_loss_pct".to_string(), self.stop_loss_pct),
            ("exposure".to_string(), self.exposure),
            ("rsi_period".to_string(), self.rsi_period as f64),
            ("rsi_entry".to_string(), self.rsi_entry),
            ("rsi_exit".to_string(), self.rsi_exit),
        ])
    }

    pub fn validate(&self) -> Result<(), StriderError> {
        let fail = |reason: &str| {
            Err(StriderError::InvalidParams {
                reason: reason.to_string(),
            })
        };
        if self.position_count == 0 {
            return fail("position_count must be positive");
        }
        if self.holding_horizon == 0 {
            return fail("holding_horizon must be positive");
        }
        if !(self.take_profit_pct.is_finite() && self.take_profit_pct >= 0.0) {
            return fail("take_profit_pct must be non-negative");
        }
        if !(self.stop_loss_pct.is_finite() && self.stop_loss_pct >= 0.0 && self.stop_loss_pct < 100.0)
        {
            return fail("stop_loss_pct must be within [0, 100)");
        }
        if !(self.exposure > 0.0 && self.exposure <= 1.0) {
            return fail("exposure must be within (0, 1]");
        }
        if self.rsi_period == 0 {
            return fail("rsi_period must be positive");
        }
        if !(0.0..=100.0).contains(&self.rsi_entry) || !(0.0..=100.0).contains(&self.rsi_exit) {
            return fail("rsi thresholds must be within [0, 100]");
        }
        Ok(())
    }

    pub fn exit_levels(&self) -> ExitLevels {
        ExitLevels {
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
        }
    }
}
