//! Drawdown-driven exposure budget for new entries.
//!
//! The tracker follows peak equity. Crossing a configured drawdown step
//! scales the exposure available to new entries; crossing `halt_drawdown`
//! suspends new entries for `cooldown_days` trading days, after which the
//! peak resets to the equity at that point. Open positions are never forced
//! out by this tracker.

use serde::{Deserialize, Serialize};

use crate::domain::error::StriderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBudgetConfig {
    /// (drawdown threshold, exposure multiplier) pairs, fractions.
    pub steps: Vec<(f64, f64)>,
    pub halt_drawdown: f64,
    pub cooldown_days: usize,
}

impl Default for RiskBudgetConfig {
    fn default() -> Self {
        RiskBudgetConfig {
            steps: vec![(0.10, 0.5), (0.15, 0.25)],
            halt_drawdown: 0.20,
            cooldown_days: 10,
        }
    }
}

impl RiskBudgetConfig {
    /// A budget that never scales or halts.
    pub fn disabled() -> Self {
        RiskBudgetConfig {
            steps: Vec::new(),
            halt_drawdown: 1.0,
            cooldown_days: 0,
        }
    }

    pub fn validate(&self) -> Result<(), StriderError> {
        let invalid = |reason: String| StriderError::ConfigInvalid {
            section: "risk".into(),
            key: "drawdown_steps".into(),
            reason,
        };
        let mut prev = 0.0;
        for &(threshold, multiplier) in &self.steps {
            if !(threshold > prev && threshold < 1.0) {
                return Err(invalid(format!(
                    "thresholds must be increasing and within (0, 1), got {threshold}"
                )));
            }
            if !(0.0..=1.0).contains(&multiplier) {
                return Err(invalid(format!("multiplier {multiplier} outside [0, 1]")));
            }
            prev = threshold;
        }
        if !(self.halt_drawdown > 0.0 && self.halt_drawdown <= 1.0) {
            return Err(StriderError::ConfigInvalid {
                section: "risk".into(),
                key: "halt_drawdown".into(),
                reason: "halt_drawdown must be within (0, 1]".into(),
            });
        }
        Ok(())
    }

    /// Parses `"0.10:0.5,0.15:0.25"`.
    pub fn parse_steps(raw: &str) -> Result<Vec<(f64, f64)>, StriderError> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|pair| {
                let (t, m) = pair.split_once(':').ok_or_else(|| StriderError::ConfigInvalid {
                    section: "risk".into(),
                    key: "drawdown_steps".into(),
                    reason: format!("expected threshold:multiplier, got '{pair}'"),
                })?;
                let parse = |s: &str| {
                    s.trim().parse::<f64>().map_err(|_| StriderError::ConfigInvalid {
                        section: "risk".into(),
                        key: "drawdown_steps".into(),
                        reason: format!("'{s}' is not a number"),
                    })
                };
                Ok((parse(t)?, parse(m)?))
            })
            .collect()
    }
}

/// Carried between days inside the engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBudgetState {
    pub peak_equity: f64,
    pub drawdown: f64,
    pub exposure_multiplier: f64,
    pub cooldown_remaining: usize,
}

impl RiskBudgetState {
    pub fn new(initial_equity: f64) -> Self {
        RiskBudgetState {
            peak_equity: initial_equity,
            drawdown: 0.0,
            exposure_multiplier: 1.0,
            cooldown_remaining: 0,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.cooldown_remaining > 0
    }

    /// Folds one end-of-day equity observation into the state.
    pub fn update(&self, equity: f64, config: &RiskBudgetConfig) -> RiskBudgetState {
        if self.is_halted() {
            let remaining = self.cooldown_remaining - 1;
            if remaining > 0 {
                return RiskBudgetState {
                    cooldown_remaining: remaining,
                    ..self.clone()
                };
            }
            return RiskBudgetState::new(equity);
        }

        let peak_equity = self.peak_equity.max(equity);
        let drawdown = if peak_equity > 0.0 {
            (peak_equity - equity) / peak_equity
        } else {
            0.0
        };

        if drawdown >= config.halt_drawdown && config.cooldown_days > 0 {
            return RiskBudgetState {
                peak_equity,
                drawdown,
                exposure_multiplier: 0.0,
                cooldown_remaining: config.cooldown_days,
            };
        }

        let exposure_multiplier = config
            .steps
            .iter()
            .filter(|(threshold, _)| drawdown >= *threshold)
            .map(|(_, m)| *m)
            .last()
            .unwrap_or(1.0);

        RiskBudgetState {
            peak_equity,
            drawdown,
            exposure_multiplier,
            cooldown_remaining: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn no_drawdown_full_budget() {
        let config = RiskBudgetConfig::default();
        let s = RiskBudgetState::new(100.0).update(110.0, &config);
        assert_relative_eq!(s.peak_equity, 110.0);
        assert_relative_eq!(s.exposure_multiplier, 1.0);
    }

    #[test]
    fn steps_reduce_exposure() {
        let config = RiskBudgetConfig::default();
        let s = RiskBudgetState::new(100.0).update(89.0, &config);
        assert_relative_eq!(s.exposure_multiplier, 0.5);
        let s = s.update(84.0, &config);
        assert_relative_eq!(s.exposure_multiplier, 0.25);
        let s = s.update(95.0, &config);
        assert_relative_eq!(s.exposure_multiplier, 1.0);
    }

    #[test]
    fn halt_then_cooldown_then_reset() {
        let config = RiskBudgetConfig {
            cooldown_days: 2,
            ..Default::default()
        };
        let s = RiskBudgetState::new(100.0).update(79.0, &config);
        assert!(s.is_halted());
        assert_eq!(s.exposure_multiplier, 0.0);
        let s = s.update(85.0, &config);
        assert!(s.is_halted());
        let s = s.update(70.0, &config);
        assert!(!s.is_halted());
        // peak restarts at the equity where the cooldown ended
        assert_relative_eq!(s.peak_equity, 70.0);
        assert_relative_eq!(s.exposure_multiplier, 1.0);
    }

    #[test]
    fn disabled_never_scales() {
        let config = RiskBudgetConfig::disabled();
        let s = RiskBudgetState::new(100.0).update(50.0, &config);
        assert_relative_eq!(s.exposure_multiplier, 1.0);
        assert!(!s.is_halted());
    }

    #[test]
    fn parse_steps_roundtrip() {
        let steps = RiskBudgetConfig::parse_steps("0.1:0.5, 0.2:0.0").unwrap();
        assert_eq!(steps, vec![(0.1, 0.5), (0.2, 0.0)]);
        assert!(RiskBudgetConfig::parse_steps("0.1-0.5").is_err());
    }

    #[test]
    fn validate_rejects_unordered_steps() {
        let config = RiskBudgetConfig {
            steps: vec![(0.2, 0.5), (0.1, 0.25)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(RiskBudgetConfig::default().validate().is_ok());
    }
}
