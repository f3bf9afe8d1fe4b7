//! Buy oversold symbols in a ranging market, exit once RSI recovers.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::{FeatureView, Strategy, StrategyParams};
use crate::domain::error::StriderError;
use crate::domain::features::FeatureRow;
use crate::domain::indicator::IndicatorType;
use crate::domain::position::{Direction, Position};
use crate::domain::regime::MarketRegime;

pub const NAME: &str = "mean_reversion";

#[derive(Debug, Clone)]
pub struct MeanReversion {
    params: StrategyParams,
    rsi: IndicatorType,
}

impl MeanReversion {
    pub fn new(params: StrategyParams) -> Result<Self, StriderError> {
        params.validate()?;
        if params.rsi_exit <= params.rsi_entry {
            return Err(StriderError::InvalidParams {
                reason: format!(
                    "rsi_exit ({}) must be above rsi_entry ({})",
                    params.rsi_exit, params.rsi_entry
                ),
            });
        }
        let rsi = IndicatorType::Rsi(params.rsi_period);
        Ok(Self { params, rsi })
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn direction(&self) -> Direction {
        Direction::Long
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        vec![self.rsi.clone()]
    }

    /// The deeper below `rsi_entry`, the higher the score.
    fn generate_signals(
        &self,
        features: &FeatureView<'_>,
        regime: MarketRegime,
        _date: NaiveDate,
    ) -> BTreeMap<String, f64> {
        if regime != MarketRegime::Ranging {
            return BTreeMap::new();
        }
        features
            .iter()
            .filter_map(|(symbol, row)| {
                let rsi = row.get(&self.rsi)?;
                (rsi < self.params.rsi_entry).then(|| (symbol.to_string(), self.params.rsi_entry - rsi))
            })
            .collect()
    }

    fn trend_reversal(&self, _position: &Position, features: &FeatureRow, _regime: MarketRegime) -> bool {
        features.get(&self.rsi).is_some_and(|rsi| rsi > self.params.rsi_exit)
    }
}
