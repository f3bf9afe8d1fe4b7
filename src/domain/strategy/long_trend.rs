//! Long the strongest symbols relative to the benchmark while the market
//! trends up.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::{FeatureView, Strategy, StrategyParams};
use crate::domain::error::StriderError;
use crate::domain::features::FeatureRow;
use crate::domain::indicator::IndicatorType;
use crate::domain::position::{Direction, Position};
use crate::domain::regime::MarketRegime;

pub const NAME: &str = "long_trend";

#[derive(Debug, Clone)]
pub struct LongTrend {
    params: StrategyParams,
}

impl LongTrend {
    pub fn new(params: StrategyParams) -> Result<Self, StriderError> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Strategy for LongTrend {
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
        Vec::new()
    }

    fn generate_signals(
        &self,
        features: &FeatureView<'_>,
        regime: MarketRegime,
        _date: NaiveDate,
    ) -> BTreeMap<String, f64> {
        if regime != MarketRegime::TrendingUp {
            return BTreeMap::new();
        }
        features
            .iter()
            .filter_map(|(symbol, row)| {
                let rs = row.relative_strength?;
                (rs > 0.0).then(|| (symbol.to_string(), rs))
            })
            .collect()
    }

    fn trend_reversal(&self, _position: &Position, features: &FeatureRow, regime: MarketRegime) -> bool {
        regime == MarketRegime::TrendingDown || features.relative_strength.is_some_and(|rs| rs < 0.0)
    }
}
