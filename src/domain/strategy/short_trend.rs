//! Short the weakest symbols relative to the benchmark while the market
//! trends down.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::{FeatureView, Strategy, StrategyParams};
use crate::domain::error::StriderError;
use crate::domain::features::FeatureRow;
use crate::domain::indicator::IndicatorType;
use crate::domain::position::{Direction, Position};
use crate::domain::regime::MarketRegime;

pub const NAME: &str = "short_trend";

#[derive(Debug, Clone)]
pub struct ShortTrend {
    params: StrategyParams,
}

impl ShortTrend {
    pub fn new(params: StrategyParams) -> Result<Self, StriderError> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Strategy for ShortTrend {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> &StrategyParams {
        &self.params
    }

    fn direction(&self) -> Direction {
        Direction::Short
    }

    fn required_indicators(&self) -> Vec<IndicatorType> {
        Vec::new()
    }

    /// Scores are the magnitude of underperformance.
    fn generate_signals(
        &self,
        features: &FeatureView<'_>,
        regime: MarketRegime,
        _date: NaiveDate,
    ) -> BTreeMap<String, f64> {
        if regime != MarketRegime::TrendingDown {
            return BTreeMap::new();
        }
        features
            .iter()
            .filter_map(|(symbol, row)| {
                let rs = row.relative_strength?;
                (rs < 0.0).then(|| (symbol.to_string(), -rs))
            })
            .collect()
    }

    fn trend_reversal(&self, _position: &Position, features: &FeatureRow, regime: MarketRegime) -> bool {
        regime == MarketRegime::TrendingUp || features.relative_strength.is_some_and(|rs| rs > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::risk_budget::RiskBudgetState;

    fn row(symbol: &str, rs: f64) -> FeatureRow {
        FeatureRow {
            symbol: symbol.into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            close: 100.0,
            values: BTreeMap::new(),
            relative_strength: Some(rs),
        }
    }

    #[test]
    fn ranks_underperformers_and_sizes_negative() {
        let a = row("AAA", -0.01);
        let b = row("BBB", -0.08);
        let c = row("CCC", 0.04);
        let view: FeatureView<'_> = BTreeMap::from([("AAA", &a), ("BBB", &b), ("CCC", &c)]);
        let s = ShortTrend::new(StrategyParams {
            position_count: 1,
            ..Default::default()
        })
        .unwrap();

        let scores = s.generate_signals(&view, MarketRegime::TrendingDown, a.date);
        assert_eq!(scores.len(), 2);
        let targets = s.size_positions(&scores, &view, &BTreeMap::new(), &RiskBudgetState::new(1.0));
        assert_eq!(targets.len(), 1);
        assert!((targets["BBB"] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn inactive_outside_downtrend() {
        let a = row("AAA", -0.5);
        let view: FeatureView<'_> = BTreeMap::from([("AAA", &a)]);
        let s = ShortTrend::new(StrategyParams::default()).unwrap();
        assert!(s.generate_signals(&view, MarketRegime::TrendingUp, a.date).is_empty());
    }
}
