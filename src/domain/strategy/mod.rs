//! Pluggable strategy interface and the name -> constructor registry.
//!
//! Strategies are stateless: every call receives the previous day's features
//! and regime plus the engine's explicit risk-budget state, and returns
//! scores or target weights. Adding a strategy means registering a
//! constructor; the engine never changes.

pub mod long_trend;
pub mod mean_reversion;
pub mod params;
pub mod short_trend;

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::error::StriderError;
use crate::domain::features::FeatureRow;
use crate::domain::indicator::IndicatorType;
use crate::domain::position::{Direction, Position};
use crate::domain::regime::MarketRegime;
use crate::domain::risk_budget::RiskBudgetState;

pub use long_trend::LongTrend;
pub use mean_reversion::MeanReversion;
pub use params::StrategyParams;
pub use short_trend::ShortTrend;

/// Feature rows visible to a decision, keyed by symbol.
pub type FeatureView<'a> = BTreeMap<&'a str, &'a FeatureRow>;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn params(&self) -> &StrategyParams;

    fn direction(&self) -> Direction;

    /// Indicators the strategy reads from feature rows.
    fn required_indicators(&self) -> Vec<IndicatorType>;

    /// Scores the symbols that qualify for entry; higher ranks first.
    fn generate_signals(
        &self,
        features: &FeatureView<'_>,
        regime: MarketRegime,
        date: NaiveDate,
    ) -> BTreeMap<String, f64>;

    /// Signed target weights by symbol. Held symbols missing from the result
    /// are closed by the engine.
    fn size_positions(
        &self,
        scores: &BTreeMap<String, f64>,
        _features: &FeatureView<'_>,
        current_weights: &BTreeMap<String, f64>,
        risk: &RiskBudgetState,
    ) -> BTreeMap<String, f64> {
        fill_slots(scores, current_weights, self.params(), risk, self.direction())
    }

    /// Whether the previous day's data says the position's thesis is gone.
    fn trend_reversal(
        &self,
        position: &Position,
        features: &FeatureRow,
        regime: MarketRegime,
    ) -> bool;
}

/// Keeps every held weight and fills the free slots with the best-scored
/// symbols not already held, each at `exposure * multiplier / position_count`.
/// Ties in score fall back to symbol order.
pub fn fill_slots(
    scores: &BTreeMap<String, f64>,
    current_weights: &BTreeMap<String, f64>,
    params: &StrategyParams,
    risk: &RiskBudgetState,
    direction: Direction,
) -> BTreeMap<String, f64> {
    let mut targets = current_weights.clone();
    if risk.is_halted() || risk.exposure_multiplier <= 0.0 {
        return targets;
    }

    let free = params.position_count.saturating_sub(targets.len());
    if free == 0 {
        return targets;
    }

    let mut ranked: Vec<(&String, f64)> = scores
        .iter()
        .filter(|(symbol, score)| !targets.contains_key(*symbol) && score.is_finite())
        .map(|(symbol, score)| (symbol, *score))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let weight = direction.sign() * params.exposure * risk.exposure_multiplier
        / params.position_count as f64;
    for (symbol, _) in ranked.into_iter().take(free) {
        targets.insert(symbol.clone(), weight);
    }
    targets
}

pub type StrategyFactory =
    Arc<dyn Fn(StrategyParams) -> Result<Box<dyn Strategy>, StriderError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(long_trend::NAME, |p| {
            Ok(Box::new(LongTrend::new(p)?) as Box<dyn Strategy>)
        });
        registry.register(short_trend::NAME, |p| {
            Ok(Box::new(ShortTrend::new(p)?) as Box<dyn Strategy>)
        });
        registry.register(mean_reversion::NAME, |p| {
            Ok(Box::new(MeanReversion::new(p)?) as Box<dyn Strategy>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(StrategyParams) -> Result<Box<dyn Strategy>, StriderError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn create(&self, name: &str, params: StrategyParams) -> Result<Box<dyn Strategy>, StriderError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| StriderError::UnknownStrategy {
                name: name.to_string(),
            })?;
        factory(params)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(position_count: usize) -> StrategyParams {
        StrategyParams {
            position_count,
            ..Default::default()
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, v)| (s.to_string(), *v)).collect()
    }

    #[test]
    fn fill_slots_takes_top_ranked() {
        let t = fill_slots(
            &scores(&[("AAA", 0.1), ("BBB", 0.3), ("CCC", 0.2)]),
            &BTreeMap::new(),
            &params(2),
            &RiskBudgetState::new(100.0),
            Direction::Long,
        );
        assert_eq!(t.keys().collect::<Vec<_>>(), vec!["BBB", "CCC"]);
        assert!((t["BBB"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fill_slots_keeps_held_and_breaks_ties_by_symbol() {
        let held = BTreeMap::from([("ZZZ".to_string(), 0.4)]);
        let t = fill_slots(
            &scores(&[("BBB", 1.0), ("AAA", 1.0)]),
            &held,
            &params(2),
            &RiskBudgetState::new(100.0),
            Direction::Long,
        );
        assert_eq!(t.len(), 2);
        assert_eq!(t["ZZZ"], 0.4);
        assert!(t.contains_key("AAA"));
    }

    #[test]
    fn fill_slots_scales_with_risk_and_halts() {
        let mut risk = RiskBudgetState::new(100.0);
        risk.exposure_multiplier = 0.5;
        let t = fill_slots(&scores(&[("AAA", 1.0)]), &BTreeMap::new(), &params(1), &risk, Direction::Short);
        assert!((t["AAA"] + 0.5).abs() < 1e-12);

        risk.cooldown_remaining = 3;
        let t = fill_slots(&scores(&[("AAA", 1.0)]), &BTreeMap::new(), &params(1), &risk, Direction::Long);
        assert!(t.is_empty());
    }

    #[test]
    fn registry_builds_builtins_by_name() {
        let registry = StrategyRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["long_trend", "mean_reversion", "short_trend"]);
        let s = registry.create("long_trend", StrategyParams::default()).unwrap();
        assert_eq!(s.name(), "long_trend");
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let registry = StrategyRegistry::with_builtins();
        let err = registry.create("martingale", StrategyParams::default()).err().unwrap();
        assert!(matches!(err, StriderError::UnknownStrategy { .. }));
    }

    #[test]
    fn registry_accepts_new_strategies() {
        let mut registry = StrategyRegistry::new();
        registry.register("alias", |p| Ok(Box::new(LongTrend::new(p)?) as Box<dyn Strategy>));
        assert!(registry.contains("alias"));
    }
}
