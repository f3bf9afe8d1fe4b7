//! Parameter grids for optimization.
//!
//! Two textual forms are accepted:
//!
//! - compact: `holding_horizon=5|10;take_profit_pct=3,5` (values separated by
//!   `|` or `,`, axes by `;`)
//! - JSON: `{"holding_horizon": [5, 10], "take_profit_pct": 3}`
//!
//! Axes are ordered by key and expanded as a Cartesian product with the last
//! key varying fastest, so combination indices are stable across runs.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::error::StriderError;
use super::strategy::StrategyParams;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<f64>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonAxis {
    One(f64),
    Many(Vec<f64>),
}

fn grid_error(reason: impl Into<String>) -> StriderError {
    StriderError::ConfigInvalid {
        section: "walk_forward".into(),
        key: "grid".into(),
        reason: reason.into(),
    }
}

impl ParamGrid {
    pub fn parse(raw: &str) -> Result<Self, StriderError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(ParamGrid::default());
        }
        let grid = if raw.starts_with('{') {
            Self::parse_json(raw)?
        } else {
            Self::parse_compact(raw)?
        };
        if let Some((key, _)) = grid.axes.iter().find(|(_, values)| values.is_empty()) {
            return Err(grid_error(format!("'{key}' has no values")));
        }
        Ok(grid)
    }

    fn parse_json(raw: &str) -> Result<Self, StriderError> {
        let parsed: BTreeMap<String, JsonAxis> =
            serde_json::from_str(raw).map_err(|e| grid_error(e.to_string()))?;
        let axes = parsed
            .into_iter()
            .map(|(key, axis)| {
                let values = match axis {
                    JsonAxis::One(v) => vec![v],
                    JsonAxis::Many(vs) => vs,
                };
                (key, values)
            })
            .collect();
        Ok(ParamGrid { axes })
    }

    fn parse_compact(raw: &str) -> Result<Self, StriderError> {
        let mut axes = BTreeMap::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, values) = part
                .split_once('=')
                .ok_or_else(|| grid_error(format!("expected key=values, got '{part}'")))?;
            let key = key.trim().to_string();
            let values = values
                .split(['|', ','])
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| {
                    v.parse::<f64>()
                        .map_err(|_| grid_error(format!("'{key}': '{v}' is not a number")))
                })
                .collect::<Result<Vec<f64>, _>>()?;
            if axes.insert(key.clone(), values).is_some() {
                return Err(grid_error(format!("'{key}' given more than once")));
            }
        }
        Ok(ParamGrid { axes })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(String::as_str)
    }

    /// Number of combinations; an empty grid has exactly one (the base params).
    pub fn len(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn combinations(&self) -> Vec<BTreeMap<String, f64>> {
        let mut combos = vec![BTreeMap::new()];
        for (key, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |&v| {
                        let mut next = combo.clone();
                        next.insert(key.clone(), v);
                        next
                    })
                })
                .collect();
        }
        combos
    }

    /// Applies every combination to `base`. The first invalid combination
    /// fails the whole grid.
    pub fn expand(&self, base: &StrategyParams) -> Result<Vec<StrategyParams>, StriderError> {
        self.combinations()
            .iter()
            .map(|combo| {
                StrategyParams::from_map(base, combo).map_err(|e| StriderError::InvalidParams {
                    reason: format!("grid combination {combo:?}: {e}"),
                })
            })
            .collect()
    }
}
