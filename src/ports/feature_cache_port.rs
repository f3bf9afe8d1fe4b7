//! Feature cache port trait.

use std::sync::Arc;

use crate::domain::backtest::DateWindow;
use crate::domain::error::StriderError;
use crate::domain::features::{FeatureRow, IndicatorSet};

/// Shared, content-addressed store of feature rows. Identical arguments
/// always yield identical rows, computed at most once per cache instance.
pub trait FeatureCachePort: Send + Sync {
    fn get_or_compute(
        &self,
        symbol: &str,
        range: DateWindow,
        indicators: &IndicatorSet,
    ) -> Result<Arc<Vec<FeatureRow>>, StriderError>;
}
