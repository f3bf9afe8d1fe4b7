//! In-memory market snapshot and unified timeline.
//!
//! A snapshot is loaded completely before any simulation starts and is never
//! mutated afterwards. `up_to` produces the causally restricted view handed
//! to parameter selection.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::features::FeatureRow;
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone)]
pub struct SymbolData {
    pub symbol: String,
    pub bars: Vec<OhlcvBar>,
    /// Aligned one-to-one with `bars`.
    pub features: Vec<FeatureRow>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SymbolData {
    pub fn new(symbol: String, bars: Vec<OhlcvBar>, features: Vec<FeatureRow>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            symbol,
            bars,
            features,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn get_features(&self, date: NaiveDate) -> Option<&FeatureRow> {
        self.date_index.get(&date).and_then(|&i| self.features.get(i))
    }

    /// Most recent row dated on or before `date`.
    pub fn latest_features(&self, date: NaiveDate) -> Option<&FeatureRow> {
        let idx = self.bars.partition_point(|b| b.date <= date);
        idx.checked_sub(1).and_then(|i| self.features.get(i))
    }

    /// Most recent close dated on or before `date`.
    pub fn latest_close(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.bars.partition_point(|b| b.date <= date);
        idx.checked_sub(1).map(|i| self.bars[i].close)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    fn truncated(&self, end_exclusive: NaiveDate) -> SymbolData {
        let keep = self.bars.partition_point(|b| b.date < end_exclusive);
        SymbolData::new(
            self.symbol.clone(),
            self.bars[..keep].to_vec(),
            self.features[..keep.min(self.features.len())].to_vec(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub symbols: BTreeMap<String, Arc<SymbolData>>,
    pub benchmark: Option<Arc<SymbolData>>,
    pub timeline: Vec<NaiveDate>,
}

impl MarketSnapshot {
    pub fn new(symbols: Vec<SymbolData>, benchmark: Option<SymbolData>) -> Self {
        let timeline = build_unified_timeline(&symbols);
        MarketSnapshot {
            symbols: symbols
                .into_iter()
                .map(|sd| (sd.symbol.clone(), Arc::new(sd)))
                .collect(),
            benchmark: benchmark.map(Arc::new),
            timeline,
        }
    }

    /// A view holding only data dated strictly before `end_exclusive`.
    pub fn up_to(&self, end_exclusive: NaiveDate) -> MarketSnapshot {
        MarketSnapshot {
            symbols: self
                .symbols
                .iter()
                .map(|(k, sd)| (k.clone(), Arc::new(sd.truncated(end_exclusive))))
                .collect(),
            benchmark: self
                .benchmark
                .as_ref()
                .map(|b| Arc::new(b.truncated(end_exclusive))),
            timeline: self
                .timeline
                .iter()
                .copied()
                .take_while(|d| *d < end_exclusive)
                .collect(),
        }
    }

    /// Latest date present anywhere in the snapshot.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.symbols
            .values()
            .filter_map(|sd| sd.last_date())
            .chain(self.benchmark.iter().filter_map(|b| b.last_date()))
            .max()
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolData> {
        self.symbols.get(symbol).map(|sd| sd.as_ref())
    }
}

/// Sorted union of every trading date across the given symbols.
pub fn build_unified_timeline(symbols: &[SymbolData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = symbols
        .iter()
        .flat_map(|sd| sd.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
