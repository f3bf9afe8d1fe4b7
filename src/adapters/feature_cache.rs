//! Content-addressed feature cache.
//!
//! Entries are keyed by the SHA-256 of the JSON-serialised inputs: symbol,
//! range, indicator set, and the bars themselves (plus benchmark bars when
//! relative strength is requested). Changed source data therefore misses
//! instead of serving stale rows. Rows live in a `DashMap` and, when a
//! directory is configured, in `<key>.json` files written via temp file and
//! rename.

use dashmap::DashMap;
use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::backtest::DateWindow;
use crate::domain::error::StriderError;
use crate::domain::features::{FeatureRow, IndicatorSet, compute_features};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use crate::ports::feature_cache_port::FeatureCachePort;

#[derive(Serialize)]
struct CacheKey<'a> {
    symbol: &'a str,
    range: DateWindow,
    indicators: &'a IndicatorSet,
    bars: &'a [OhlcvBar],
    benchmark: Option<&'a [OhlcvBar]>,
}

pub struct FeatureCache {
    data: Arc<dyn DataPort>,
    memory: DashMap<String, Arc<Vec<FeatureRow>>>,
    dir: Option<PathBuf>,
    computations: AtomicUsize,
    temp_counter: AtomicUsize,
}

impl FeatureCache {
    pub fn in_memory(data: Arc<dyn DataPort>) -> Self {
        Self {
            data,
            memory: DashMap::new(),
            dir: None,
            computations: AtomicUsize::new(0),
            temp_counter: AtomicUsize::new(0),
        }
    }

    /// Memory cache backed by JSON files under `dir`, created if missing.
    pub fn with_dir(data: Arc<dyn DataPort>, dir: PathBuf) -> Result<Self, StriderError> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: Some(dir),
            ..Self::in_memory(data)
        })
    }

    /// Number of times rows were actually computed rather than served.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    fn key(
        symbol: &str,
        range: DateWindow,
        indicators: &IndicatorSet,
        bars: &[OhlcvBar],
        benchmark: Option<&[OhlcvBar]>,
    ) -> Result<String, StriderError> {
        let json = serde_json::to_vec(&CacheKey {
            symbol,
            range,
            indicators,
            bars,
            benchmark,
        })?;
        Ok(format!("{:x}", Sha256::digest(&json)))
    }

    fn benchmark_bars(
        &self,
        indicators: &IndicatorSet,
        range: DateWindow,
        last: chrono::NaiveDate,
    ) -> Result<Option<Vec<OhlcvBar>>, StriderError> {
        let Some(benchmark) = indicators.benchmark.as_deref() else {
            return Ok(None);
        };
        if indicators.rs_period == 0 {
            return Ok(None);
        }
        match self.data.fetch(benchmark, range.start, last) {
            Ok(bars) => Ok(Some(bars)),
            Err(StriderError::DataUnavailable { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_file(path: &Path) -> Option<Vec<FeatureRow>> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(rows) => Some(rows),
            Err(e) => {
                warn!("ignoring unreadable cache file {}: {e}", path.display());
                None
            }
        }
    }

    fn write_file(&self, dir: &Path, key: &str, rows: &[FeatureRow]) -> Result<(), StriderError> {
        let n = self.temp_counter.fetch_add(1, Ordering::SeqCst);
        let tmp = dir.join(format!("{key}.{}-{n}.tmp", std::process::id()));
        fs::write(&tmp, serde_json::to_vec(rows)?)?;
        fs::rename(&tmp, dir.join(format!("{key}.json")))?;
        Ok(())
    }
}

impl FeatureCachePort for FeatureCache {
    fn get_or_compute(
        &self,
        symbol: &str,
        range: DateWindow,
        indicators: &IndicatorSet,
    ) -> Result<Arc<Vec<FeatureRow>>, StriderError> {
        let last = range.end.pred_opt().unwrap_or(range.end);
        let bars = self.data.fetch(symbol, range.start, last)?;
        let benchmark = self.benchmark_bars(indicators, range, last)?;
        let key = Self::key(symbol, range, indicators, &bars, benchmark.as_deref())?;

        if let Some(rows) = self.memory.get(&key) {
            debug!("feature cache hit for {symbol} {range}");
            return Ok(Arc::clone(rows.value()));
        }

        if let Some(dir) = &self.dir {
            if let Some(rows) = Self::read_file(&dir.join(format!("{key}.json"))) {
                debug!("feature cache file hit for {symbol} {range}");
                let rows = Arc::new(rows);
                self.memory.insert(key, Arc::clone(&rows));
                return Ok(rows);
            }
        }

        let rows = compute_features(symbol, &bars, benchmark.as_deref(), indicators);
        self.computations.fetch_add(1, Ordering::SeqCst);
        debug!("computed {} feature rows for {symbol} {range}", rows.len());

        if let Some(dir) = &self.dir {
            self.write_file(dir, &key, &rows)?;
        }
        let rows = Arc::new(rows);
        self.memory.insert(key, Arc::clone(&rows));
        Ok(rows)
    }
}
