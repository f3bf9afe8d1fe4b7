//! Typed settings loaded from a `ConfigPort`.
//!
//! Every section is parsed and range-checked here, before any data is read
//! or any day is simulated. Absent keys take their defaults; present but
//! malformed values are errors.

use chrono::NaiveDate;
use std::path::PathBuf;

use crate::domain::backtest::{BacktestConfig, DateWindow};
use crate::domain::error::StriderError;
use crate::domain::execution::{ExecutionConfig, FillConvention, TieBreak};
use crate::domain::features::IndicatorSet;
use crate::domain::indicator::IndicatorType;
use crate::domain::param_grid::ParamGrid;
use crate::domain::regime::RegimeConfig;
use crate::domain::risk_budget::RiskBudgetConfig;
use crate::domain::strategy::params::PARAM_KEYS;
use crate::domain::strategy::{StrategyParams, StrategyRegistry};
use crate::domain::universe::parse_symbols;
use crate::domain::walk_forward::{WalkForwardConfig, WindowMode};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_STRATEGY: &str = "long_trend";
pub const DEFAULT_RS_PERIOD: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Csv { dir: PathBuf },
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub data: DataSource,
    pub start_date: Option<NaiveDate>,
    /// Inclusive.
    pub end_date: Option<NaiveDate>,
    pub symbols: Vec<String>,
    pub benchmark: Option<String>,
    pub rs_period: usize,
    /// Computed for every symbol on top of what the strategy requires.
    pub indicators: Vec<IndicatorType>,
    pub strategy: String,
    pub params: StrategyParams,
    pub backtest: BacktestConfig,
    pub walk_forward: WalkForwardConfig,
    pub grid: ParamGrid,
    pub cache_dir: Option<PathBuf>,
    pub run_store: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            data: DataSource::Csv {
                dir: PathBuf::from("data"),
            },
            start_date: None,
            end_date: None,
            symbols: Vec::new(),
            benchmark: None,
            rs_period: DEFAULT_RS_PERIOD,
            indicators: Vec::new(),
            strategy: DEFAULT_STRATEGY.to_string(),
            params: StrategyParams::default(),
            backtest: BacktestConfig::default(),
            walk_forward: WalkForwardConfig::default(),
            grid: ParamGrid::default(),
            cache_dir: None,
            run_store: None,
        }
    }
}

impl RunSettings {
    /// The simulated range, end date included.
    pub fn window(&self) -> Result<DateWindow, StriderError> {
        let start = self.start_date.ok_or_else(|| missing("backtest", "start_date"))?;
        let end = self.end_date.ok_or_else(|| missing("backtest", "end_date"))?;
        DateWindow::inclusive(start, end)
    }

    /// Feature set for `required` plus the configured extra indicators.
    pub fn indicator_set(&self, required: Vec<IndicatorType>) -> IndicatorSet {
        IndicatorSet::new(
            required.into_iter().chain(self.indicators.iter().cloned()),
            self.rs_period,
            self.benchmark.clone(),
        )
    }

    /// Cross-field checks that only make sense once overrides are applied.
    pub fn validate(&self, registry: &StrategyRegistry) -> Result<(), StriderError> {
        self.window()?;
        if self.symbols.is_empty() {
            return Err(StriderError::ConfigInvalid {
                section: "universe".into(),
                key: "symbols".into(),
                reason: "symbol list is empty".into(),
            });
        }
        if !registry.contains(&self.strategy) {
            return Err(StriderError::UnknownStrategy {
                name: self.strategy.clone(),
            });
        }
        self.params.validate()?;
        self.backtest.validate()?;
        self.walk_forward.validate()?;
        self.grid.expand(&self.params)?;
        Ok(())
    }
}

/// Reads every section. Does not require dates or symbols, which the
/// command line may still supply; call [`RunSettings::validate`] afterwards.
pub fn load_settings(config: &dyn ConfigPort) -> Result<RunSettings, StriderError> {
    let (start_date, end_date) = load_dates(config)?;
    let (symbols, benchmark, rs_period) = load_universe(config)?;
    let (strategy, params) = load_strategy(config)?;

    Ok(RunSettings {
        data: load_data_source(config)?,
        start_date,
        end_date,
        symbols,
        benchmark,
        rs_period,
        indicators: load_indicators(config)?,
        strategy,
        params,
        backtest: load_backtest(config)?,
        walk_forward: load_walk_forward(config)?,
        grid: ParamGrid::parse(&config.get_string("walk_forward", "grid").unwrap_or_default())?,
        cache_dir: config.get_string("cache", "dir").map(PathBuf::from),
        run_store: config.get_string("run_store", "path").map(PathBuf::from),
    })
}

fn missing(section: &str, key: &str) -> StriderError {
    StriderError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StriderError {
    StriderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str, default: f64) -> Result<f64, StriderError> {
    let value = config.get_double(section, key)?.unwrap_or(default);
    if !(value.is_finite() && value >= 0.0) {
        return Err(invalid(section, key, format!("{key} must be non-negative")));
    }
    Ok(value)
}

fn count(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, StriderError> {
    match config.get_int(section, key)? {
        None => Ok(default),
        Some(v) if v >= 0 => Ok(v as usize),
        Some(v) => Err(invalid(section, key, format!("{key} must be non-negative, got {v}"))),
    }
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, StriderError> {
    config
        .get_string("backtest", key)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| invalid("backtest", key, format!("invalid {key} format, expected YYYY-MM-DD")))
        })
        .transpose()
}

fn load_data_source(config: &dyn ConfigPort) -> Result<DataSource, StriderError> {
    let source = config.get_string("data", "source").unwrap_or_else(|| "csv".into());
    match source.to_ascii_lowercase().as_str() {
        "csv" => Ok(DataSource::Csv {
            dir: PathBuf::from(config.get_string("data", "csv_dir").unwrap_or_else(|| "data".into())),
        }),
        "sqlite" => {
            let path = config
                .get_string("data", "sqlite_path")
                .ok_or_else(|| missing("data", "sqlite_path"))?;
            Ok(DataSource::Sqlite {
                path: PathBuf::from(path),
            })
        }
        other => Err(invalid("data", "source", format!("expected csv or sqlite, got '{other}'"))),
    }
}

fn load_dates(config: &dyn ConfigPort) -> Result<(Option<NaiveDate>, Option<NaiveDate>), StriderError> {
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid("backtest", "start_date", "start_date must not be after end_date"));
        }
    }
    Ok((start, end))
}

fn load_universe(config: &dyn ConfigPort) -> Result<(Vec<String>, Option<String>, usize), StriderError> {
    let symbols = match config.get_string("universe", "symbols") {
        Some(raw) => parse_symbols(&raw)?,
        None => Vec::new(),
    };
    let benchmark = config
        .get_string("universe", "benchmark")
        .map(|b| b.to_ascii_uppercase());
    let rs_period = count(config, "features", "rs_period", DEFAULT_RS_PERIOD)?;
    Ok((symbols, benchmark, rs_period))
}

fn load_indicators(config: &dyn ConfigPort) -> Result<Vec<IndicatorType>, StriderError> {
    let Some(raw) = config.get_string("features", "indicators") else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            item.parse::<IndicatorType>()
                .map_err(|reason| invalid("features", "indicators", reason))
        })
        .collect()
}

fn load_strategy(config: &dyn ConfigPort) -> Result<(String, StrategyParams), StriderError> {
    let name = config
        .get_string("strategy", "name")
        .unwrap_or_else(|| DEFAULT_STRATEGY.to_string());

    let mut overrides = std::collections::BTreeMap::new();
    for key in PARAM_KEYS {
        if let Some(value) = config.get_double("strategy", key)? {
            overrides.insert(key.to_string(), value);
        }
    }
    let params = StrategyParams::from_map(&StrategyParams::default(), &overrides)?;
    Ok((name, params))
}

fn load_execution(config: &dyn ConfigPort) -> Result<ExecutionConfig, StriderError> {
    let defaults = ExecutionConfig::default();
    let fill_convention = match config.get_string("backtest", "fill_convention") {
        None => defaults.fill_convention,
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "open" => FillConvention::Open,
            "close" => FillConvention::Close,
            other => {
                return Err(invalid(
                    "backtest",
                    "fill_convention",
                    format!("expected open or close, got '{other}'"),
                ));
            }
        },
    };
    let tie_break = match config.get_string("backtest", "tie_break") {
        None => defaults.tie_break,
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "conservative" => TieBreak::Conservative,
            "optimistic" => TieBreak::Optimistic,
            other => {
                return Err(invalid(
                    "backtest",
                    "tie_break",
                    format!("expected conservative or optimistic, got '{other}'"),
                ));
            }
        },
    };

    let slippage_pct = non_negative(config, "backtest", "slippage_pct", defaults.slippage_pct)?;
    if slippage_pct >= 100.0 {
        return Err(invalid("backtest", "slippage_pct", "slippage_pct must be below 100"));
    }

    Ok(ExecutionConfig {
        commission_per_trade: non_negative(config, "backtest", "commission_per_trade", defaults.commission_per_trade)?,
        commission_pct: non_negative(config, "backtest", "commission_pct", defaults.commission_pct)?,
        slippage_pct,
        allow_shorting: config
            .get_bool("backtest", "allow_shorting")?
            .unwrap_or(defaults.allow_shorting),
        whole_shares: config
            .get_bool("backtest", "whole_shares")?
            .unwrap_or(defaults.whole_shares),
        fill_convention,
        tie_break,
    })
}

fn load_regime(config: &dyn ConfigPort) -> Result<RegimeConfig, StriderError> {
    let defaults = RegimeConfig::default();
    let regime = RegimeConfig {
        ma_period: count(config, "regime", "ma_period", defaults.ma_period)?,
        slope_lookback: count(config, "regime", "slope_lookback", defaults.slope_lookback)?,
        adx_period: count(config, "regime", "adx_period", defaults.adx_period)?,
        trend_threshold: non_negative(config, "regime", "trend_threshold", defaults.trend_threshold)?,
        confirm_days: count(config, "regime", "confirm_days", defaults.confirm_days)?,
    };
    for (key, value) in [
        ("ma_period", regime.ma_period),
        ("slope_lookback", regime.slope_lookback),
        ("adx_period", regime.adx_period),
    ] {
        if value == 0 {
            return Err(invalid("regime", key, format!("{key} must be positive")));
        }
    }
    Ok(regime)
}

fn load_risk(config: &dyn ConfigPort) -> Result<RiskBudgetConfig, StriderError> {
    let defaults = RiskBudgetConfig::default();
    let steps = match config.get_string("risk", "drawdown_steps") {
        Some(raw) => RiskBudgetConfig::parse_steps(&raw)?,
        None => defaults.steps,
    };
    let risk = RiskBudgetConfig {
        steps,
        halt_drawdown: config
            .get_double("risk", "halt_drawdown")?
            .unwrap_or(defaults.halt_drawdown),
        cooldown_days: count(config, "risk", "cooldown_days", defaults.cooldown_days)?,
    };
    risk.validate()?;
    Ok(risk)
}

fn load_backtest(config: &dyn ConfigPort) -> Result<BacktestConfig, StriderError> {
    let defaults = BacktestConfig::default();
    let initial_capital = config
        .get_double("backtest", "initial_capital")?
        .unwrap_or(defaults.initial_capital);
    if !(initial_capital.is_finite() && initial_capital > 0.0) {
        return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
    }

    Ok(BacktestConfig {
        initial_capital,
        execution: load_execution(config)?,
        risk: load_risk(config)?,
        regime: load_regime(config)?,
        forward_fill_gaps: config
            .get_bool("backtest", "forward_fill_gaps")?
            .unwrap_or(defaults.forward_fill_gaps),
        close_at_end: config
            .get_bool("backtest", "close_at_end")?
            .unwrap_or(defaults.close_at_end),
    })
}

fn load_walk_forward(config: &dyn ConfigPort) -> Result<WalkForwardConfig, StriderError> {
    let defaults = WalkForwardConfig::default();
    let days = |key: &str, default: u32| -> Result<u32, StriderError> {
        match config.get_int("walk_forward", key)? {
            None => Ok(default),
            Some(v) if v > 0 && v <= u32::MAX as i64 => Ok(v as u32),
            Some(v) => Err(invalid("walk_forward", key, format!("{key} must be positive, got {v}"))),
        }
    };

    let mode = match config.get_string("walk_forward", "mode") {
        Some(s) => s.parse::<WindowMode>()?,
        None => defaults.mode,
    };
    let threads = match config.get_int("walk_forward", "threads")? {
        None => None,
        Some(n) if n > 0 => Some(n as usize),
        Some(n) => return Err(invalid("walk_forward", "threads", format!("threads must be positive, got {n}"))),
    };
    let risk_free_rate = config
        .get_double("walk_forward", "risk_free_rate")?
        .unwrap_or(defaults.risk_free_rate);
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(invalid("walk_forward", "risk_free_rate", "risk_free_rate must be within [0, 1)"));
    }

    Ok(WalkForwardConfig {
        train_days: days("train_days", defaults.train_days)?,
        test_days: days("test_days", defaults.test_days)?,
        step_days: days("step_days", defaults.step_days)?,
        mode,
        threads,
        risk_free_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const FULL: &str = r#"
[data]
source = csv
csv_dir = ./fixtures

[backtest]
start_date = 2020-01-01
end_date = 2022-12-31
initial_capital = 50000
commission_per_trade = 5
commission_pct = 0.1
slippage_pct = 0.05
fill_convention = close
tie_break = optimistic
forward_fill_gaps = yes

[universe]
symbols = aaa, BBB ,ccc
benchmark = spy

[features]
rs_period = 63
indicators = ema:20, atr:14,stddev:10

[strategy]
name = mean_reversion
holding_horizon = 7
take_profit_pct = 4

[regime]
confirm_days = 3

[risk]
drawdown_steps = 0.05:0.75,0.1:0.5
halt_drawdown = 0.3
cooldown_days = 5

[walk_forward]
train_days = 180
test_days = 30
step_days = 30
mode = anchored
grid = holding_horizon=5|10;take_profit_pct=3,5
threads = 4

[cache]
dir = /tmp/strider-cache

[run_store]
path = runs.db
"#;

    #[test]
    fn full_config_loads() {
        let s = load_settings(&make_config(FULL)).unwrap();

        assert_eq!(
            s.data,
            DataSource::Csv {
                dir: PathBuf::from("./fixtures")
            }
        );
        assert_eq!(s.symbols, vec!["AAA", "BBB", "CCC"]);
        assert_eq!(s.benchmark.as_deref(), Some("SPY"));
        assert_eq!(s.rs_period, 63);
        assert_eq!(
            s.indicators,
            vec![IndicatorType::Ema(20), IndicatorType::Atr(14), IndicatorType::Stddev(10)]
        );
        assert_eq!(s.strategy, "mean_reversion");
        assert_eq!(s.params.holding_horizon, 7);
        assert_eq!(s.params.take_profit_pct, 4.0);
        assert_eq!(s.backtest.initial_capital, 50_000.0);
        assert_eq!(s.backtest.execution.fill_convention, FillConvention::Close);
        assert_eq!(s.backtest.execution.tie_break, TieBreak::Optimistic);
        assert!(s.backtest.forward_fill_gaps);
        assert!(s.backtest.close_at_end);
        assert_eq!(s.backtest.regime.confirm_days, 3);
        assert_eq!(s.backtest.risk.steps, vec![(0.05, 0.75), (0.1, 0.5)]);
        assert_eq!(s.walk_forward.mode, WindowMode::Anchored);
        assert_eq!(s.walk_forward.threads, Some(4));
        assert_eq!(s.grid.len(), 4);
        assert_eq!(s.cache_dir, Some(PathBuf::from("/tmp/strider-cache")));
        assert_eq!(s.run_store, Some(PathBuf::from("runs.db")));

        let window = s.window().unwrap();
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        s.validate(&StrategyRegistry::with_builtins()).unwrap();
    }

    #[test]
    fn empty_config_uses_defaults() {
        let s = load_settings(&make_config("")).unwrap();
        assert_eq!(s, RunSettings::default());
    }

    #[test]
    fn missing_dates_fail_window() {
        let s = load_settings(&make_config("[backtest]\nstart_date = 2020-01-01\n")).unwrap();
        let err = s.window().unwrap_err();
        assert!(matches!(err, StriderError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn unknown_indicator_fails() {
        let err = load_settings(&make_config("[features]\nindicators = ema:20,vwap:5\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "indicators"));
    }

    #[test]
    fn extra_indicators_join_the_strategy_set() {
        let s = load_settings(&make_config("[features]\nindicators = atr:14,rsi:14\n")).unwrap();
        let set = s.indicator_set(vec![IndicatorType::Rsi(14)]);
        assert_eq!(set.indicators(), &[IndicatorType::Rsi(14), IndicatorType::Atr(14)]);
    }

    #[test]
    fn invalid_date_format_fails() {
        let err = load_settings(&make_config("[backtest]\nstart_date = 01/02/2020\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn start_after_end_fails() {
        let err = load_settings(&make_config(
            "[backtest]\nstart_date = 2021-01-01\nend_date = 2020-01-01\n",
        ))
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        for raw in ["0", "-10"] {
            let err = load_settings(&make_config(&format!("[backtest]\ninitial_capital = {raw}\n")))
                .unwrap_err();
            assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "initial_capital"));
        }
    }

    #[test]
    fn negative_commission_fails() {
        let err = load_settings(&make_config("[backtest]\ncommission_pct = -0.1\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "commission_pct"));
    }

    #[test]
    fn unknown_fill_convention_fails() {
        let err = load_settings(&make_config("[backtest]\nfill_convention = vwap\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "fill_convention"));
    }

    #[test]
    fn sqlite_source_requires_path() {
        let err = load_settings(&make_config("[data]\nsource = sqlite\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigMissing { key, .. } if key == "sqlite_path"));

        let s = load_settings(&make_config("[data]\nsource = sqlite\nsqlite_path = bars.db\n")).unwrap();
        assert_eq!(
            s.data,
            DataSource::Sqlite {
                path: PathBuf::from("bars.db")
            }
        );
    }

    #[test]
    fn invalid_strategy_params_fail_fast() {
        let err = load_settings(&make_config("[strategy]\nholding_horizon = 0\n")).unwrap_err();
        assert!(matches!(err, StriderError::InvalidParams { .. }));
    }

    #[test]
    fn duplicate_symbols_fail() {
        let err = load_settings(&make_config("[universe]\nsymbols = AAA,aaa\n")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn non_increasing_risk_steps_fail() {
        let err = load_settings(&make_config("[risk]\ndrawdown_steps = 0.2:0.5,0.1:0.25\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { section, .. } if section == "risk"));
    }

    #[test]
    fn zero_window_length_fails() {
        let err = load_settings(&make_config("[walk_forward]\ntest_days = 0\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "test_days"));
    }

    #[test]
    fn bad_grid_fails() {
        let err = load_settings(&make_config("[walk_forward]\ngrid = holding_horizon=\n")).unwrap_err();
        assert!(matches!(err, StriderError::ConfigInvalid { key, .. } if key == "grid"));
    }

    #[test]
    fn validate_requires_symbols_and_known_strategy() {
        let registry = StrategyRegistry::with_builtins();
        let mut s = load_settings(&make_config(FULL)).unwrap();
        s.symbols.clear();
        assert!(matches!(
            s.validate(&registry),
            Err(StriderError::ConfigInvalid { key, .. }) if key == "symbols"
        ));

        let mut s = load_settings(&make_config(FULL)).unwrap();
        s.strategy = "nope".into();
        assert!(matches!(s.validate(&registry), Err(StriderError::UnknownStrategy { .. })));
    }

    #[test]
    fn validate_rejects_grid_combinations_that_break_params() {
        let registry = StrategyRegistry::with_builtins();
        let mut s = load_settings(&make_config(FULL)).unwrap();
        s.grid = ParamGrid::parse("exposure=0.5|1.5").unwrap();
        assert!(matches!(s.validate(&registry), Err(StriderError::InvalidParams { .. })));
    }
}
