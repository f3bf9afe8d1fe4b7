//! CLI definition and dispatch.
//!
//! Every command loads settings from an optional INI file, applies flag
//! overrides, validates, and only then touches market data. Progress and
//! summaries go to stderr; reports are JSON files.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::feature_cache::FeatureCache;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::backtest::run_backtest;
use crate::domain::config_validation::{DataSource, RunSettings, load_settings};
use crate::domain::error::StriderError;
use crate::domain::metrics::Metrics;
use crate::domain::monte_carlo::{MonteCarloConfig, ResampleMode, simulate};
use crate::domain::param_grid::ParamGrid;
use crate::domain::strategy::StrategyRegistry;
use crate::domain::universe::{UniverseLoader, parse_symbols, required_indicators};
use crate::domain::walk_forward::{
    CancellationToken, PeriodOutcome, WalkForwardOptimizer, WalkForwardReport, WindowMode,
};
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{BacktestReport, ReportPort};
use crate::ports::run_store_port::{RunRecord, RunStorePort};

#[derive(Parser, Debug)]
#[command(name = "strider", about = "Walk-forward backtesting and optimization")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every command that simulates.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// INI configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Registered strategy name
    #[arg(short, long)]
    pub strategy: Option<String>,
    /// Comma-separated symbol list
    #[arg(long)]
    pub symbols: Option<String>,
    #[arg(long)]
    pub start: Option<NaiveDate>,
    /// Last simulated date, inclusive
    #[arg(long)]
    pub end: Option<NaiveDate>,
    /// Directory of <SYMBOL>.csv files; selects the CSV source
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest
    Backtest {
        #[command(flatten)]
        run: RunArgs,
        /// Monte Carlo iterations over the closed trades
        #[arg(long, requires = "seed")]
        monte_carlo: Option<usize>,
        /// Seed for Monte Carlo resampling
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value = "reorder")]
        mc_mode: ResampleMode,
    },
    /// Run a walk-forward optimization over a parameter grid
    WalkForward {
        #[command(flatten)]
        run: RunArgs,
        /// `key=v1|v2;key2=v3` or a JSON object of arrays
        #[arg(long)]
        grid: Option<String>,
        #[arg(long)]
        train_days: Option<u32>,
        #[arg(long)]
        test_days: Option<u32>,
        #[arg(long)]
        step_days: Option<u32>,
        /// Grow the training window from the range start instead of rolling it
        #[arg(long)]
        anchored: bool,
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Validate configuration without simulating
    Validate {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show a stored run, or list stored runs when no id is given
    ShowRun {
        run_id: Option<String>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Run store database; overrides [run_store] path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// List registered strategies
    ListStrategies,
}

/// Knobs for the single-backtest pipeline that do not live in config.
#[derive(Debug, Clone, Default)]
pub struct BacktestOptions {
    pub monte_carlo: Option<MonteCarloConfig>,
    pub output: Option<PathBuf>,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            run,
            monte_carlo,
            seed,
            mc_mode,
        } => {
            let monte_carlo = match (monte_carlo, seed) {
                (Some(iterations), Some(seed)) => Some(MonteCarloConfig {
                    mode: mc_mode,
                    ..MonteCarloConfig::new(iterations, seed)
                }),
                _ => None,
            };
            run_backtest_command(&run, monte_carlo)
        }
        Command::WalkForward {
            run,
            grid,
            train_days,
            test_days,
            step_days,
            anchored,
            threads,
        } => resolve_settings(&run).and_then(|mut settings| {
            if let Some(raw) = grid {
                settings.grid = ParamGrid::parse(&raw)?;
            }
            let wf = &mut settings.walk_forward;
            wf.train_days = train_days.unwrap_or(wf.train_days);
            wf.test_days = test_days.unwrap_or(wf.test_days);
            wf.step_days = step_days.unwrap_or(wf.step_days);
            if anchored {
                wf.mode = WindowMode::Anchored;
            }
            if threads.is_some() {
                wf.threads = threads;
            }
            run_walk_forward_command(&settings, run.output.as_deref())
        }),
        Command::Validate { run } => run_validate(&run),
        Command::ShowRun { run_id, config, db } => run_show_run(run_id.as_deref(), config.as_deref(), db),
        Command::ListStrategies => {
            for name in StrategyRegistry::with_builtins().names() {
                println!("{name}");
            }
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, StriderError> {
    match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            FileConfigAdapter::from_file(path)
        }
        None => FileConfigAdapter::from_string(""),
    }
}

/// Config file values with command-line flags applied on top.
pub fn resolve_settings(args: &RunArgs) -> Result<RunSettings, StriderError> {
    let adapter = load_config(args.config.as_deref())?;
    let mut settings = load_settings(&adapter)?;
    apply_overrides(&mut settings, args)?;
    settings.validate(&StrategyRegistry::with_builtins())?;
    Ok(settings)
}

pub fn apply_overrides(settings: &mut RunSettings, args: &RunArgs) -> Result<(), StriderError> {
    if let Some(name) = &args.strategy {
        settings.strategy = name.clone();
    }
    if let Some(raw) = &args.symbols {
        settings.symbols = parse_symbols(raw)?;
    }
    if args.start.is_some() {
        settings.start_date = args.start;
    }
    if args.end.is_some() {
        settings.end_date = args.end;
    }
    if let Some(dir) = &args.data_dir {
        settings.data = DataSource::Csv { dir: dir.clone() };
    }
    Ok(())
}

pub fn open_data_source(source: &DataSource) -> Result<Arc<dyn DataPort>, StriderError> {
    match source {
        DataSource::Csv { dir } => Ok(Arc::new(CsvAdapter::new(dir.clone()))),
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite { path } => Ok(Arc::new(
            crate::adapters::sqlite_adapter::SqliteAdapter::open(path, 4)?,
        )),
        #[cfg(not(feature = "sqlite"))]
        DataSource::Sqlite { .. } => Err(StriderError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: "built without the sqlite feature".into(),
        }),
    }
}

fn open_run_store(path: &Path) -> Result<Box<dyn RunStorePort>, StriderError> {
    #[cfg(feature = "sqlite")]
    {
        Ok(Box::new(crate::adapters::sqlite_adapter::SqliteAdapter::open(path, 1)?))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Err(StriderError::ConfigInvalid {
            section: "run_store".into(),
            key: "path".into(),
            reason: format!("{} needs the sqlite feature", path.display()),
        })
    }
}

fn feature_cache(data: Arc<dyn DataPort>, settings: &RunSettings) -> Result<FeatureCache, StriderError> {
    match &settings.cache_dir {
        Some(dir) => FeatureCache::with_dir(data, dir.clone()),
        None => Ok(FeatureCache::in_memory(data)),
    }
}

fn run_backtest_command(args: &RunArgs, monte_carlo: Option<MonteCarloConfig>) -> Result<(), StriderError> {
    let settings = resolve_settings(args)?;
    let data = open_data_source(&settings.data)?;
    let options = BacktestOptions {
        monte_carlo,
        output: args.output.clone(),
    };
    let report = run_backtest_pipeline(data, &settings, &options)?;
    if let Some(id) = &report.run_id {
        eprintln!("Run stored as {id}");
    }
    Ok(())
}

/// Loads data, runs one backtest over the settings window, prints a
/// summary and writes the JSON report.
pub fn run_backtest_pipeline(
    data: Arc<dyn DataPort>,
    settings: &RunSettings,
    options: &BacktestOptions,
) -> Result<BacktestReport, StriderError> {
    let registry = StrategyRegistry::with_builtins();
    let window = settings.window()?;
    let strategy = registry.create(&settings.strategy, settings.params.clone())?;
    eprintln!("Strategy: {}", strategy.name());

    let cache = feature_cache(Arc::clone(&data), settings)?;
    let set = settings.indicator_set(strategy.required_indicators());
    let loaded = UniverseLoader::new(data.as_ref(), &cache).load(
        &settings.symbols,
        settings.benchmark.as_deref(),
        window,
        &set,
        &settings.backtest.regime,
    )?;
    let symbols = loaded.symbols();

    eprintln!("Running backtest: {} symbols, {}", symbols.len(), window);
    let result = run_backtest(&loaded.snapshot, strategy.as_ref(), &settings.backtest, window)?;
    let metrics = Metrics::from_result(&result, settings.walk_forward.risk_free_rate);
    print_metrics(&metrics);

    let monte_carlo = options
        .monte_carlo
        .as_ref()
        .map(|mc| simulate(&result.trades, result.initial_capital, mc));
    if let Some(mc) = &monte_carlo {
        eprintln!(
            "Monte Carlo ({} x {:?}, seed {}): max drawdown p5/p50/p95 {:.1}% / {:.1}% / {:.1}%",
            mc.config.iterations,
            mc.config.mode,
            mc.config.seed,
            mc.max_drawdown.p5 * 100.0,
            mc.max_drawdown.p50 * 100.0,
            mc.max_drawdown.p95 * 100.0,
        );
    }

    let run_id = match &settings.run_store {
        Some(path) => {
            let record = RunRecord {
                strategy: settings.strategy.clone(),
                params: settings.params.clone(),
                config: settings.backtest.clone(),
                window,
                symbols: symbols.clone(),
                trades: result.trades.clone(),
                equity_curve: result.equity_curve.clone(),
                metrics: metrics.clone(),
            };
            Some(open_run_store(path)?.save_run(&record)?)
        }
        None => None,
    };

    let report = BacktestReport {
        run_id,
        strategy: settings.strategy.clone(),
        params: settings.params.clone(),
        window,
        symbols,
        metrics,
        trades: result.trades,
        equity_curve: result.equity_curve,
        gaps: result.gaps,
        monte_carlo,
    };

    let output = options
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("backtest.json"));
    JsonReportAdapter::new().write_backtest(&report, &output)?;
    eprintln!("\nReport written to: {}", output.display());
    Ok(report)
}

fn run_walk_forward_command(settings: &RunSettings, output: Option<&Path>) -> Result<(), StriderError> {
    settings.validate(&StrategyRegistry::with_builtins())?;
    let data = open_data_source(&settings.data)?;
    run_walk_forward_pipeline(data, settings, output, &CancellationToken::new())?;
    Ok(())
}

/// Loads data once for the whole range, optimizes, prints the per-period
/// table and writes the JSON report.
pub fn run_walk_forward_pipeline(
    data: Arc<dyn DataPort>,
    settings: &RunSettings,
    output: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<WalkForwardReport, StriderError> {
    let registry = StrategyRegistry::with_builtins();
    let range = settings.window()?;
    let candidates = settings.grid.expand(&settings.params)?;
    let strategies = candidates
        .iter()
        .map(|p| registry.create(&settings.strategy, p.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    eprintln!(
        "Walk-forward: {} over {}, {} candidates",
        settings.strategy,
        range,
        candidates.len()
    );

    let cache = feature_cache(Arc::clone(&data), settings)?;
    let set = settings.indicator_set(required_indicators(&strategies));
    let loaded = UniverseLoader::new(data.as_ref(), &cache).load(
        &settings.symbols,
        settings.benchmark.as_deref(),
        range,
        &set,
        &settings.backtest.regime,
    )?;

    let optimizer = WalkForwardOptimizer::new(
        &loaded.snapshot,
        &registry,
        &settings.strategy,
        candidates,
        &settings.backtest,
        settings.walk_forward.clone(),
    )?;
    let report = optimizer.run(range, cancel)?;
    print_walk_forward(&report);

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("walk_forward.json"));
    JsonReportAdapter::new().write_walk_forward(&report, &output)?;
    eprintln!("\nReport written to: {}", output.display());
    Ok(report)
}

fn run_validate(args: &RunArgs) -> Result<(), StriderError> {
    let settings = resolve_settings(args)?;
    let window = settings.window()?;
    let combinations = settings.grid.len();
    eprintln!("Strategy:     {}", settings.strategy);
    eprintln!("Window:       {window}");
    eprintln!("Symbols:      {}", settings.symbols.join(","));
    eprintln!("Grid:         {combinations} combination(s)");

    let data = open_data_source(&settings.data)?;
    let mut available = 0;
    for symbol in &settings.symbols {
        match data.data_range(symbol)? {
            Some((first, last, count)) => {
                available += 1;
                eprintln!("  {symbol}: {count} bars, {first} to {last}");
            }
            None => eprintln!("  {symbol}: no data"),
        }
    }
    if available == 0 {
        return Err(StriderError::DataUnavailable {
            symbol: settings.symbols.join(","),
            start: window.start,
            end: window.end.pred_opt().unwrap_or(window.end),
        });
    }
    eprintln!("Configuration OK");
    Ok(())
}

fn run_show_run(run_id: Option<&str>, config: Option<&Path>, db: Option<PathBuf>) -> Result<(), StriderError> {
    let path = match db {
        Some(path) => path,
        None => {
            let settings = load_settings(&load_config(config)?)?;
            settings.run_store.ok_or_else(|| StriderError::ConfigMissing {
                section: "run_store".into(),
                key: "path".into(),
            })?
        }
    };
    let store = open_run_store(&path)?;

    match run_id {
        Some(id) => {
            let record = store.load_run(id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        None => {
            for run in store.list_runs()? {
                println!(
                    "{}  {:<16} {}  trades {:>4}  return {:>7.2}%  sharpe {:>5.2}",
                    run.run_id,
                    run.strategy,
                    run.window,
                    run.trade_count,
                    run.total_return * 100.0,
                    run.sharpe_ratio
                );
            }
        }
    }
    Ok(())
}

fn print_metrics(metrics: &Metrics) {
    eprintln!("\n=== Results ===");
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", metrics.trade_count);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
}

fn print_walk_forward(report: &WalkForwardReport) {
    eprintln!("\n=== Periods ===");
    for period in &report.periods {
        let line = match &period.outcome {
            PeriodOutcome::Completed {
                param_index,
                in_sample,
                out_of_sample,
                ..
            } => format!(
                "params #{param_index}  IS sharpe {:.2}  OOS sharpe {:.2}  OOS return {:.2}%",
                in_sample.sharpe_ratio,
                out_of_sample.sharpe_ratio,
                out_of_sample.total_return * 100.0
            ),
            PeriodOutcome::Failed { reason } => format!("failed: {reason}"),
            PeriodOutcome::Cancelled => "cancelled".to_string(),
        };
        eprintln!("  {:>3}  test {}  {line}", period.period.index, period.period.test);
    }

    let s = &report.summary;
    eprintln!("\n=== Summary ===");
    eprintln!("Periods completed:  {}", s.periods_completed);
    eprintln!(
        "In-sample Sharpe:   {:.2} (sd {:.2})",
        s.mean_in_sample_sharpe, s.std_in_sample_sharpe
    );
    eprintln!(
        "Out-of-sample:      {:.2} (sd {:.2})",
        s.mean_out_of_sample_sharpe, s.std_out_of_sample_sharpe
    );
    eprintln!("Degradation:        {:.1}%", s.degradation_ratio * 100.0);
    eprintln!(
        "Runs:               {} succeeded, {} failed, {} cancelled",
        report.counts.succeeded, report.counts.failed, report.counts.cancelled
    );
}
