//! SQLite adapter: bar storage behind `DataPort` and the append-only run store.

use crate::domain::backtest::{BacktestConfig, DateWindow};
use crate::domain::error::StriderError;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::portfolio::EquityPoint;
use crate::domain::position::{Direction, ExitReason, Trade};
use crate::domain::strategy::StrategyParams;
use crate::ports::data_port::DataPort;
use crate::ports::run_store_port::{RunRecord, RunStorePort, RunSummary, run_id};
use chrono::NaiveDate;
use log::debug;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The `runs.payload` column: everything except the trade ledger and the
/// equity curve, which live in `run_trades` and `run_equity`.
#[derive(Serialize, Deserialize)]
struct RunHeader {
    strategy: String,
    params: StrategyParams,
    config: BacktestConfig,
    window: DateWindow,
    symbols: Vec<String>,
    metrics: Metrics,
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn db_error(e: r2d2::Error) -> StriderError {
    StriderError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> StriderError {
    StriderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, StriderError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| StriderError::Database {
        reason: format!("bad stored date '{raw}': {e}"),
    })
}

fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "long",
        Direction::Short => "short",
    }
}

fn parse_direction(raw: &str) -> Result<Direction, StriderError> {
    match raw {
        "long" => Ok(Direction::Long),
        "short" => Ok(Direction::Short),
        other => Err(StriderError::Database {
            reason: format!("bad stored direction '{other}'"),
        }),
    }
}

fn load_trades(conn: &Connection, run_id: &str) -> Result<Vec<Trade>, StriderError> {
    let mut stmt = conn
        .prepare(
            "SELECT symbol, direction, shares, entry_date, entry_price, exit_date, exit_price, exit_reason, pnl
             FROM run_trades WHERE run_id = ?1 ORDER BY seq",
        )
        .map_err(query_error)?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, f64>(8)?,
            ))
        })
        .map_err(query_error)?;

    let mut trades = Vec::new();
    for row in rows {
        let (symbol, direction, shares, entry_date, entry_price, exit_date, exit_price, reason, pnl) =
            row.map_err(query_error)?;
        let exit_reason = reason
            .parse::<ExitReason>()
            .map_err(|reason| StriderError::Database { reason })?;
        trades.push(Trade {
            symbol,
            direction: parse_direction(&direction)?,
            shares,
            entry_date: parse_date(&entry_date)?,
            entry_price,
            exit_date: parse_date(&exit_date)?,
            exit_price,
            exit_reason,
            pnl,
        });
    }
    Ok(trades)
}

fn load_equity(conn: &Connection, run_id: &str) -> Result<Vec<EquityPoint>, StriderError> {
    let mut stmt = conn
        .prepare("SELECT date, equity, cash FROM run_equity WHERE run_id = ?1 ORDER BY date")
        .map_err(query_error)?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })
        .map_err(query_error)?;

    let mut curve = Vec::new();
    for row in rows {
        let (date, equity, cash) = row.map_err(query_error)?;
        curve.push(EquityPoint {
            date: parse_date(&date)?,
            equity,
            cash,
        });
    }
    Ok(curve)
}

impl SqliteAdapter {
    /// Opens (creating if needed) the database file and its schema.
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, StriderError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(db_error)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, StriderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_error)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StriderError> {
        self.pool.get().map_err(db_error)
    }

    pub fn initialize_schema(&self) -> Result<(), StriderError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS ohlcv (
                    symbol TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume INTEGER NOT NULL,
                    PRIMARY KEY (symbol, date)
                );
                CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT PRIMARY KEY,
                    strategy TEXT NOT NULL,
                    window_start TEXT NOT NULL,
                    window_end TEXT NOT NULL,
                    trade_count INTEGER NOT NULL,
                    total_return REAL NOT NULL,
                    sharpe_ratio REAL NOT NULL,
                    payload TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS run_trades (
                    run_id TEXT NOT NULL REFERENCES runs(run_id),
                    seq INTEGER NOT NULL,
                    symbol TEXT NOT NULL,
                    direction TEXT NOT NULL,
                    shares REAL NOT NULL,
                    entry_date TEXT NOT NULL,
                    entry_price REAL NOT NULL,
                    exit_date TEXT NOT NULL,
                    exit_price REAL NOT NULL,
                    exit_reason TEXT NOT NULL,
                    pnl REAL NOT NULL,
                    PRIMARY KEY (run_id, seq)
                );
                CREATE TABLE IF NOT EXISTS run_equity (
                    run_id TEXT NOT NULL REFERENCES runs(run_id),
                    date TEXT NOT NULL,
                    equity REAL NOT NULL,
                    cash REAL NOT NULL,
                    PRIMARY KEY (run_id, date)
                );",
            )
            .map_err(query_error)
    }

    pub fn insert_bars(&self, bars: &[OhlcvBar]) -> Result<(), StriderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.symbol,
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<OhlcvBar>, StriderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT symbol, date, open, high, low, close, volume
                 FROM ohlcv
                 WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![
                    symbol,
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .map_err(query_error)?;

        let mut bars = Vec::new();
        for row in rows {
            let (symbol, date, open, high, low, close, volume) = row.map_err(query_error)?;
            bars.push(OhlcvBar {
                symbol,
                date: parse_date(&date)?,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        if bars.is_empty() {
            return Err(StriderError::DataUnavailable {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, StriderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM ohlcv ORDER BY symbol")
            .map_err(query_error)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_error)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_error)
    }

    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, StriderError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM ohlcv WHERE symbol = ?1",
                params![symbol],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_error)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((parse_date(&min)?, parse_date(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl RunStorePort for SqliteAdapter {
    fn save_run(&self, record: &RunRecord) -> Result<String, StriderError> {
        let id = run_id(record)?;
        let payload = serde_json::to_string(&RunHeader {
            strategy: record.strategy.clone(),
            params: record.params.clone(),
            config: record.config.clone(),
            window: record.window,
            symbols: record.symbols.clone(),
            metrics: record.metrics.clone(),
        })?;
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO runs
                 (run_id, strategy, window_start, window_end, trade_count, total_return, sharpe_ratio, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    record.strategy,
                    record.window.start.format(DATE_FORMAT).to_string(),
                    record.window.end.format(DATE_FORMAT).to_string(),
                    record.metrics.trade_count as i64,
                    record.metrics.total_return,
                    record.metrics.sharpe_ratio,
                    payload
                ],
            )
            .map_err(query_error)?;

        if inserted == 0 {
            debug!("run {id} already stored");
            return Ok(id);
        }

        for (seq, trade) in record.trades.iter().enumerate() {
            tx.execute(
                "INSERT INTO run_trades
                 (run_id, seq, symbol, direction, shares, entry_date, entry_price, exit_date, exit_price, exit_reason, pnl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    seq as i64,
                    trade.symbol,
                    direction_name(trade.direction),
                    trade.shares,
                    trade.entry_date.format(DATE_FORMAT).to_string(),
                    trade.entry_price,
                    trade.exit_date.format(DATE_FORMAT).to_string(),
                    trade.exit_price,
                    trade.exit_reason.to_string(),
                    trade.pnl
                ],
            )
            .map_err(query_error)?;
        }

        for point in &record.equity_curve {
            tx.execute(
                "INSERT INTO run_equity (run_id, date, equity, cash) VALUES (?1, ?2, ?3, ?4)",
                params![id, point.date.format(DATE_FORMAT).to_string(), point.equity, point.cash],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        debug!("stored run {id}");
        Ok(id)
    }

    fn load_run(&self, run_id: &str) -> Result<RunRecord, StriderError> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)?;

        let payload = payload.ok_or_else(|| StriderError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        let header: RunHeader = serde_json::from_str(&payload)?;
        Ok(RunRecord {
            strategy: header.strategy,
            params: header.params,
            config: header.config,
            window: header.window,
            symbols: header.symbols,
            trades: load_trades(&conn, run_id)?,
            equity_curve: load_equity(&conn, run_id)?,
            metrics: header.metrics,
        })
    }

    fn list_runs(&self) -> Result<Vec<RunSummary>, StriderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT run_id, strategy, window_start, window_end, trade_count, total_return, sharpe_ratio
                 FROM runs ORDER BY window_start, run_id",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                ))
            })
            .map_err(query_error)?;

        let mut runs = Vec::new();
        for row in rows {
            let (run_id, strategy, start, end, trade_count, total_return, sharpe_ratio) =
                row.map_err(query_error)?;
            runs.push(RunSummary {
                run_id,
                strategy,
                window: DateWindow {
                    start: parse_date(&start)?,
                    end: parse_date(&end)?,
                },
                trade_count: trade_count as usize,
                total_return,
                sharpe_ratio,
            });
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(symbol: &str, day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: symbol.to_string(),
            date: d(day),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
        }
    }

    fn record() -> RunRecord {
        let trades = vec![Trade {
            symbol: "BHP".into(),
            direction: Direction::Long,
            shares: 10.0,
            entry_date: d(2),
            entry_price: 100.0,
            exit_date: d(5),
            exit_price: 105.0,
            exit_reason: ExitReason::TakeProfit,
            pnl: 50.0,
        }];
        let equity_curve = vec![
            EquityPoint {
                date: d(2),
                equity: 1_000.0,
                cash: 0.0,
            },
            EquityPoint {
                date: d(5),
                equity: 1_050.0,
                cash: 1_050.0,
            },
        ];
        let metrics = Metrics::compute(&trades, &equity_curve, 1_000.0, 0.0);
        RunRecord {
            strategy: "long_trend".into(),
            params: StrategyParams::default(),
            config: BacktestConfig::default(),
            window: DateWindow::new(d(1), d(10)).unwrap(),
            symbols: vec!["BHP".into()],
            trades,
            equity_curve,
            metrics,
        }
    }

    #[test]
    fn fetch_returns_bars_in_range() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter
            .insert_bars(&[bar("BHP", 2, 101.5), bar("BHP", 1, 100.0), bar("BHP", 9, 99.0)])
            .unwrap();

        let fetched = adapter.fetch("BHP", d(1), d(2)).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].date, d(1));
        assert_eq!(fetched[1].close, 101.5);
    }

    #[test]
    fn fetch_without_rows_is_unavailable() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let err = adapter.fetch("BHP", d(1), d(2)).unwrap_err();
        assert!(matches!(err, StriderError::DataUnavailable { .. }));
    }

    #[test]
    fn list_symbols_and_range() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter
            .insert_bars(&[bar("CBA", 1, 150.0), bar("BHP", 1, 100.0), bar("BHP", 5, 102.0)])
            .unwrap();

        assert_eq!(adapter.list_symbols().unwrap(), vec!["BHP", "CBA"]);
        assert_eq!(adapter.data_range("BHP").unwrap(), Some((d(1), d(5), 2)));
        assert_eq!(adapter.data_range("XYZ").unwrap(), None);
    }

    #[test]
    fn run_round_trips_and_is_append_only() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let rec = record();

        let id = adapter.save_run(&rec).unwrap();
        let again = adapter.save_run(&rec).unwrap();
        assert_eq!(id, again);
        assert_eq!(adapter.load_run(&id).unwrap(), rec);

        let runs = adapter.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0], RunSummary::of(&id, &rec));
    }

    #[test]
    fn ledger_is_read_back_from_its_tables() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let mut rec = record();
        rec.trades.push(Trade {
            symbol: "CBA".into(),
            direction: Direction::Short,
            shares: -4.0,
            entry_date: d(6),
            entry_price: 50.0,
            exit_date: d(8),
            exit_price: 52.5,
            exit_reason: ExitReason::StopLoss,
            pnl: -10.0,
        });
        let id = adapter.save_run(&rec).unwrap();

        let conn = adapter.conn().unwrap();
        let payload: String = conn
            .query_row("SELECT payload FROM runs WHERE run_id = ?1", params![id], |row| row.get(0))
            .unwrap();
        assert!(!payload.contains("entry_price"));

        conn.execute(
            "UPDATE run_trades SET exit_reason = 'rebalance' WHERE run_id = ?1 AND seq = 1",
            params![id],
        )
        .unwrap();
        drop(conn);

        let loaded = adapter.load_run(&id).unwrap();
        assert_eq!(loaded.trades.len(), 2);
        assert_eq!(loaded.trades[0], rec.trades[0]);
        assert_eq!(loaded.trades[1].direction, Direction::Short);
        assert_eq!(loaded.trades[1].exit_reason, ExitReason::Rebalance);
        assert_eq!(loaded.equity_curve, rec.equity_curve);
    }

    #[test]
    fn different_content_gets_a_new_id() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let a = record();
        let mut b = record();
        b.params.holding_horizon = 20;
        assert_ne!(adapter.save_run(&a).unwrap(), adapter.save_run(&b).unwrap());
        assert_eq!(adapter.list_runs().unwrap().len(), 2);
    }

    #[test]
    fn unknown_run_is_not_found() {
        let adapter = SqliteAdapter::in_memory().unwrap();
        let err = adapter.load_run("deadbeef").unwrap_err();
        assert!(matches!(err, StriderError::RunNotFound { .. }));
    }

    #[test]
    fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.db");
        let id = {
            let adapter = SqliteAdapter::open(&path, 2).unwrap();
            adapter.save_run(&record()).unwrap()
        };
        let reopened = SqliteAdapter::open(&path, 2).unwrap();
        assert_eq!(reopened.load_run(&id).unwrap(), record());
    }
}
