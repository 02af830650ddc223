//! Historical kline sources.
//!
//! A [`KlineGateway`] pages through klines for a symbol and hands each batch to
//! a callback, oldest first. The callback may stop the download by returning
//! an error; the gateway propagates it unchanged.
//!
//! [`CsvKlineGateway`] reads exchange kline dumps from disk:
//! `{dir}/{SYMBOL}_{timeframe}.csv`, headerless rows of
//! `open_time,open,high,low,close,volume,close_time[,quote_volume,trades,taker_base,taker_quote,ignore]`
//! with times in seconds, milliseconds or microseconds.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use tickreplay_core::domain::Timeframe;

/// Rows handed to the callback per call.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no kline source for {symbol} {timeframe} at {path}")]
    SourceNotFound {
        symbol: String,
        timeframe: Timeframe,
        path: PathBuf,
    },

    #[error("kline source I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("kline source: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed kline at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("batch rejected by consumer: {0}")]
    Consumer(String),
}

/// One OHLCV kline with times in unix seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub source: String,
    pub symbol: String,
    pub open_time: i64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: f64,
    pub close_time: i64,
    pub number_of_trades: u64,
}

/// Consumer of kline batches.
pub type KlineCallback<'a> = dyn FnMut(&[Kline]) -> Result<(), GatewayError> + 'a;

pub trait KlineGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver every kline with `from <= open_time <= to` (unix seconds) in
    /// ascending batches.
    fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
        callback: &mut KlineCallback<'_>,
    ) -> Result<(), GatewayError>;
}

// ── CSV gateway ──────────────────────────────────────────────────────

pub struct CsvKlineGateway {
    dir: PathBuf,
    source: String,
    batch_size: usize,
}

impl CsvKlineGateway {
    pub fn new(dir: impl Into<PathBuf>, source: &str) -> Self {
        Self {
            dir: dir.into(),
            source: source.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{symbol}_{timeframe}.csv"))
    }

    fn open(&self, symbol: &str, timeframe: Timeframe) -> Result<csv::Reader<File>, GatewayError> {
        let path = self.path(symbol, timeframe);
        if !Path::new(&path).exists() {
            return Err(GatewayError::SourceNotFound {
                symbol: symbol.to_string(),
                timeframe,
                path,
            });
        }
        Ok(csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?)
    }

    fn parse(&self, symbol: &str, record: &csv::StringRecord) -> Result<Kline, GatewayError> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field = |i: usize| {
            record.get(i).ok_or_else(|| GatewayError::Malformed {
                line,
                reason: format!("missing column {i}"),
            })
        };
        let float = |i: usize| -> Result<f64, GatewayError> {
            let raw = field(i)?;
            raw.parse::<f64>().map_err(|e| GatewayError::Malformed {
                line,
                reason: format!("column {i} '{raw}': {e}"),
            })
        };
        let int = |i: usize| -> Result<i64, GatewayError> {
            let raw = field(i)?;
            raw.parse::<i64>().map_err(|e| GatewayError::Malformed {
                line,
                reason: format!("column {i} '{raw}': {e}"),
            })
        };

        Ok(Kline {
            source: self.source.clone(),
            symbol: symbol.to_string(),
            open_time: to_seconds(int(0)?),
            open_price: float(1)?,
            high_price: float(2)?,
            low_price: float(3)?,
            close_price: float(4)?,
            volume: float(5)?,
            close_time: to_seconds(int(6)?),
            number_of_trades: record
                .get(8)
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(0),
        })
    }
}

impl KlineGateway for CsvKlineGateway {
    fn name(&self) -> &str {
        &self.source
    }

    fn get_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: i64,
        to: i64,
        callback: &mut KlineCallback<'_>,
    ) -> Result<(), GatewayError> {
        let mut reader = self.open(symbol, timeframe)?;
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut batches = 0usize;

        for row in reader.records() {
            let record = row?;
            let kline = self.parse(symbol, &record)?;
            if kline.open_time < from || kline.open_time > to {
                continue;
            }
            batch.push(kline);
            if batch.len() == self.batch_size {
                callback(&batch)?;
                batches += 1;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            callback(&batch)?;
            batches += 1;
        }

        debug!(symbol, %timeframe, batches, "klines delivered");
        Ok(())
    }
}

/// Normalise a dump timestamp to seconds.
fn to_seconds(raw: i64) -> i64 {
    match raw.abs() {
        t if t >= 100_000_000_000_000 => raw / 1_000_000,
        t if t >= 100_000_000_000 => raw / 1_000,
        _ => raw,
    }
}
