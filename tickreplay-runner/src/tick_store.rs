//! Parquet tick store.
//!
//! Layout: `{tick_dir}/{SYMBOL}/ticks.parquet`, two columns:
//! - `id`: unix seconds of the tick (the close time of its one-minute kline)
//! - `price`: close price
//!
//! Writes are atomic (write to .tmp, rename into place). Reads filter to an
//! inclusive time range and return ticks sorted ascending by `id`.

use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use tickreplay_core::domain::{Tick, TickError};

#[derive(Debug, Error)]
pub enum TickStoreError {
    #[error("no ticks stored for '{0}'")]
    NotFound(String),

    #[error("tick store I/O: {0}")]
    Io(String),

    #[error("parquet: {0}")]
    Parquet(String),

    #[error("invalid tick row: {0}")]
    InvalidRow(#[from] TickError),
}

pub struct TickStore {
    dir: PathBuf,
}

impl TickStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{tick_dir}/{SYMBOL}/ticks.parquet`
    pub fn path(&self, symbol: &str) -> PathBuf {
        self.dir.join(symbol).join("ticks.parquet")
    }

    pub fn exists(&self, symbol: &str) -> bool {
        self.path(symbol).exists()
    }

    /// Delete the stored ticks of `symbol`. Missing files are not an error.
    pub fn remove(&self, symbol: &str) -> Result<(), TickStoreError> {
        let path = self.path(symbol);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(symbol, path = %path.display(), "tick store removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TickStoreError::Io(format!("remove {}: {e}", path.display()))),
        }
    }

    /// Replace the stored ticks of `symbol`. Returns the row count written.
    pub fn write(&self, symbol: &str, ticks: &[Tick]) -> Result<usize, TickStoreError> {
        let rows: BTreeMap<i64, f64> = ticks
            .iter()
            .map(|t| (t.date().timestamp(), t.price()))
            .collect();
        self.write_rows(symbol, &rows)
    }

    /// Merge `ticks` into the stored ones. On a duplicate `id` the new price
    /// wins. Returns the total row count after the merge.
    pub fn merge(&self, symbol: &str, ticks: &[Tick]) -> Result<usize, TickStoreError> {
        let mut rows: BTreeMap<i64, f64> = if self.exists(symbol) {
            read_rows(&self.path(symbol))?.into_iter().collect()
        } else {
            BTreeMap::new()
        };
        rows.extend(ticks.iter().map(|t| (t.date().timestamp(), t.price())));
        self.write_rows(symbol, &rows)
    }

    /// Unix seconds of the newest stored tick.
    pub fn last_timestamp(&self, symbol: &str) -> Result<Option<i64>, TickStoreError> {
        if !self.exists(symbol) {
            return Ok(None);
        }
        let df = LazyFrame::scan_parquet(self.path(symbol), Default::default())
            .map_err(|e| TickStoreError::Parquet(format!("scan: {e}")))?
            .select([col("id").max()])
            .collect()
            .map_err(|e| TickStoreError::Parquet(format!("max id: {e}")))?;
        let ids = df
            .column("id")
            .and_then(|c| c.i64().cloned())
            .map_err(|e| TickStoreError::Parquet(format!("id column: {e}")))?;
        Ok(ids.get(0))
    }

    /// Ticks of `symbol` with `from <= date <= to`, ascending.
    pub fn load(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Tick>, TickStoreError> {
        let path = self.path(symbol);
        if !path.exists() {
            return Err(TickStoreError::NotFound(symbol.to_string()));
        }

        let df = LazyFrame::scan_parquet(&path, Default::default())
            .map_err(|e| TickStoreError::Parquet(format!("scan: {e}")))?
            .filter(
                col("id")
                    .gt_eq(lit(from.timestamp()))
                    .and(col("id").lt_eq(lit(to.timestamp()))),
            )
            .sort(["id"], SortMultipleOptions::default())
            .collect()
            .map_err(|e| TickStoreError::Parquet(format!("filter: {e}")))?;

        let ticks = dataframe_to_rows(&df)?
            .into_iter()
            .map(|(id, price)| Tick::from_unix(id, price))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(symbol, count = ticks.len(), %from, %to, "ticks loaded");
        Ok(ticks)
    }

    fn write_rows(&self, symbol: &str, rows: &BTreeMap<i64, f64>) -> Result<usize, TickStoreError> {
        let path = self.path(symbol);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TickStoreError::Io(format!("create dir: {e}")))?;
        }

        let ids: Vec<i64> = rows.keys().copied().collect();
        let prices: Vec<f64> = rows.values().copied().collect();
        let mut df = DataFrame::new(vec![
            Column::new("id".into(), ids),
            Column::new("price".into(), prices),
        ])
        .map_err(|e| TickStoreError::Parquet(format!("dataframe creation: {e}")))?;

        let tmp_path = path.with_extension("parquet.tmp");
        let file = fs::File::create(&tmp_path)
            .map_err(|e| TickStoreError::Io(format!("create file: {e}")))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| TickStoreError::Parquet(format!("write parquet: {e}")))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            TickStoreError::Io(format!("atomic rename failed: {e}"))
        })?;

        debug!(symbol, rows = rows.len(), path = %path.display(), "ticks written");
        Ok(rows.len())
    }
}

fn read_rows(path: &Path) -> Result<Vec<(i64, f64)>, TickStoreError> {
    let file = fs::File::open(path).map_err(|e| TickStoreError::Io(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| TickStoreError::Parquet(format!("read: {e}")))?;
    dataframe_to_rows(&df)
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<(i64, f64)>, TickStoreError> {
    let map_err = |e: PolarsError| TickStoreError::Parquet(format!("column read: {e}"));

    let ids = df.column("id").map_err(map_err)?;
    let prices = df.column("price").map_err(map_err)?;
    let id_ca = ids
        .i64()
        .map_err(|e| TickStoreError::Parquet(format!("id column type: {e}")))?;
    let price_ca = prices
        .f64()
        .map_err(|e| TickStoreError::Parquet(format!("price column type: {e}")))?;

    (0..df.height())
        .map(|i| {
            let id = id_ca
                .get(i)
                .ok_or_else(|| TickStoreError::Parquet(format!("null id at row {i}")))?;
            let price = price_ca
                .get(i)
                .ok_or_else(|| TickStoreError::Parquet(format!("null price at row {i}")))?;
            Ok((id, price))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minute(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i)
    }

    fn ticks(range: std::ops::Range<i64>) -> Vec<Tick> {
        range
            .map(|i| Tick::new(minute(i), 100.0 + i as f64).unwrap())
            .collect()
    }

    #[test]
    fn write_then_load_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());

        let mut input = ticks(0..10);
        input.reverse();
        assert_eq!(store.write("BTCUSDT", &input).unwrap(), 10);
        assert!(store.path("BTCUSDT").ends_with("BTCUSDT/ticks.parquet"));

        let loaded = store.load("BTCUSDT", minute(2), minute(5)).unwrap();
        let prices: Vec<f64> = loaded.iter().map(|t| t.price()).collect();
        assert_eq!(prices, vec![102.0, 103.0, 104.0, 105.0]);
        assert_eq!(loaded[0].date(), minute(2));
    }

    #[test]
    fn merge_dedupes_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());
        store.write("ETHUSDT", &ticks(0..5)).unwrap();

        let mut update = ticks(3..8);
        update[0] = Tick::new(minute(3), 999.0).unwrap();
        assert_eq!(store.merge("ETHUSDT", &update).unwrap(), 8);

        let all = store.load("ETHUSDT", minute(0), minute(100)).unwrap();
        assert_eq!(all.len(), 8);
        assert_eq!(all[3].price(), 999.0);
        assert_eq!(store.last_timestamp("ETHUSDT").unwrap(), Some(minute(7).timestamp()));
    }

    #[test]
    fn missing_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());
        assert!(matches!(
            store.load("NOPE", minute(0), minute(1)),
            Err(TickStoreError::NotFound(_))
        ));
        assert_eq!(store.last_timestamp("NOPE").unwrap(), None);
        store.remove("NOPE").unwrap();
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());
        store.write("BTCUSDT", &ticks(0..3)).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path().join("BTCUSDT"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
