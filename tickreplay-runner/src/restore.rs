//! Tick restore: one-minute klines from a gateway into the tick store.
//!
//! Each kline becomes one tick at its close time with its close price.
//! [`RestoreMode::Full`] drops the stored ticks and downloads the whole range;
//! [`RestoreMode::Resume`] continues from the newest stored tick and merges.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use tickreplay_core::domain::{Tick, Timeframe};

use crate::config::DateRange;
use crate::gateway::{GatewayError, Kline, KlineGateway};
use crate::tick_store::{TickStore, TickStoreError};

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("download failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("tick store: {0}")]
    Store(#[from] TickStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreMode {
    /// Delete stored ticks and download the full range.
    Full,
    /// Download only what follows the newest stored tick.
    Resume,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub symbol: String,
    pub mode: RestoreMode,
    /// Unix seconds the download started from.
    pub downloaded_from: i64,
    pub fetched: usize,
    /// Rows in the store after the restore.
    pub stored: usize,
}

/// Fraction of `[start, end]` covered up to `current`, clamped to `[0, 1]`.
pub fn progress_between(start: i64, end: i64, current: i64) -> f64 {
    let total = end - start;
    if total <= 0 {
        return 1.0;
    }
    ((current - start) as f64 / total as f64).clamp(0.0, 1.0)
}

pub fn restore_ticks(
    gateway: &dyn KlineGateway,
    store: &TickStore,
    symbol: &str,
    range: &DateRange,
    mode: RestoreMode,
) -> Result<RestoreReport, RestoreError> {
    let start = range.start().timestamp();
    let end = range.end().timestamp();

    let downloaded_from = match mode {
        RestoreMode::Full => {
            store.remove(symbol)?;
            start
        }
        RestoreMode::Resume => match store.last_timestamp(symbol)? {
            Some(last) if last >= start => {
                info!(symbol, from = %format_ts(last), "resuming download");
                last + 1
            }
            _ => start,
        },
    };

    info!(
        symbol,
        gateway = gateway.name(),
        from = %format_ts(downloaded_from),
        to = %format_ts(end),
        "downloading one-minute klines"
    );

    let mut ticks: Vec<Tick> = Vec::new();
    let mut on_batch = |batch: &[Kline]| -> Result<(), GatewayError> {
        for kline in batch {
            let tick = Tick::from_unix(kline.close_time, kline.close_price)
                .map_err(|e| GatewayError::Consumer(format!("kline {}: {e}", kline.open_time)))?;
            ticks.push(tick);
        }
        if let Some(last) = batch.last() {
            info!(
                symbol,
                current = %format_ts(last.close_time),
                progress_pct = progress_between(downloaded_from, end, last.close_time) * 100.0,
                "download progress"
            );
        }
        Ok(())
    };
    gateway.get_klines(symbol, Timeframe::OneMinute, downloaded_from, end, &mut on_batch)?;

    if ticks.is_empty() {
        warn!(symbol, from = %format_ts(downloaded_from), "no klines available for the requested range");
        let stored = if store.exists(symbol) {
            store.load(symbol, range.start(), range.end())?.len()
        } else {
            0
        };
        return Ok(RestoreReport {
            symbol: symbol.to_string(),
            mode,
            downloaded_from,
            fetched: 0,
            stored,
        });
    }

    let fetched = ticks.len();
    let stored = match mode {
        RestoreMode::Full => store.write(symbol, &ticks)?,
        RestoreMode::Resume => store.merge(symbol, &ticks)?,
    };
    info!(
        symbol,
        fetched,
        stored,
        path = %store.path(symbol).display(),
        "ticks saved"
    );

    Ok(RestoreReport {
        symbol: symbol.to_string(),
        mode,
        downloaded_from,
        fetched,
        stored,
    })
}

fn format_ts(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| seconds.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Serves klines from memory, recording the requested window.
    struct MemoryGateway {
        klines: Vec<Kline>,
        requests: Mutex<Vec<(i64, i64)>>,
    }

    impl MemoryGateway {
        fn minutes(start: i64, count: i64) -> Self {
            let klines = (0..count)
                .map(|i| {
                    let open_time = start + i * 60;
                    Kline {
                        source: "memory".into(),
                        symbol: "BTCUSDT".into(),
                        open_time,
                        open_price: 100.0,
                        high_price: 100.0,
                        low_price: 100.0,
                        close_price: 100.0 + i as f64,
                        volume: 1.0,
                        close_time: open_time + 59,
                        number_of_trades: 1,
                    }
                })
                .collect();
            Self {
                klines,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl KlineGateway for MemoryGateway {
        fn name(&self) -> &str {
            "memory"
        }

        fn get_klines(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            from: i64,
            to: i64,
            callback: &mut crate::gateway::KlineCallback<'_>,
        ) -> Result<(), GatewayError> {
            self.requests.lock().unwrap().push((from, to));
            let selected: Vec<Kline> = self
                .klines
                .iter()
                .filter(|k| k.open_time >= from && k.open_time <= to)
                .cloned()
                .collect();
            for chunk in selected.chunks(3) {
                callback(chunk)?;
            }
            Ok(())
        }
    }

    fn range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        DateRange::new(day, day).unwrap()
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(progress_between(0, 100, 50), 0.5);
        assert_eq!(progress_between(0, 100, 150), 1.0);
        assert_eq!(progress_between(0, 100, -5), 0.0);
        assert_eq!(progress_between(10, 10, 10), 1.0);
    }

    proptest::proptest! {
        #[test]
        fn progress_is_monotonic_and_bounded(
            start in -1_000_000i64..1_000_000,
            len in 1i64..1_000_000,
            a in -2_000_000i64..3_000_000,
            b in -2_000_000i64..3_000_000,
        ) {
            let end = start + len;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = progress_between(start, end, lo);
            let p_hi = progress_between(start, end, hi);
            proptest::prop_assert!((0.0..=1.0).contains(&p_lo));
            proptest::prop_assert!((0.0..=1.0).contains(&p_hi));
            proptest::prop_assert!(p_lo <= p_hi);
        }
    }

    #[test]
    fn full_restore_writes_close_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());
        let start = range().start().timestamp();
        let gateway = MemoryGateway::minutes(start, 10);

        let report = restore_ticks(&gateway, &store, "BTCUSDT", &range(), RestoreMode::Full).unwrap();
        assert_eq!(report.fetched, 10);
        assert_eq!(report.stored, 10);

        let ticks = store.load("BTCUSDT", range().start(), range().end()).unwrap();
        assert_eq!(ticks[0].date().timestamp(), start + 59);
        assert_eq!(ticks[9].price(), 109.0);
    }

    #[test]
    fn resume_continues_after_last_tick() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());
        let start = range().start().timestamp();

        let first = MemoryGateway::minutes(start, 5);
        restore_ticks(&first, &store, "BTCUSDT", &range(), RestoreMode::Full).unwrap();

        let second = MemoryGateway::minutes(start, 8);
        let report = restore_ticks(&second, &store, "BTCUSDT", &range(), RestoreMode::Resume).unwrap();
        let last_stored = start + 4 * 60 + 59;
        assert_eq!(report.downloaded_from, last_stored + 1);
        assert_eq!(second.requests.lock().unwrap()[0].0, last_stored + 1);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.stored, 8);
    }

    #[test]
    fn empty_download_keeps_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TickStore::new(dir.path());
        let gateway = MemoryGateway::minutes(0, 0);
        let report = restore_ticks(&gateway, &store, "BTCUSDT", &range(), RestoreMode::Resume).unwrap();
        assert_eq!(report.fetched, 0);
        assert_eq!(report.stored, 0);
        assert!(!store.exists("BTCUSDT"));
    }
}
