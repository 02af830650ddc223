//! Backtest session: restore, load, replay, persist, report.
//!
//! A session replays one asset's stored ticks over a [`DateRange`] through
//! every enabled strategy of a [`BacktestConfig`]. Orders and snapshots stream
//! to a JSONL persistence worker under `{output_dir}/{session_id}/`; the
//! worker is killed and drained before the report is returned.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use tickreplay_core::analytics::PerformanceSnapshot;
use tickreplay_core::domain::{check_ordering, TickError};
use tickreplay_core::orderbook::OrderbookError;
use tickreplay_core::queue::{PersistenceCommand, QueueCoordinator, QueueError};
use tickreplay_core::strategy::{Asset, StrategyContext};

use crate::config::{BacktestConfig, ConfigError, DateRange, GatewayConfig, SessionId};
use crate::gateway::CsvKlineGateway;
use crate::repository::JsonlRepository;
use crate::restore::{restore_ticks, RestoreError, RestoreMode, RestoreReport};
use crate::strategies::build_strategy;
use crate::tick_store::{TickStore, TickStoreError};

/// Name of the persistence queue every session registers.
pub const PERSISTENCE_QUEUE: &str = "persistence";

/// Errors from a session run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("tick store error: {0}")]
    Store(#[from] TickStoreError),

    #[error("restore error: {0}")]
    Restore(#[from] RestoreError),

    #[error("tick stream error: {0}")]
    Ticks(#[from] TickError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("strategy '{id}': {source}")]
    Orderbook { id: String, source: OrderbookError },

    #[error("no ticks for {symbol} between {from} and {to}")]
    NoTicks {
        symbol: String,
        from: String,
        to: String,
    },

    #[error("no enabled strategies")]
    NoEnabledStrategies,

    #[error("tick restore requested but no gateway is configured")]
    NoGateway,
}

/// Counters of one persistence worker at shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub name: String,
    pub processed: u64,
    pub failed: u64,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: SessionId,
    pub symbol: String,
    pub range: DateRange,
    pub ticks: usize,
    pub expected_minutes: i64,
    /// Ticks as a percentage of the minutes in the range.
    pub quality_pct: f64,
    /// Human-readable wall time of the replay.
    pub duration: String,
    pub output_dir: PathBuf,
    pub restore: Option<RestoreReport>,
    pub snapshots: Vec<PerformanceSnapshot>,
    pub workers: Vec<WorkerSummary>,
}

pub struct BacktestSession {
    config: BacktestConfig,
    range: DateRange,
    id: SessionId,
}

impl BacktestSession {
    pub fn new(config: BacktestConfig, range: DateRange) -> Result<Self, RunError> {
        config.validate()?;
        let id = config.session_id(&range)?;
        Ok(Self { config, range, id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    /// `{output_dir}/{session_id}`
    pub fn output_dir(&self) -> PathBuf {
        self.config.output_dir.join(&self.id)
    }

    pub fn tick_store(&self) -> TickStore {
        TickStore::new(&self.config.tick_dir)
    }

    /// Download one-minute klines from the configured gateway into the store.
    pub fn restore(&self, mode: RestoreMode) -> Result<RestoreReport, RunError> {
        let gateway = match &self.config.gateway {
            Some(GatewayConfig::Csv { dir }) => CsvKlineGateway::new(dir, &self.config.asset.source),
            None => return Err(RunError::NoGateway),
        };
        Ok(restore_ticks(
            &gateway,
            &self.tick_store(),
            &self.config.asset.symbol,
            &self.range,
            mode,
        )?)
    }

    /// Run the session, restoring ticks first when `restore` is set.
    pub fn run(&self, restore: Option<RestoreMode>) -> Result<RunReport, RunError> {
        let symbol = self.config.asset.symbol.as_str();
        info!(
            session = %self.id,
            symbol,
            from = %self.range.from,
            to = %self.range.to,
            "session starting"
        );

        let restored = restore.map(|mode| self.restore(mode)).transpose()?;

        let ticks = match self.tick_store().load(symbol, self.range.start(), self.range.end()) {
            Ok(ticks) => ticks,
            Err(TickStoreError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if ticks.is_empty() {
            return Err(RunError::NoTicks {
                symbol: symbol.to_string(),
                from: self.range.from.to_string(),
                to: self.range.to.to_string(),
            });
        }
        check_ordering(&ticks)?;

        let entries: Vec<_> = self.config.enabled_strategies().collect();
        if entries.is_empty() {
            return Err(RunError::NoEnabledStrategies);
        }

        let output_dir = self.output_dir();
        let mut coordinator = QueueCoordinator::new();
        let persistence = coordinator.register::<PersistenceCommand, _>(
            PERSISTENCE_QUEUE,
            self.config.queue_capacity,
            JsonlRepository::new(&output_dir),
        )?;

        let mut contexts = Vec::with_capacity(entries.len());
        for entry in entries {
            let strategy_config = entry.to_strategy_config(&self.config.asset);
            let ctx = StrategyContext::new(&strategy_config, build_strategy(&entry.kind))
                .map_err(|source| RunError::Orderbook {
                    id: entry.id.clone(),
                    source,
                })?
                .with_persistence(persistence.clone());
            contexts.push(ctx);
        }

        let started = Instant::now();
        let mut asset = Asset::new(symbol, contexts);
        asset.setup();
        for tick in &ticks {
            asset.on_tick(tick);
        }
        let snapshots = asset.finish();
        let elapsed = started.elapsed();

        let dropped = persistence.dropped();
        drop(asset);
        drop(persistence);
        let workers: Vec<WorkerSummary> = coordinator
            .shutdown()?
            .into_iter()
            .map(|(name, stats)| WorkerSummary {
                name,
                processed: stats.processed,
                failed: stats.failed,
            })
            .collect();
        if dropped > 0 {
            warn!(session = %self.id, dropped, "persistence queue overflowed, records dropped");
        }
        for w in workers.iter().filter(|w| w.failed > 0) {
            warn!(queue = %w.name, failed = w.failed, "persistence worker reported failures");
        }

        let expected_minutes = self.range.expected_minutes();
        let quality_pct = quality_pct(ticks.len(), expected_minutes);
        let duration = format_duration(elapsed);
        info!(
            session = %self.id,
            symbol,
            ticks = ticks.len(),
            quality_pct,
            duration = %duration,
            output = %output_dir.display(),
            "session finished"
        );

        Ok(RunReport {
            session_id: self.id.clone(),
            symbol: symbol.to_string(),
            range: self.range,
            ticks: ticks.len(),
            expected_minutes,
            quality_pct,
            duration,
            output_dir,
            restore: restored,
            snapshots,
            workers,
        })
    }
}

/// Tick coverage of a range: `ticks / expected_minutes * 100`.
pub fn quality_pct(ticks: usize, expected_minutes: i64) -> f64 {
    if expected_minutes <= 0 {
        return 0.0;
    }
    ticks as f64 / expected_minutes as f64 * 100.0
}

/// Render a duration in the largest unit under which it stays above one:
/// seconds, minutes, hours or days.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.2} seconds")
    } else if secs < 3_600.0 {
        format!("{:.2} minutes", secs / 60.0)
    } else if secs < 86_400.0 {
        format!("{:.2} hours", secs / 3_600.0)
    } else {
        format!("{:.2} days", secs / 86_400.0)
    }
}
