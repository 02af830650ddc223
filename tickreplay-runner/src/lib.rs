//! TickReplay Runner — backtest orchestration on top of `tickreplay-core`.
//!
//! This crate provides:
//! - TOML backtest configs with deterministic session ids
//! - A parquet tick store and CSV kline gateway
//! - Tick restore (full or resumed) with progress logging
//! - JSONL persistence workers for orders and snapshots
//! - Built-in strategies (EMA crossover, buy-and-hold)
//! - Single-asset sessions and parallel portfolio runs

pub mod config;
pub mod gateway;
pub mod portfolio;
pub mod repository;
pub mod restore;
pub mod session;
pub mod strategies;
pub mod tick_store;

pub use config::{
    BacktestConfig, ConfigError, DateRange, GatewayConfig, SessionId, StrategyEntry, StrategyKind,
};
pub use gateway::{CsvKlineGateway, GatewayError, Kline, KlineGateway};
pub use portfolio::{summarize, AssetOutcome, PortfolioRunner, PortfolioSummary};
pub use repository::{read_latest, JsonlRepository, RepositoryError};
pub use restore::{progress_between, restore_ticks, RestoreError, RestoreMode, RestoreReport};
pub use session::{format_duration, quality_pct, BacktestSession, RunError, RunReport};
pub use strategies::build_strategy;
pub use tick_store::{TickStore, TickStoreError};
