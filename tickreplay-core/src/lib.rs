//! TickReplay Core — the tick-driven simulation engine.
//!
//! This crate contains everything that runs inside the simulation loop:
//! - Domain types (ticks, candles, orders, timeframes)
//! - Candle aggregation and calendar boundary detection
//! - Streaming indicators over closed candles
//! - Orderbook state machine with leveraged margin and liquidation
//! - Incremental NAV tracking and performance metrics
//! - Strategy composition and the fixed per-tick cascade
//! - Fire-and-forget queues to blocking I/O workers

pub mod analytics;
pub mod candles;
pub mod domain;
pub mod indicators;
pub mod orderbook;
pub mod queue;
pub mod strategy;
