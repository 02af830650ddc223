//! Tick → candle aggregation and calendar boundary detection.

pub mod aggregator;
pub mod clock;

pub use aggregator::{CandleAggregator, MultiTimeframeAggregator};
pub use clock::PeriodClock;
