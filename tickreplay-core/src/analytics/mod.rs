//! NAV tracking and risk-adjusted performance metrics.

pub mod engine;
pub mod metrics;
pub mod snapshot;

pub use engine::AnalyticsEngine;
pub use metrics::PerformanceMetrics;
pub use snapshot::{PerformanceSnapshot, SnapshotEvent};
