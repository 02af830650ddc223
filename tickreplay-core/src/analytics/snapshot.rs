use super::metrics::PerformanceMetrics;
use crate::domain::StrategyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused a snapshot to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotEvent {
    Start,
    NewDay,
    End,
}

impl SnapshotEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotEvent::Start => "start",
            SnapshotEvent::NewDay => "new_day",
            SnapshotEvent::End => "end",
        }
    }
}

/// Point-in-time performance record for one strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub strategy_id: StrategyId,
    pub event: SnapshotEvent,
    pub allocation: f64,
    pub nav: f64,
    pub nav_peak: f64,
    pub drawdown: f64,
    pub max_drawdown: f64,
    #[serde(flatten)]
    pub metrics: PerformanceMetrics,
    pub performance_history: Vec<f64>,
    pub nav_history: Vec<f64>,
    pub profit_history: Vec<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl PerformanceSnapshot {
    /// Absolute gain over the allocation.
    pub fn performance(&self) -> f64 {
        self.nav - self.allocation
    }

    pub fn performance_percentage(&self) -> f64 {
        if self.allocation == 0.0 {
            return 0.0;
        }
        self.performance() / self.allocation
    }
}
