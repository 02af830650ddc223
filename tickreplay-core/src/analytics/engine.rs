//! Incremental NAV and drawdown tracking.
//!
//! NAV, peak and drawdown update on every tick. Histories grow only on day
//! boundaries and at run end, which is also when the full metric set is
//! recomputed.

use super::metrics::{self, PerformanceMetrics};
use super::snapshot::{PerformanceSnapshot, SnapshotEvent};
use crate::domain::{Order, OrderStatus, StrategyId};
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    strategy_id: StrategyId,
    allocation: f64,
    initial_nav: f64,
    started_at: Option<DateTime<Utc>>,
    last_date: Option<DateTime<Utc>>,
    nav: f64,
    nav_peak: f64,
    drawdown: f64,
    max_drawdown: f64,
    nav_history: Vec<f64>,
    performance_history: Vec<f64>,
    profit_history: Vec<f64>,
    metrics: PerformanceMetrics,
}

impl AnalyticsEngine {
    /// Seed from the orderbook's allocation and opening NAV.
    pub fn new(strategy_id: StrategyId, allocation: f64, nav: f64) -> Self {
        Self {
            strategy_id,
            allocation,
            initial_nav: nav,
            started_at: None,
            last_date: None,
            nav,
            nav_peak: nav,
            drawdown: 0.0,
            max_drawdown: 0.0,
            nav_history: vec![nav],
            performance_history: vec![nav - allocation],
            profit_history: Vec::new(),
            metrics: PerformanceMetrics::default(),
        }
    }

    pub fn nav(&self) -> f64 {
        self.nav
    }

    pub fn nav_peak(&self) -> f64 {
        self.nav_peak
    }

    pub fn drawdown(&self) -> f64 {
        self.drawdown
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn nav_history(&self) -> &[f64] {
        &self.nav_history
    }

    pub fn profit_history(&self) -> &[f64] {
        &self.profit_history
    }

    /// Whole days between the first tick and the latest one.
    pub fn elapsed_days(&self) -> i64 {
        match (self.started_at, self.last_date) {
            (Some(start), Some(last)) => (last - start).num_days(),
            _ => 0,
        }
    }

    /// Per-tick NAV update.
    pub fn on_tick(&mut self, date: DateTime<Utc>, nav: f64) {
        if self.started_at.is_none() {
            self.started_at = Some(date);
        }
        self.last_date = Some(date);
        self.nav = nav;
        self.nav_peak = self.nav_peak.max(nav);
        self.drawdown = metrics::drawdown(nav, self.nav_peak);
        self.max_drawdown = self.max_drawdown.min(self.drawdown);
    }

    /// Record realized profit of a closed order.
    pub fn on_transaction(&mut self, order: &Order) {
        if order.status == OrderStatus::Closed {
            self.profit_history.push(order.net_profit());
        }
    }

    pub fn on_new_day(&mut self, date: DateTime<Utc>) -> PerformanceSnapshot {
        self.record(SnapshotEvent::NewDay, date)
    }

    pub fn on_end(&mut self, date: DateTime<Utc>) -> PerformanceSnapshot {
        self.record(SnapshotEvent::End, date)
    }

    /// Snapshot of the seeded state, taken before any history is appended.
    pub fn start_snapshot(&self, date: DateTime<Utc>) -> PerformanceSnapshot {
        self.snapshot(SnapshotEvent::Start, date)
    }

    fn record(&mut self, event: SnapshotEvent, date: DateTime<Utc>) -> PerformanceSnapshot {
        self.last_date = Some(date);
        self.nav_history.push(self.nav);
        self.performance_history.push(self.nav - self.allocation);
        self.metrics = PerformanceMetrics::compute(
            &self.nav_history,
            &self.performance_history,
            &self.profit_history,
            self.initial_nav,
            self.nav,
            self.elapsed_days(),
            self.max_drawdown,
            self.allocation,
        );
        debug!(
            strategy = %self.strategy_id,
            ?event,
            nav = self.nav,
            max_drawdown = self.max_drawdown,
            sharpe = self.metrics.sharpe_ratio,
            "performance recomputed"
        );
        self.snapshot(event, date)
    }

    fn snapshot(&self, event: SnapshotEvent, date: DateTime<Utc>) -> PerformanceSnapshot {
        PerformanceSnapshot {
            strategy_id: self.strategy_id.clone(),
            event,
            allocation: self.allocation,
            nav: self.nav,
            nav_peak: self.nav_peak,
            drawdown: self.drawdown,
            max_drawdown: self.max_drawdown,
            metrics: self.metrics,
            performance_history: self.performance_history.clone(),
            nav_history: self.nav_history.clone(),
            profit_history: self.profit_history.clone(),
            created_at: Some(date),
        }
    }
}
