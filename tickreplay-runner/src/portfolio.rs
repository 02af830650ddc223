//! Portfolio runs: one session per asset config, in parallel.
//!
//! Sessions share nothing but the filesystem layout; each owns its tick
//! store read, strategy contexts and persistence worker. One failing asset
//! does not abort the others.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::{BacktestConfig, DateRange};
use crate::restore::RestoreMode;
use crate::session::{BacktestSession, RunError, RunReport};

/// Result of one asset within a portfolio run.
#[derive(Debug)]
pub struct AssetOutcome {
    pub symbol: String,
    pub result: Result<RunReport, RunError>,
}

/// Portfolio-wide totals over the assets that completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub assets: usize,
    pub completed: usize,
    pub failed: usize,
    pub allocation: f64,
    pub nav: f64,
}

impl PortfolioSummary {
    /// Gain over the combined allocation, as a fraction.
    pub fn performance_percentage(&self) -> f64 {
        if self.allocation == 0.0 {
            return 0.0;
        }
        (self.nav - self.allocation) / self.allocation
    }
}

pub struct PortfolioRunner {
    parallel: bool,
}

impl Default for PortfolioRunner {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl PortfolioRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every config over `range`. Outcomes keep the input order.
    pub fn run(
        &self,
        configs: &[BacktestConfig],
        range: DateRange,
        restore: Option<RestoreMode>,
    ) -> Vec<AssetOutcome> {
        info!(assets = configs.len(), parallel = self.parallel, "portfolio starting");
        let run_one = |config: &BacktestConfig| {
            let symbol = config.asset.symbol.clone();
            let result = BacktestSession::new(config.clone(), range).and_then(|s| s.run(restore));
            if let Err(e) = &result {
                error!(symbol = %symbol, error = %e, "asset failed");
            }
            AssetOutcome { symbol, result }
        };

        if self.parallel {
            configs.par_iter().map(run_one).collect()
        } else {
            configs.iter().map(run_one).collect()
        }
    }
}

/// Sum allocations and final NAVs across completed assets.
pub fn summarize(outcomes: &[AssetOutcome]) -> PortfolioSummary {
    let mut summary = PortfolioSummary {
        assets: outcomes.len(),
        ..Default::default()
    };
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                summary.completed += 1;
                for snapshot in &report.snapshots {
                    summary.allocation += snapshot.allocation;
                    summary.nav += snapshot.nav;
                }
            }
            Err(_) => summary.failed += 1,
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_nothing_is_flat() {
        let summary = summarize(&[]);
        assert_eq!(summary, PortfolioSummary::default());
        assert_eq!(summary.performance_percentage(), 0.0);
    }

    #[test]
    fn failures_are_counted() {
        let outcomes = vec![AssetOutcome {
            symbol: "BTCUSDT".into(),
            result: Err(RunError::NoEnabledStrategies),
        }];
        let summary = summarize(&outcomes);
        assert_eq!(summary.assets, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 0);
    }
}
