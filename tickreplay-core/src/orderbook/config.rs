use super::OrderbookError;
use serde::{Deserialize, Serialize};

/// Per-instance orderbook parameters.
///
/// `liquidation_ratio` is the margin level below which every open order is
/// force-closed. New orders stay blocked until an open would leave the margin
/// level at or above `recovery_ratio`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookConfig {
    pub allocation: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_liquidation_ratio")]
    pub liquidation_ratio: f64,
    #[serde(default = "default_recovery_ratio")]
    pub recovery_ratio: f64,
    /// Fraction of notional charged on each leg.
    #[serde(default)]
    pub commission_rate: f64,
}

fn default_leverage() -> f64 {
    1.0
}

fn default_liquidation_ratio() -> f64 {
    0.2
}

fn default_recovery_ratio() -> f64 {
    0.5
}

impl OrderbookConfig {
    pub fn new(allocation: f64, leverage: f64) -> Self {
        Self {
            allocation,
            leverage,
            liquidation_ratio: default_liquidation_ratio(),
            recovery_ratio: default_recovery_ratio(),
            commission_rate: 0.0,
        }
    }

    pub fn with_ratios(mut self, liquidation: f64, recovery: f64) -> Self {
        self.liquidation_ratio = liquidation;
        self.recovery_ratio = recovery;
        self
    }

    pub fn with_commission(mut self, rate: f64) -> Self {
        self.commission_rate = rate;
        self
    }

    pub fn validate(&self) -> Result<(), OrderbookError> {
        if !self.allocation.is_finite() || self.allocation <= 0.0 {
            return Err(OrderbookError::InvalidAllocation(self.allocation));
        }
        if !self.leverage.is_finite() || self.leverage < 1.0 {
            return Err(OrderbookError::InvalidLeverage(self.leverage));
        }
        if !(self.liquidation_ratio >= 0.0 && self.recovery_ratio >= self.liquidation_ratio)
            || !self.recovery_ratio.is_finite()
        {
            return Err(OrderbookError::InvalidRatios {
                liquidation: self.liquidation_ratio,
                recovery: self.recovery_ratio,
            });
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            return Err(OrderbookError::InvalidCommission(self.commission_rate));
        }
        Ok(())
    }
}
