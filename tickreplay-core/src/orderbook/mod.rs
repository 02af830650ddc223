//! Order lifecycle and leveraged margin accounting.
//!
//! One [`OrderbookEngine`] per strategy instance. It owns every order it
//! creates; other components only see clones handed out as transactions.

pub mod config;
pub mod engine;

pub use config::OrderbookConfig;
pub use engine::{MarginState, OrderbookEngine, RejectReason};

use crate::domain::{OrderId, OrderStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderbookError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} cannot be closed in state {1:?}")]
    InvalidState(OrderId, OrderStatus),

    #[error("allocation must be positive and finite, got {0}")]
    InvalidAllocation(f64),

    #[error("leverage must be >= 1, got {0}")]
    InvalidLeverage(f64),

    #[error("liquidation ratio {liquidation} must be >= 0 and <= recovery ratio {recovery}")]
    InvalidRatios { liquidation: f64, recovery: f64 },

    #[error("commission rate must be in [0, 1), got {0}")]
    InvalidCommission(f64),
}
