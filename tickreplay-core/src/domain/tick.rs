//! Tick — a single timestamped price observation driving the simulation clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TickError {
    #[error("tick price must be finite and non-negative, got {0}")]
    InvalidPrice(f64),

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("tick at {current} is not after previous tick at {previous}")]
    OutOfOrder {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

/// Immutable price observation. Ticks within a run are strictly ascending by date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    date: DateTime<Utc>,
    price: f64,
}

impl Tick {
    pub fn new(date: DateTime<Utc>, price: f64) -> Result<Self, TickError> {
        if !price.is_finite() || price < 0.0 {
            return Err(TickError::InvalidPrice(price));
        }
        Ok(Self { date, price })
    }

    /// Build a tick from unix seconds, as stored in the tick table.
    pub fn from_unix(seconds: i64, price: f64) -> Result<Self, TickError> {
        let date = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or(TickError::InvalidTimestamp(seconds))?;
        Self::new(date, price)
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn price(&self) -> f64 {
        self.price
    }
}

/// Verify a sequence is strictly ascending by date.
pub fn check_ordering(ticks: &[Tick]) -> Result<(), TickError> {
    for pair in ticks.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(TickError::OutOfOrder {
                previous: pair[0].date,
                current: pair[1].date,
            });
        }
    }
    Ok(())
}
