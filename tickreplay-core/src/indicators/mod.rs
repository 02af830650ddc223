//! Streaming indicators over closed candles.
//!
//! Every indicator implements [`Indicator`] and consumes one closed candle at a
//! time. State only moves forward: to restart an indicator, build a new one.
//!
//! The [`IndicatorPipeline`] owns the bounded closed-candle history for one
//! timeframe, feeds each new candle through its indicators exactly once, and
//! attaches the produced values to the candle under the indicator's name.

pub mod acceleration;
pub mod ema;
pub mod pipeline;
pub mod sma;
pub mod velocity;
pub mod volatility;

pub use acceleration::Acceleration;
pub use ema::Ema;
pub use pipeline::IndicatorPipeline;
pub use sma::Sma;
pub use velocity::Velocity;
pub use volatility::Volatility;

use crate::domain::Candle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indicator output, stamped with the close time of its source candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A keyed, forward-only transform over closed candles.
pub trait Indicator: Send + std::fmt::Debug {
    /// Key under which values are attached to candles.
    fn name(&self) -> &str;

    /// Closed candles required before the first emission.
    fn lookback(&self) -> usize;

    /// Consume one closed candle. Returns the value computed from it, if any.
    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue>;

    /// Most recent emission.
    fn latest(&self) -> Option<IndicatorValue>;
}

/// Serializable indicator description used by strategy configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorSpec {
    Sma { period: usize, key: Option<String> },
    Ema { period: usize, key: Option<String> },
    Velocity { window: usize, key: Option<String> },
    Acceleration { window: usize, key: Option<String> },
    Volatility { window: usize, key: Option<String> },
}

impl IndicatorSpec {
    pub fn window(&self) -> usize {
        match self {
            IndicatorSpec::Sma { period, .. } | IndicatorSpec::Ema { period, .. } => *period,
            IndicatorSpec::Velocity { window, .. }
            | IndicatorSpec::Acceleration { window, .. }
            | IndicatorSpec::Volatility { window, .. } => *window,
        }
    }

    pub fn build(&self) -> Box<dyn Indicator> {
        match self {
            IndicatorSpec::Sma { period, key } => Box::new(with_key(Sma::new(*period), key)),
            IndicatorSpec::Ema { period, key } => Box::new(with_key(Ema::new(*period), key)),
            IndicatorSpec::Velocity { window, key } => {
                Box::new(with_key(Velocity::new(*window), key))
            }
            IndicatorSpec::Acceleration { window, key } => {
                Box::new(with_key(Acceleration::new(*window), key))
            }
            IndicatorSpec::Volatility { window, key } => {
                Box::new(with_key(Volatility::new(*window), key))
            }
        }
    }
}

/// Indicators whose attachment key can be overridden.
pub trait Keyed: Sized {
    fn keyed(self, key: &str) -> Self;
}

fn with_key<T: Keyed>(indicator: T, key: &Option<String>) -> T {
    match key {
        Some(k) => indicator.keyed(k),
        None => indicator,
    }
}

/// Closed one-minute candles from close prices, for tests.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use crate::domain::Timeframe;
    use chrono::{Duration, TimeZone};
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let mut candle = Candle::open_at(
                "TEST",
                "test",
                Timeframe::OneMinute,
                base + Duration::minutes(i as i64),
                close,
            );
            candle.update(close);
            candle
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
