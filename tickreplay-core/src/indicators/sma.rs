//! Simple Moving Average (SMA).
//!
//! Mean of the last `period` closes. Silent until `period` candles have closed,
//! then one value per close.

use super::{Indicator, IndicatorValue, Keyed};
use crate::domain::Candle;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
    window: VecDeque<f64>,
    latest: Option<IndicatorValue>,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("sma_{period}"),
            window: VecDeque::with_capacity(period + 1),
            latest: None,
        }
    }
}

impl Keyed for Sma {
    fn keyed(mut self, key: &str) -> Self {
        self.name = key.to_string();
        self
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        self.window.push_back(candle.close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        if self.window.len() < self.period {
            return None;
        }
        // Summed from the window each time so long runs don't accumulate drift
        let mean = self.window.iter().sum::<f64>() / self.period as f64;
        let value = IndicatorValue {
            timestamp: candle.close_time,
            value: mean,
        };
        self.latest = Some(value);
        Some(value)
    }

    fn latest(&self) -> Option<IndicatorValue> {
        self.latest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn sma_5_waits_for_fifth_candle() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let mut sma = Sma::new(5);
        let emitted: Vec<Option<IndicatorValue>> = candles.iter().map(|c| sma.update(c)).collect();
        assert!(emitted[..4].iter().all(Option::is_none));
        assert_approx(emitted[4].unwrap().value, 3.0, DEFAULT_EPSILON);
        assert_approx(emitted[5].unwrap().value, 4.0, DEFAULT_EPSILON);
        assert_approx(emitted[6].unwrap().value, 5.0, DEFAULT_EPSILON);
        assert_eq!(emitted[6].unwrap().timestamp, candles[6].close_time);
    }

    #[test]
    fn sma_1_is_identity() {
        let candles = make_candles(&[10.0, 11.5, 9.25]);
        let mut sma = Sma::new(1);
        for c in &candles {
            assert_approx(sma.update(c).unwrap().value, c.close, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn custom_key() {
        let sma = Sma::new(20).keyed("trend");
        assert_eq!(sma.name(), "trend");
        assert_eq!(Sma::new(20).name(), "sma_20");
    }
}
