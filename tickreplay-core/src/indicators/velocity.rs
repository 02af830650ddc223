//! Price velocity: first difference of closes, averaged over a trailing window.
//!
//! The first close yields 0.0. With `window = 1` the value is exactly
//! `close[t] - close[t-1]`.

use super::{Indicator, IndicatorValue, Keyed};
use crate::domain::Candle;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Velocity {
    window: usize,
    name: String,
    last_price: Option<f64>,
    velocities: VecDeque<f64>,
    latest: Option<IndicatorValue>,
}

impl Velocity {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            name: format!("velocity_{window}"),
            last_price: None,
            velocities: VecDeque::with_capacity(window + 1),
            latest: None,
        }
    }
}

impl Keyed for Velocity {
    fn keyed(mut self, key: &str) -> Self {
        self.name = key.to_string();
        self
    }
}

impl Indicator for Velocity {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window + 1
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let value = match self.last_price.replace(candle.close) {
            None => 0.0,
            Some(prev) => {
                self.velocities.push_back(candle.close - prev);
                if self.velocities.len() > self.window {
                    self.velocities.pop_front();
                }
                self.velocities.iter().sum::<f64>() / self.velocities.len() as f64
            }
        };
        let value = IndicatorValue {
            timestamp: candle.close_time,
            value,
        };
        self.latest = Some(value);
        Some(value)
    }

    fn latest(&self) -> Option<IndicatorValue> {
        self.latest
    }
}
