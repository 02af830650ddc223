//! Price acceleration: difference of consecutive velocities, averaged over a
//! trailing window. 0.0 until three closes have been seen.

use super::{Indicator, IndicatorValue, Keyed};
use crate::domain::Candle;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Acceleration {
    window: usize,
    name: String,
    last_price: Option<f64>,
    last_velocity: Option<f64>,
    accelerations: VecDeque<f64>,
    latest: Option<IndicatorValue>,
}

impl Acceleration {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            name: format!("acceleration_{window}"),
            last_price: None,
            last_velocity: None,
            accelerations: VecDeque::with_capacity(window + 1),
            latest: None,
        }
    }
}

impl Keyed for Acceleration {
    fn keyed(mut self, key: &str) -> Self {
        self.name = key.to_string();
        self
    }
}

impl Indicator for Acceleration {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window + 2
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let velocity = self.last_price.replace(candle.close).map(|p| candle.close - p);
        let value = match (velocity, velocity.and_then(|v| self.last_velocity.replace(v))) {
            (Some(v), Some(prev_v)) => {
                self.accelerations.push_back(v - prev_v);
                if self.accelerations.len() > self.window {
                    self.accelerations.pop_front();
                }
                self.accelerations.iter().sum::<f64>() / self.accelerations.len() as f64
            }
            _ => 0.0,
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
