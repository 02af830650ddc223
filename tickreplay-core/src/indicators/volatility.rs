//! Volatility: population standard deviation of trailing percentage returns.
//!
//! The first close yields 0.0. A return against a zero previous close is
//! recorded as 0.0.

use super::{Indicator, IndicatorValue, Keyed};
use crate::domain::Candle;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Volatility {
    window: usize,
    name: String,
    last_price: Option<f64>,
    returns: VecDeque<f64>,
    latest: Option<IndicatorValue>,
}

impl Volatility {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            name: format!("volatility_{window}"),
            last_price: None,
            returns: VecDeque::with_capacity(window + 1),
            latest: None,
        }
    }
}

impl Keyed for Volatility {
    fn keyed(mut self, key: &str) -> Self {
        self.name = key.to_string();
        self
    }
}

impl Indicator for Volatility {
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
                let ret = if prev == 0.0 {
                    0.0
                } else {
                    (candle.close - prev) / prev
                };
                self.returns.push_back(ret);
                if self.returns.len() > self.window {
                    self.returns.pop_front();
                }
                population_std(self.returns.iter().copied())
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

fn population_std(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count();
    if n == 0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    var.sqrt()
}
