//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = k * close[t] + (1 - k) * EMA[t-1], k = 2 / (period + 1)
//! Seed: SMA of the first `period` closes.

use super::{Indicator, IndicatorValue, Keyed};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
    alpha: f64,
    seed: Vec<f64>,
    prev: Option<f64>,
    latest: Option<IndicatorValue>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("ema_{period}"),
            alpha: 2.0 / (period as f64 + 1.0),
            seed: Vec::with_capacity(period),
            prev: None,
            latest: None,
        }
    }
}

impl Keyed for Ema {
    fn keyed(mut self, key: &str) -> Self {
        self.name = key.to_string();
        self
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn update(&mut self, candle: &Candle) -> Option<IndicatorValue> {
        let ema = match self.prev {
            Some(prev) => self.alpha * candle.close + (1.0 - self.alpha) * prev,
            None => {
                self.seed.push(candle.close);
                if self.seed.len() < self.period {
                    return None;
                }
                let seed = self.seed.iter().sum::<f64>() / self.period as f64;
                self.seed.clear();
                seed
            }
        };
        self.prev = Some(ema);
        let value = IndicatorValue {
            timestamp: candle.close_time,
            value: ema,
        };
        self.latest = Some(value);
        Some(value)
    }

    fn latest(&self) -> Option<IndicatorValue> {
        self.latest
    }
}
