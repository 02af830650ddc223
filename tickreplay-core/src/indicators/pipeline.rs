use super::{Indicator, IndicatorSpec};
use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Default number of closed candles kept per timeframe.
pub const DEFAULT_HISTORY: usize = 500;

/// Closed-candle history plus the indicators computed over it, for one timeframe.
#[derive(Debug)]
pub struct IndicatorPipeline {
    timeframe: Timeframe,
    indicators: Vec<Box<dyn Indicator>>,
    history: VecDeque<Candle>,
    capacity: usize,
    last_close: Option<DateTime<Utc>>,
}

impl IndicatorPipeline {
    pub fn new(timeframe: Timeframe) -> Self {
        Self::with_capacity(timeframe, DEFAULT_HISTORY)
    }

    pub fn with_capacity(timeframe: Timeframe, capacity: usize) -> Self {
        Self {
            timeframe,
            indicators: Vec::new(),
            history: VecDeque::new(),
            capacity: capacity.max(1),
            last_close: None,
        }
    }

    pub fn from_specs(timeframe: Timeframe, capacity: usize, specs: &[IndicatorSpec]) -> Self {
        let mut pipeline = Self::with_capacity(timeframe, capacity);
        for spec in specs {
            pipeline.add(spec.build());
        }
        pipeline
    }

    /// Register an indicator. History grows to cover its lookback.
    pub fn add(&mut self, indicator: Box<dyn Indicator>) {
        self.capacity = self.capacity.max(indicator.lookback());
        self.indicators.push(indicator);
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Consume a closed candle. Candles whose close time is not after the last
    /// processed one are ignored, so each candle yields at most one value per
    /// indicator. Returns the stored candle with its indicator values attached.
    pub fn on_candle_close(&mut self, mut candle: Candle) -> Option<&Candle> {
        if self.last_close.is_some_and(|last| candle.close_time <= last) {
            return None;
        }
        self.last_close = Some(candle.close_time);
        for indicator in self.indicators.iter_mut() {
            if let Some(value) = indicator.update(&candle) {
                candle.indicators.insert(indicator.name().to_string(), value.value);
            }
        }
        self.history.push_back(candle);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.history.back()
    }

    /// Closed candles, oldest first.
    pub fn candles(&self) -> &VecDeque<Candle> {
        &self.history
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.history.back()
    }

    /// Latest value of the named indicator.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.indicators
            .iter()
            .find(|i| i.name() == name)
            .and_then(|i| i.latest())
            .map(|v| v.value)
    }

    pub fn indicator_names(&self) -> Vec<&str> {
        self.indicators.iter().map(|i| i.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, Ema, Sma, DEFAULT_EPSILON};

    #[test]
    fn attaches_values_by_name() {
        let mut pipeline = IndicatorPipeline::new(Timeframe::OneMinute);
        pipeline.add(Box::new(Sma::new(2)));
        pipeline.add(Box::new(Ema::new(1)));

        let candles = make_candles(&[10.0, 20.0]);
        let first = pipeline.on_candle_close(candles[0].clone()).unwrap();
        assert!(first.indicator("sma_2").is_none());
        assert_approx(first.indicator("ema_1").unwrap(), 10.0, DEFAULT_EPSILON);

        let second = pipeline.on_candle_close(candles[1].clone()).unwrap();
        assert_approx(second.indicator("sma_2").unwrap(), 15.0, DEFAULT_EPSILON);
        assert_approx(pipeline.latest("sma_2").unwrap(), 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn repeated_close_is_processed_once() {
        let mut pipeline = IndicatorPipeline::new(Timeframe::OneMinute);
        pipeline.add(Box::new(Sma::new(1)));
        let candles = make_candles(&[10.0, 20.0]);
        assert!(pipeline.on_candle_close(candles[1].clone()).is_some());
        assert!(pipeline.on_candle_close(candles[1].clone()).is_none());
        assert!(pipeline.on_candle_close(candles[0].clone()).is_none());
        assert_eq!(pipeline.candles().len(), 1);
    }

    #[test]
    fn history_is_bounded_but_covers_lookback() {
        let mut pipeline = IndicatorPipeline::with_capacity(Timeframe::OneMinute, 3);
        pipeline.add(Box::new(Sma::new(5)));
        for c in make_candles(&[1.0; 12]) {
            pipeline.on_candle_close(c);
        }
        assert_eq!(pipeline.candles().len(), 5);
    }

    #[test]
    fn builds_from_specs() {
        let specs = vec![
            IndicatorSpec::Sma { period: 3, key: None },
            IndicatorSpec::Velocity { window: 2, key: Some("pv".into()) },
        ];
        let pipeline = IndicatorPipeline::from_specs(Timeframe::OneHour, 10, &specs);
        assert_eq!(pipeline.indicator_names(), vec!["sma_3", "pv"]);
    }
}
