//! Candle aggregation.
//!
//! One aggregator per timeframe holds at most one live candle. A tick at or
//! past the live candle's close time freezes it, emits it, and opens the next
//! candle at the tick's aligned boundary. Gaps in the tick stream produce no
//! empty candles.

use crate::domain::{Candle, Tick, Timeframe};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct CandleAggregator {
    symbol: String,
    source: String,
    timeframe: Timeframe,
    live: Option<Candle>,
}

impl CandleAggregator {
    pub fn new(symbol: &str, source: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            source: source.to_string(),
            timeframe,
            live: None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// The candle currently being built, if any.
    pub fn live(&self) -> Option<&Candle> {
        self.live.as_ref()
    }

    /// Fold a tick in. Returns the candle that closed because of it.
    pub fn on_tick(&mut self, tick: &Tick) -> Option<Candle> {
        match self.live.as_mut() {
            Some(candle) if tick.date() < candle.close_time => {
                candle.update(tick.price());
                None
            }
            _ => {
                let next = Candle::open_at(
                    &self.symbol,
                    &self.source,
                    self.timeframe,
                    tick.date(),
                    tick.price(),
                );
                self.live.replace(next)
            }
        }
    }

    /// Emit the live candle regardless of its close time (end of run).
    pub fn flush(&mut self) -> Option<Candle> {
        self.live.take()
    }
}

/// Independent aggregators for several timeframes over one symbol.
#[derive(Debug, Clone)]
pub struct MultiTimeframeAggregator {
    aggregators: BTreeMap<Timeframe, CandleAggregator>,
}

impl MultiTimeframeAggregator {
    pub fn new(symbol: &str, source: &str, timeframes: &[Timeframe]) -> Self {
        let aggregators = timeframes
            .iter()
            .map(|&tf| (tf, CandleAggregator::new(symbol, source, tf)))
            .collect();
        Self { aggregators }
    }

    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.aggregators.keys().copied()
    }

    pub fn live(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.aggregators.get(&timeframe).and_then(|a| a.live())
    }

    /// Feed the tick to every timeframe; returns closed candles, shortest timeframe first.
    pub fn on_tick(&mut self, tick: &Tick) -> Vec<Candle> {
        self.aggregators
            .values_mut()
            .filter_map(|agg| agg.on_tick(tick))
            .collect()
    }
}
