//! Candle — OHLCV aggregate of ticks over one timeframe window.

use super::timeframe::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A candle is mutable only while live; once its close time passes it is
/// frozen and handed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub source: String,
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Number of ticks folded into the candle.
    pub volume: f64,
    /// Indicator values computed from this candle, keyed by indicator name.
    pub indicators: BTreeMap<String, f64>,
}

impl Candle {
    /// Open a new candle at the aligned boundary containing `date`.
    pub fn open_at(
        symbol: &str,
        source: &str,
        timeframe: Timeframe,
        date: DateTime<Utc>,
        price: f64,
    ) -> Self {
        let open_time = timeframe.align(date);
        Self {
            symbol: symbol.to_string(),
            source: source.to_string(),
            timeframe,
            open_time,
            close_time: timeframe.close_time(open_time),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1.0,
            indicators: BTreeMap::new(),
        }
    }

    /// Fold one more price into a live candle.
    pub fn update(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += 1.0;
    }

    /// Attached indicator value by name.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied()
    }
}
