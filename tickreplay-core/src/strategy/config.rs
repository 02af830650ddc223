use crate::domain::{StrategyId, Timeframe};
use crate::indicators::pipeline::DEFAULT_HISTORY;
use crate::indicators::IndicatorSpec;
use crate::orderbook::OrderbookConfig;
use serde::{Deserialize, Serialize};

/// Everything needed to build one strategy instance's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: StrategyId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub symbol: String,
    #[serde(default)]
    pub source: String,
    pub orderbook: OrderbookConfig,
    #[serde(default)]
    pub timeframes: Vec<TimeframeConfig>,
}

/// Candle history and indicators for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    pub timeframe: Timeframe,
    #[serde(default = "default_history")]
    pub history: usize,
    #[serde(default)]
    pub indicators: Vec<IndicatorSpec>,
}

impl TimeframeConfig {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            history: DEFAULT_HISTORY,
            indicators: Vec::new(),
        }
    }

    pub fn with_indicator(mut self, spec: IndicatorSpec) -> Self {
        self.indicators.push(spec);
        self
    }
}

impl StrategyConfig {
    pub fn new(id: &str, symbol: &str, orderbook: OrderbookConfig) -> Self {
        Self {
            id: StrategyId::from(id),
            enabled: true,
            symbol: symbol.to_string(),
            source: String::new(),
            orderbook,
            timeframes: Vec::new(),
        }
    }

    pub fn with_timeframe(mut self, timeframe: TimeframeConfig) -> Self {
        self.timeframes.push(timeframe);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn default_enabled() -> bool {
    true
}

fn default_history() -> usize {
    DEFAULT_HISTORY
}
