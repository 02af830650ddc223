use super::config::StrategyConfig;
use crate::analytics::AnalyticsEngine;
use crate::candles::MultiTimeframeAggregator;
use crate::domain::{Candle, CloseReason, Order, OrderId, StrategyId, Tick, Timeframe};
use crate::indicators::IndicatorPipeline;
use crate::orderbook::{OrderbookEngine, OrderbookError};
use std::collections::{BTreeMap, VecDeque};

/// Per-instance state a strategy reads and acts on.
#[derive(Debug)]
pub struct StrategyState {
    pub(crate) id: StrategyId,
    pub(crate) symbol: String,
    pub(crate) orderbook: OrderbookEngine,
    pub(crate) analytics: AnalyticsEngine,
    pub(crate) candles: MultiTimeframeAggregator,
    pub(crate) pipelines: BTreeMap<Timeframe, IndicatorPipeline>,
    pub(crate) tick: Option<Tick>,
}

impl StrategyState {
    pub fn new(config: &StrategyConfig) -> Result<Self, OrderbookError> {
        let orderbook = OrderbookEngine::new(config.orderbook.clone())?;
        let analytics = AnalyticsEngine::new(config.id.clone(), orderbook.allocation(), orderbook.nav());
        let timeframes: Vec<Timeframe> = config.timeframes.iter().map(|t| t.timeframe).collect();
        let pipelines = config
            .timeframes
            .iter()
            .map(|t| {
                (
                    t.timeframe,
                    IndicatorPipeline::from_specs(t.timeframe, t.history, &t.indicators),
                )
            })
            .collect();
        Ok(Self {
            id: config.id.clone(),
            symbol: config.symbol.clone(),
            orderbook,
            analytics,
            candles: MultiTimeframeAggregator::new(&config.symbol, &config.source, &timeframes),
            pipelines,
            tick: None,
        })
    }

    pub fn id(&self) -> &StrategyId {
        &self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Tick currently being processed.
    pub fn tick(&self) -> Option<&Tick> {
        self.tick.as_ref()
    }

    pub fn price(&self) -> f64 {
        self.tick.map(|t| t.price()).unwrap_or(0.0)
    }

    pub fn orderbook(&self) -> &OrderbookEngine {
        &self.orderbook
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    // ── Orders ─────────────────────────────────────────────────────────

    /// Submit an order on this instance's symbol. See [`OrderbookEngine::open`].
    pub fn open(&mut self, mut order: Order) -> Order {
        if order.symbol.is_empty() {
            order.symbol = self.symbol.clone();
        }
        self.orderbook.open(order)
    }

    pub fn buy(&mut self, volume: f64) -> Order {
        let order = Order::buy(&self.symbol, volume);
        self.orderbook.open(order)
    }

    pub fn sell(&mut self, volume: f64) -> Order {
        let order = Order::sell(&self.symbol, volume);
        self.orderbook.open(order)
    }

    pub fn close(&mut self, id: &OrderId) -> Result<Order, OrderbookError> {
        self.orderbook.close(id)
    }

    pub fn close_all(&mut self) -> Vec<Order> {
        self.orderbook.close_all(CloseReason::Manual)
    }

    pub fn open_orders(&self) -> Vec<&Order> {
        self.orderbook.open_orders().collect()
    }

    // ── Candles and indicators ─────────────────────────────────────────

    /// Closed candles for `timeframe`, oldest first.
    pub fn candles(&self, timeframe: Timeframe) -> Option<&VecDeque<Candle>> {
        self.pipelines.get(&timeframe).map(|p| p.candles())
    }

    pub fn last_candle(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.pipelines.get(&timeframe).and_then(|p| p.last_candle())
    }

    pub fn live_candle(&self, timeframe: Timeframe) -> Option<&Candle> {
        self.candles.live(timeframe)
    }

    /// Latest value of indicator `name` on `timeframe`.
    pub fn indicator(&self, timeframe: Timeframe, name: &str) -> Option<f64> {
        self.pipelines.get(&timeframe).and_then(|p| p.latest(name))
    }
}
