//! EMA crossover breakout.
//!
//! On every closed candle of its timeframe the strategy compares the fast and
//! slow EMAs attached to the candle:
//! - golden cross (fast crosses above slow) opens a long, with optional
//!   take-profit and stop-loss as a percentage of the fill price
//! - death cross (fast crosses below slow) closes every open order
//!
//! The EMAs are registered under [`EMA_FAST_KEY`] and [`EMA_SLOW_KEY`] by the
//! config layer.

use tickreplay_core::domain::{Candle, Order, OrderStatus, Tick, Timeframe};
use tickreplay_core::strategy::{Strategy, StrategyState};
use tracing::{debug, info};

use crate::config::{EMA_FAST_KEY, EMA_SLOW_KEY};

#[derive(Debug, Clone)]
pub struct EmaCrossover {
    timeframe: Timeframe,
    volume: f64,
    take_profit_pct: Option<f64>,
    stop_loss_pct: Option<f64>,
    /// (fast, slow) of the previous closed candle.
    previous: Option<(f64, f64)>,
}

impl EmaCrossover {
    pub fn new(timeframe: Timeframe, volume: f64) -> Self {
        Self {
            timeframe,
            volume,
            take_profit_pct: None,
            stop_loss_pct: None,
            previous: None,
        }
    }

    pub fn with_take_profit_pct(mut self, pct: Option<f64>) -> Self {
        self.take_profit_pct = pct;
        self
    }

    pub fn with_stop_loss_pct(mut self, pct: Option<f64>) -> Self {
        self.stop_loss_pct = pct;
        self
    }

    fn entry(&self, symbol: &str, price: f64) -> Order {
        let mut order = Order::buy(symbol, self.volume);
        if let Some(pct) = self.take_profit_pct {
            order = order.with_take_profit(price * (1.0 + pct / 100.0));
        }
        if let Some(pct) = self.stop_loss_pct {
            order = order.with_stop_loss(price * (1.0 - pct / 100.0));
        }
        order
    }
}

impl Strategy for EmaCrossover {
    fn on_tick(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    fn on_candle_close(&mut self, ctx: &mut StrategyState, candle: &Candle) {
        if candle.timeframe != self.timeframe {
            return;
        }
        let (Some(fast), Some(slow)) = (candle.indicator(EMA_FAST_KEY), candle.indicator(EMA_SLOW_KEY))
        else {
            return;
        };

        if let Some((fast_prev, slow_prev)) = self.previous {
            let golden = fast > slow && fast_prev <= slow_prev;
            let death = fast < slow && fast_prev >= slow_prev;

            if golden && ctx.open_orders().is_empty() {
                let entry = self.entry(ctx.symbol(), ctx.price());
                let order = ctx.open(entry);
                debug!(
                    strategy = %ctx.id(),
                    fast,
                    slow,
                    status = ?order.status,
                    "golden cross"
                );
            } else if death && !ctx.open_orders().is_empty() {
                let closed = ctx.close_all();
                debug!(strategy = %ctx.id(), fast, slow, closed = closed.len(), "death cross");
            }
        }
        self.previous = Some((fast, slow));
    }

    fn on_transaction(&mut self, ctx: &mut StrategyState, order: &Order) {
        if order.status == OrderStatus::Closed {
            info!(
                strategy = %ctx.id(),
                order_id = %order.id,
                reason = ?order.close_reason,
                profit = order.net_profit(),
                "trade closed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tickreplay_core::domain::CloseReason;
    use tickreplay_core::indicators::IndicatorSpec;
    use tickreplay_core::orderbook::OrderbookConfig;
    use tickreplay_core::strategy::{StrategyConfig, StrategyContext, TimeframeConfig};

    fn context(strategy: EmaCrossover) -> StrategyContext {
        let tf = TimeframeConfig::new(Timeframe::OneMinute)
            .with_indicator(IndicatorSpec::Ema {
                period: 2,
                key: Some(EMA_FAST_KEY.into()),
            })
            .with_indicator(IndicatorSpec::Ema {
                period: 4,
                key: Some(EMA_SLOW_KEY.into()),
            });
        let config = StrategyConfig::new("cross", "BTCUSDT", OrderbookConfig::new(10_000.0, 1.0))
            .with_timeframe(tf);
        let mut ctx = StrategyContext::new(&config, Box::new(strategy)).unwrap();
        ctx.setup();
        ctx
    }

    /// One tick per minute; each minute's candle closes on the next tick.
    fn feed(ctx: &mut StrategyContext, prices: &[f64]) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (i, &price) in prices.iter().enumerate() {
            ctx.on_tick(&Tick::new(base + Duration::minutes(i as i64), price).unwrap());
        }
    }

    #[test]
    fn enters_on_golden_cross_and_exits_on_death_cross() {
        let mut ctx = context(EmaCrossover::new(Timeframe::OneMinute, 1.0));
        // falling, then rising (golden cross), then falling hard (death cross)
        let mut prices: Vec<f64> = (0..6).map(|i| 100.0 - i as f64).collect();
        prices.extend((0..6).map(|i| 96.0 + 3.0 * i as f64));
        feed(&mut ctx, &prices);
        assert_eq!(ctx.state().open_orders().len(), 1);

        feed_from(&mut ctx, prices.len(), &[90.0, 80.0, 70.0, 60.0]);
        assert!(ctx.state().open_orders().is_empty());
        let snapshot = ctx.finish();
        assert_eq!(snapshot.profit_history.len(), 1);
    }

    #[test]
    fn take_profit_closes_the_entry() {
        let strategy = EmaCrossover::new(Timeframe::OneMinute, 1.0).with_take_profit_pct(Some(1.0));
        let mut ctx = context(strategy);
        let mut prices: Vec<f64> = (0..6).map(|i| 100.0 - i as f64).collect();
        prices.extend((0..6).map(|i| 96.0 + 3.0 * i as f64));
        prices.push(200.0);
        feed(&mut ctx, &prices);

        let closed: Vec<_> = ctx
            .state()
            .orderbook()
            .orders()
            .filter(|o| o.status == OrderStatus::Closed)
            .collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close_reason, Some(CloseReason::TakeProfit));
    }

    fn feed_from(ctx: &mut StrategyContext, offset: usize, prices: &[f64]) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for (i, &price) in prices.iter().enumerate() {
            let minute = (offset + i) as i64;
            ctx.on_tick(&Tick::new(base + Duration::minutes(minute), price).unwrap());
        }
    }
}
