//! Strategy composition.
//!
//! A [`Strategy`] holds decision logic only. Everything it can touch lives in
//! [`StrategyState`]: the orderbook, analytics, candles and indicators of one
//! strategy instance. [`StrategyContext`] pairs the two and drives the fixed
//! per-tick cascade; an [`Asset`] runs several contexts over one tick stream.

pub mod asset;
pub mod config;
pub mod context;
pub mod state;

pub use asset::Asset;
pub use config::{StrategyConfig, TimeframeConfig};
pub use context::StrategyContext;
pub use state::StrategyState;

use crate::domain::{Candle, Order, Tick};

/// Lifecycle callbacks. Every method except `on_tick` defaults to a no-op.
pub trait Strategy: Send {
    fn setup(&mut self, _ctx: &mut StrategyState) {}

    fn on_tick(&mut self, ctx: &mut StrategyState, tick: &Tick);

    /// A candle of one of the configured timeframes closed, indicators attached.
    fn on_candle_close(&mut self, _ctx: &mut StrategyState, _candle: &Candle) {}

    fn on_new_minute(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    fn on_new_hour(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    fn on_new_day(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    fn on_new_week(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    fn on_new_month(&mut self, _ctx: &mut StrategyState, _tick: &Tick) {}

    /// An order was opened or closed by this strategy's orderbook.
    fn on_transaction(&mut self, _ctx: &mut StrategyState, _order: &Order) {}

    fn on_end(&mut self, _ctx: &mut StrategyState) {}
}
