//! Built-in strategies, constructed from their config kind.

pub mod buy_and_hold;
pub mod ema_crossover;

pub use buy_and_hold::BuyAndHold;
pub use ema_crossover::EmaCrossover;

use tickreplay_core::strategy::Strategy;

use crate::config::StrategyKind;

pub fn build_strategy(kind: &StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::EmaCrossover {
            timeframe,
            volume,
            take_profit_pct,
            stop_loss_pct,
            ..
        } => Box::new(
            EmaCrossover::new(*timeframe, *volume)
                .with_take_profit_pct(*take_profit_pct)
                .with_stop_loss_pct(*stop_loss_pct),
        ),
        StrategyKind::BuyAndHold { volume } => Box::new(BuyAndHold::new(*volume)),
    }
}
