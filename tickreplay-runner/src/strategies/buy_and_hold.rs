//! Buy-and-hold baseline: one long order on the first tick, held to the end.

use tickreplay_core::domain::{OrderStatus, Tick};
use tickreplay_core::strategy::{Strategy, StrategyState};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BuyAndHold {
    volume: f64,
    entered: bool,
}

impl BuyAndHold {
    pub fn new(volume: f64) -> Self {
        Self {
            volume,
            entered: false,
        }
    }
}

impl Strategy for BuyAndHold {
    fn on_tick(&mut self, ctx: &mut StrategyState, tick: &Tick) {
        if self.entered {
            return;
        }
        self.entered = true;
        let order = ctx.buy(self.volume);
        if order.status == OrderStatus::Opened {
            info!(strategy = %ctx.id(), price = tick.price(), volume = self.volume, "position entered");
        } else {
            warn!(strategy = %ctx.id(), volume = self.volume, "entry rejected");
        }
    }
}
