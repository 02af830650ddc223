use super::context::StrategyContext;
use crate::analytics::PerformanceSnapshot;
use crate::domain::Tick;
use tracing::{info, warn};

/// Strategy contexts sharing one symbol's tick stream. Contexts never share
/// order state.
pub struct Asset {
    symbol: String,
    contexts: Vec<StrategyContext>,
}

impl Asset {
    /// Disabled contexts are dropped here and never see a tick.
    pub fn new(symbol: &str, contexts: Vec<StrategyContext>) -> Self {
        let contexts = contexts
            .into_iter()
            .filter(|ctx| {
                if !ctx.is_enabled() {
                    warn!(symbol, strategy = %ctx.id(), "strategy disabled, skipping");
                }
                ctx.is_enabled()
            })
            .collect();
        Self {
            symbol: symbol.to_string(),
            contexts,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn contexts(&self) -> &[StrategyContext] {
        &self.contexts
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn setup(&mut self) {
        info!(symbol = %self.symbol, strategies = self.contexts.len(), "asset setup");
        for ctx in self.contexts.iter_mut() {
            ctx.setup();
        }
    }

    pub fn on_tick(&mut self, tick: &Tick) {
        for ctx in self.contexts.iter_mut() {
            ctx.on_tick(tick);
        }
    }

    pub fn finish(&mut self) -> Vec<PerformanceSnapshot> {
        self.contexts.iter_mut().map(|ctx| ctx.finish()).collect()
    }
}
