//! Per-instance tick cascade.
//!
//! Order of work for every tick:
//! 0. orderbook marks to the tick, so every callback below fills at its price
//! 1. candles aggregate; closed candles go through indicators, then `on_candle_close`
//! 2. orderbook refresh (mark to market, liquidation, take-profit/stop-loss)
//! 3. boundary callbacks, minute → hour → day → week → month. A day boundary
//!    first records a daily snapshot and cleans closed orders.
//! 4. `on_tick`
//! 5. transactions go to analytics, persistence, then `on_transaction`
//! 6. analytics NAV update

use super::config::StrategyConfig;
use super::state::StrategyState;
use super::Strategy;
use crate::analytics::PerformanceSnapshot;
use crate::domain::{OrderStatus, PeriodKind, StrategyId, Tick};
use crate::candles::PeriodClock;
use crate::orderbook::OrderbookError;
use crate::queue::{PersistenceCommand, QueueSender};
use tracing::{debug, info, warn};

/// Upper bound on transaction dispatch rounds per tick, so a strategy that
/// opens an order from every `on_transaction` cannot spin forever.
const MAX_DISPATCH_ROUNDS: usize = 64;

pub struct StrategyContext {
    strategy: Box<dyn Strategy>,
    state: StrategyState,
    clock: PeriodClock,
    enabled: bool,
    persistence: Option<QueueSender<PersistenceCommand>>,
    ticks: u64,
}

impl StrategyContext {
    pub fn new(config: &StrategyConfig, strategy: Box<dyn Strategy>) -> Result<Self, OrderbookError> {
        Ok(Self {
            strategy,
            state: StrategyState::new(config)?,
            clock: PeriodClock::new(),
            enabled: config.enabled,
            persistence: None,
            ticks: 0,
        })
    }

    /// Route order and snapshot records to a persistence worker.
    pub fn with_persistence(mut self, sender: QueueSender<PersistenceCommand>) -> Self {
        self.persistence = Some(sender);
        self
    }

    pub fn id(&self) -> &StrategyId {
        self.state.id()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn ticks_processed(&self) -> u64 {
        self.ticks
    }

    pub fn setup(&mut self) {
        self.strategy.setup(&mut self.state);
        self.dispatch_transactions();
    }

    pub fn on_tick(&mut self, tick: &Tick) {
        if self.ticks == 0 {
            let snapshot = self.state.analytics.start_snapshot(tick.date());
            self.persist(PersistenceCommand::store_snapshot(snapshot));
        }
        self.ticks += 1;
        self.state.tick = Some(*tick);
        self.state.orderbook.mark(tick);

        // 1. candles and indicators
        for candle in self.state.candles.on_tick(tick) {
            let stored = self
                .state
                .pipelines
                .get_mut(&candle.timeframe)
                .and_then(|p| p.on_candle_close(candle))
                .cloned();
            if let Some(stored) = stored {
                self.strategy.on_candle_close(&mut self.state, &stored);
            }
        }

        // 2. orderbook
        self.state.orderbook.refresh(tick);

        // 3. boundaries
        for kind in self.clock.advance(tick.date()) {
            match kind {
                PeriodKind::Minute => self.strategy.on_new_minute(&mut self.state, tick),
                PeriodKind::Hour => self.strategy.on_new_hour(&mut self.state, tick),
                PeriodKind::Day => {
                    let snapshot = self.state.analytics.on_new_day(tick.date());
                    self.persist(PersistenceCommand::store_snapshot(snapshot));
                    let cleaned = self.state.orderbook.clean();
                    debug!(strategy = %self.state.id, cleaned, "day boundary");
                    self.strategy.on_new_day(&mut self.state, tick);
                }
                PeriodKind::Week => self.strategy.on_new_week(&mut self.state, tick),
                PeriodKind::Month => self.strategy.on_new_month(&mut self.state, tick),
            }
        }

        // 4. decision
        self.strategy.on_tick(&mut self.state, tick);

        // 5. fills
        self.dispatch_transactions();

        // 6. analytics
        let nav = self.state.orderbook.nav();
        self.state.analytics.on_tick(tick.date(), nav);
    }

    /// Run `on_end`, take the final snapshot and return it.
    pub fn finish(&mut self) -> PerformanceSnapshot {
        self.strategy.on_end(&mut self.state);
        self.dispatch_transactions();
        let date = self.state.tick.map(|t| t.date()).unwrap_or_default();
        let nav = self.state.orderbook.nav();
        self.state.analytics.on_tick(date, nav);
        let snapshot = self.state.analytics.on_end(date);
        info!(
            strategy = %self.state.id,
            nav = snapshot.nav,
            performance = snapshot.performance(),
            max_drawdown = snapshot.max_drawdown,
            sharpe = snapshot.metrics.sharpe_ratio,
            trades = snapshot.profit_history.len(),
            "strategy finished"
        );
        self.persist(PersistenceCommand::store_snapshot(snapshot.clone()));
        snapshot
    }

    fn dispatch_transactions(&mut self) {
        for _ in 0..MAX_DISPATCH_ROUNDS {
            let transactions = self.state.orderbook.take_transactions();
            if transactions.is_empty() {
                return;
            }
            for order in &transactions {
                self.state.analytics.on_transaction(order);
                let command = if order.status == OrderStatus::Opened {
                    PersistenceCommand::store_order(&self.state.id, order)
                } else {
                    PersistenceCommand::update_order(&self.state.id, order)
                };
                self.persist(command);
                self.strategy.on_transaction(&mut self.state, order);
            }
        }
        warn!(
            strategy = %self.state.id,
            rounds = MAX_DISPATCH_ROUNDS,
            "transaction dispatch did not settle"
        );
    }

    fn persist(&self, command: PersistenceCommand) {
        if let Some(sender) = &self.persistence {
            if let Err(e) = sender.send(command) {
                debug!(strategy = %self.state.id, error = %e, "persistence command dropped");
            }
        }
    }
}
