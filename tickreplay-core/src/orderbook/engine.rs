//! Orderbook engine: order state machine plus margin accounting.
//!
//! Derived quantities, all marked to the last seen price:
//! - used margin = Σ notional / leverage over open orders
//! - unrealized PnL = Σ profit over open orders
//! - equity = balance + unrealized PnL
//! - free margin = equity - used margin
//! - margin level = equity / used margin (∞ with no open orders)
//! - nav = balance + used margin + unrealized PnL
//!
//! Liquidation uses hysteresis: falling below `liquidation_ratio` force-closes
//! everything and raises a margin-call flag. While the flag is up, an open is
//! accepted only if it would leave the margin level at or above
//! `recovery_ratio`, and accepting it lowers the flag.

use super::{OrderbookConfig, OrderbookError};
use crate::domain::{CloseReason, Order, OrderId, OrderStatus, Tick};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why `open` turned an order into a cancelled one.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    #[error("volume and price must be positive")]
    InvalidOrder,

    #[error("margin call active, projected margin level {0:.4} is below the recovery ratio")]
    MarginCall(f64),

    #[error("balance exhausted")]
    NoBalance,

    #[error("free margin {free:.2} is below the required {required:.2}")]
    InsufficientFreeMargin { free: f64, required: f64 },

    #[error("projected margin level {0:.4} is below the liquidation ratio")]
    MarginLevelTooLow(f64),
}

/// Point-in-time view of the margin account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginState {
    pub balance: f64,
    pub used_margin: f64,
    pub unrealized_pnl: f64,
    pub equity: f64,
    pub free_margin: f64,
    pub margin_level: f64,
    pub nav: f64,
}

#[derive(Debug)]
pub struct OrderbookEngine {
    config: OrderbookConfig,
    balance: f64,
    orders: HashMap<OrderId, Order>,
    /// Insertion order of `orders`, so liquidation and triggers run deterministically.
    sequence: Vec<OrderId>,
    next_id: u64,
    margin_call_active: bool,
    last_price: f64,
    last_date: Option<DateTime<Utc>>,
    transactions: Vec<Order>,
    last_rejection: Option<RejectReason>,
}

impl OrderbookEngine {
    pub fn new(config: OrderbookConfig) -> Result<Self, OrderbookError> {
        config.validate()?;
        Ok(Self {
            balance: config.allocation,
            config,
            orders: HashMap::new(),
            sequence: Vec::new(),
            next_id: 0,
            margin_call_active: false,
            last_price: 0.0,
            last_date: None,
            transactions: Vec::new(),
            last_rejection: None,
        })
    }

    pub fn config(&self) -> &OrderbookConfig {
        &self.config
    }

    pub fn allocation(&self) -> f64 {
        self.config.allocation
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn leverage(&self) -> f64 {
        self.config.leverage
    }

    pub fn is_margin_call_active(&self) -> bool {
        self.margin_call_active
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn last_rejection(&self) -> Option<RejectReason> {
        self.last_rejection
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    /// Indexed orders (open and not yet cleaned closed ones), oldest first.
    pub fn orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.sequence.iter().filter_map(|id| self.orders.get(id))
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> + '_ {
        self.orders().filter(|o| is_open(o))
    }

    // ── Derived quantities ─────────────────────────────────────────────

    pub fn used_margin(&self) -> f64 {
        self.open_orders()
            .map(|o| o.notional() / self.config.leverage)
            .sum()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.open_orders().map(|o| o.profit_at(self.last_price)).sum()
    }

    pub fn equity(&self) -> f64 {
        self.balance + self.unrealized_pnl()
    }

    pub fn free_margin(&self) -> f64 {
        self.equity() - self.used_margin()
    }

    pub fn margin_level(&self) -> f64 {
        let used = self.used_margin();
        if used <= 0.0 {
            return f64::INFINITY;
        }
        self.equity() / used
    }

    pub fn nav(&self) -> f64 {
        self.balance + self.used_margin() + self.unrealized_pnl()
    }

    pub fn state(&self) -> MarginState {
        let used_margin = self.used_margin();
        let unrealized_pnl = self.unrealized_pnl();
        let equity = self.balance + unrealized_pnl;
        MarginState {
            balance: self.balance,
            used_margin,
            unrealized_pnl,
            equity,
            free_margin: equity - used_margin,
            margin_level: if used_margin > 0.0 {
                equity / used_margin
            } else {
                f64::INFINITY
            },
            nav: self.balance + used_margin + unrealized_pnl,
        }
    }

    // ── Operations ─────────────────────────────────────────────────────

    /// Try to open `order`. A zero price fills at the last seen price.
    ///
    /// Returns the order in its final state: Opened on success, Cancelled with
    /// zero executed volume on rejection. Rejected orders are not indexed and
    /// produce no transaction.
    pub fn open(&mut self, mut order: Order) -> Order {
        if order.price <= 0.0 {
            order.price = self.last_price;
        }
        if self.last_price <= 0.0 && order.price > 0.0 {
            self.last_price = order.price;
        }
        self.next_id += 1;
        order.id = OrderId::from(self.next_id);
        order.created_at = self.last_date;
        order.updated_at = self.last_date;

        let required = order.notional() / self.config.leverage;
        let commission = order.notional() * self.config.commission_rate;

        if let Err(reason) = self.check_open(&order, required, commission) {
            warn!(order_id = %order.id, symbol = %order.symbol, %reason, "order rejected");
            self.last_rejection = Some(reason);
            order.status = OrderStatus::Cancelled;
            order.executed_volume = 0.0;
            return order;
        }

        if self.margin_call_active {
            info!(order_id = %order.id, "margin level recovered, margin call cleared");
            self.margin_call_active = false;
        }
        self.last_rejection = None;
        self.balance -= required + commission;
        order.commission = commission;
        order.status = OrderStatus::Opened;
        order.executed_volume = order.volume;
        debug!(
            order_id = %order.id,
            side = ?order.side,
            volume = order.volume,
            price = order.price,
            margin = required,
            "order opened"
        );

        self.sequence.push(order.id.clone());
        self.orders.insert(order.id.clone(), order.clone());
        self.transactions.push(order.clone());
        order
    }

    fn check_open(&self, order: &Order, required: f64, commission: f64) -> Result<(), RejectReason> {
        if !(order.volume > 0.0 && order.price > 0.0 && order.notional().is_finite()) {
            return Err(RejectReason::InvalidOrder);
        }
        let equity = self.equity();
        let used = self.used_margin();
        let projected = (equity - required - commission) / (used + required);

        if self.margin_call_active && projected < self.config.recovery_ratio {
            return Err(RejectReason::MarginCall(projected));
        }
        if self.balance <= 0.0 {
            return Err(RejectReason::NoBalance);
        }
        let free = equity - used;
        if free < required + commission {
            return Err(RejectReason::InsufficientFreeMargin {
                free,
                required: required + commission,
            });
        }
        if projected < self.config.liquidation_ratio {
            return Err(RejectReason::MarginLevelTooLow(projected));
        }
        Ok(())
    }

    /// Close an open order at the last seen price.
    pub fn close(&mut self, id: &OrderId) -> Result<Order, OrderbookError> {
        self.close_with(id, CloseReason::Manual)
    }

    fn close_with(&mut self, id: &OrderId, reason: CloseReason) -> Result<Order, OrderbookError> {
        let price = self.last_price;
        let leverage = self.config.leverage;
        let rate = self.config.commission_rate;

        let order = self
            .orders
            .get_mut(id)
            .ok_or_else(|| OrderbookError::OrderNotFound(id.clone()))?;
        if !is_open(order) {
            return Err(OrderbookError::InvalidState(id.clone(), order.status));
        }

        let margin = order.notional() / leverage;
        let fee = order.volume * price * rate;
        order.close_price = price;
        order.commission += fee;
        order.status = OrderStatus::Closed;
        order.close_reason = Some(reason);
        order.updated_at = self.last_date;
        self.balance += margin + order.profit() - fee;

        debug!(
            order_id = %order.id,
            ?reason,
            close_price = price,
            profit = order.profit(),
            "order closed"
        );
        let closed = order.clone();
        self.transactions.push(closed.clone());
        Ok(closed)
    }

    /// Close every open order at the last seen price.
    pub fn close_all(&mut self, reason: CloseReason) -> Vec<Order> {
        let ids: Vec<OrderId> = self.open_orders().map(|o| o.id.clone()).collect();
        ids.iter()
            .filter_map(|id| self.close_with(id, reason).ok())
            .collect()
    }

    /// Move the fill price and date to `tick` without any order checks.
    /// Opens and closes after this fill at the tick's price.
    pub fn mark(&mut self, tick: &Tick) {
        self.last_price = tick.price();
        self.last_date = Some(tick.date());
    }

    /// Mark to `tick`, enforce liquidation, then fire take-profit/stop-loss.
    pub fn refresh(&mut self, tick: &Tick) {
        self.mark(tick);

        let used = self.used_margin();
        if used > 0.0 {
            let level = self.equity() / used;
            if level < self.config.liquidation_ratio {
                warn!(
                    margin_level = level,
                    liquidation_ratio = self.config.liquidation_ratio,
                    date = %tick.date(),
                    "liquidating all open orders"
                );
                self.close_all(CloseReason::Liquidation);
                self.margin_call_active = true;
            }
        }

        let price = tick.price();
        let triggered: Vec<(OrderId, CloseReason)> = self
            .open_orders()
            .filter_map(|o| {
                if o.hits_take_profit(price) {
                    Some((o.id.clone(), CloseReason::TakeProfit))
                } else if o.hits_stop_loss(price) {
                    Some((o.id.clone(), CloseReason::StopLoss))
                } else {
                    None
                }
            })
            .collect();

        for (id, reason) in triggered {
            if let Some(order) = self.orders.get_mut(&id) {
                order.status = OrderStatus::Closing;
            }
            if let Err(e) = self.close_with(&id, reason) {
                warn!(order_id = %id, error = %e, "triggered close failed");
            }
        }
    }

    /// Drop closed orders from the index. Returns how many were removed.
    pub fn clean(&mut self) -> usize {
        let before = self.sequence.len();
        let orders = &mut self.orders;
        self.sequence.retain(|id| {
            let closed = matches!(orders.get(id), Some(o) if o.status == OrderStatus::Closed);
            if closed {
                orders.remove(id);
            }
            !closed && orders.contains_key(id)
        });
        before - self.sequence.len()
    }

    /// Orders opened or closed since the last call, in event order.
    pub fn take_transactions(&mut self) -> Vec<Order> {
        std::mem::take(&mut self.transactions)
    }
}

fn is_open(order: &Order) -> bool {
    matches!(order.status, OrderStatus::Opened | OrderStatus::Closing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{Duration, TimeZone};

    fn tick(minute: i64, price: f64) -> Tick {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Tick::new(base + Duration::minutes(minute), price).unwrap()
    }

    fn engine(allocation: f64, leverage: f64) -> OrderbookEngine {
        OrderbookEngine::new(OrderbookConfig::new(allocation, leverage)).unwrap()
    }

    fn assert_nav_identity(book: &OrderbookEngine) {
        let s = book.state();
        assert_abs_diff_eq!(s.nav, s.balance + s.used_margin + s.unrealized_pnl, epsilon = 1e-6);
    }

    #[test]
    fn leveraged_long_round_trip() {
        let mut book = engine(100_000.0, 3.0);
        book.refresh(&tick(0, 50_000.0));

        let order = book.open(Order::buy("BTCUSDT", 1.0));
        assert_eq!(order.status, OrderStatus::Opened);
        assert_eq!(order.price, 50_000.0);
        assert_eq!(order.executed_volume, 1.0);
        assert_abs_diff_eq!(book.used_margin(), 16_666.67, epsilon = 0.01);
        assert_abs_diff_eq!(book.balance(), 83_333.33, epsilon = 0.01);
        assert_nav_identity(&book);

        book.refresh(&tick(1, 60_000.0));
        assert_abs_diff_eq!(book.unrealized_pnl(), 10_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(book.equity(), 93_333.33, epsilon = 0.01);
        assert_abs_diff_eq!(book.margin_level(), 5.6, epsilon = 1e-6);
        assert_nav_identity(&book);

        let closed = book.close(&order.id).unwrap();
        assert_eq!(closed.status, OrderStatus::Closed);
        assert_eq!(closed.close_price, 60_000.0);
        assert_eq!(closed.close_reason, Some(CloseReason::Manual));
        assert_abs_diff_eq!(book.balance(), 110_000.0, epsilon = 1e-6);
        assert_abs_diff_eq!(book.nav(), 110_000.0, epsilon = 1e-6);
        assert_eq!(book.margin_level(), f64::INFINITY);
    }

    #[test]
    fn short_profits_when_price_falls() {
        let mut book = engine(10_000.0, 2.0);
        book.refresh(&tick(0, 100.0));
        let order = book.open(Order::sell("X", 10.0));
        book.refresh(&tick(1, 90.0));
        assert_abs_diff_eq!(book.unrealized_pnl(), 100.0, epsilon = 1e-9);
        book.close(&order.id).unwrap();
        assert_abs_diff_eq!(book.balance(), 10_100.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_when_free_margin_insufficient() {
        let mut book = engine(1_000.0, 1.0);
        book.refresh(&tick(0, 100.0));
        let order = book.open(Order::buy("X", 11.0));
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.executed_volume, 0.0);
        assert!(matches!(
            book.last_rejection(),
            Some(RejectReason::InsufficientFreeMargin { .. })
        ));
        assert_eq!(book.orders().count(), 0);
        assert!(book.take_transactions().is_empty());
        assert_eq!(book.balance(), 1_000.0);
    }

    #[test]
    fn rejects_when_projected_level_below_liquidation_ratio() {
        let cfg = OrderbookConfig::new(1_000.0, 10.0).with_ratios(0.5, 1.0);
        let mut book = OrderbookEngine::new(cfg).unwrap();
        book.refresh(&tick(0, 100.0));
        // required 700, projected (1000 - 700) / 700 = 0.43
        let order = book.open(Order::buy("X", 70.0));
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(matches!(book.last_rejection(), Some(RejectReason::MarginLevelTooLow(_))));
    }

    #[test]
    fn rejects_zero_volume() {
        let mut book = engine(1_000.0, 1.0);
        book.refresh(&tick(0, 100.0));
        assert_eq!(book.open(Order::buy("X", 0.0)).status, OrderStatus::Cancelled);
        assert_eq!(book.last_rejection(), Some(RejectReason::InvalidOrder));
    }

    #[test]
    fn liquidation_blocks_opens_until_recovery() {
        let cfg = OrderbookConfig::new(100_000.0, 3.0).with_ratios(0.2, 0.5);
        let mut book = OrderbookEngine::new(cfg).unwrap();
        book.refresh(&tick(0, 50_000.0));
        let order = book.open(Order::buy("BTCUSDT", 4.0));
        assert_eq!(order.status, OrderStatus::Opened);
        assert_abs_diff_eq!(book.balance(), 33_333.33, epsilon = 0.01);
        book.take_transactions();

        // level = (33333.33 - 24000) / 66666.67 = 0.14
        book.refresh(&tick(1, 44_000.0));
        assert!(book.is_margin_call_active());
        assert_eq!(book.open_orders().count(), 0);
        let liquidated = book.get(&order.id).unwrap();
        assert_eq!(liquidated.close_reason, Some(CloseReason::Liquidation));
        assert_abs_diff_eq!(book.balance(), 76_000.0, epsilon = 1e-6);
        assert_nav_identity(&book);
        assert_eq!(book.take_transactions().len(), 1);

        // projected (76000 - 58666.67) / 58666.67 = 0.295 < 0.5
        let blocked = book.open(Order::buy("BTCUSDT", 4.0));
        assert_eq!(blocked.status, OrderStatus::Cancelled);
        assert!(matches!(book.last_rejection(), Some(RejectReason::MarginCall(_))));
        assert!(book.is_margin_call_active());

        // projected (76000 - 14666.67) / 14666.67 = 4.18
        let recovered = book.open(Order::buy("BTCUSDT", 1.0));
        assert_eq!(recovered.status, OrderStatus::Opened);
        assert!(!book.is_margin_call_active());
    }

    #[test]
    fn take_profit_wins_over_stop_loss_on_same_tick() {
        let mut book = engine(100_000.0, 1.0);
        book.refresh(&tick(0, 100.0));
        // Degenerate levels: both trigger at 100
        let order = book.open(
            Order::buy("X", 1.0)
                .with_take_profit(100.0)
                .with_stop_loss(100.0),
        );
        book.refresh(&tick(1, 100.0));
        let closed = book.get(&order.id).unwrap();
        assert_eq!(closed.status, OrderStatus::Closed);
        assert_eq!(closed.close_reason, Some(CloseReason::TakeProfit));
    }

    #[test]
    fn stop_loss_closes_at_tick_price() {
        let mut book = engine(100_000.0, 1.0);
        book.refresh(&tick(0, 100.0));
        let order = book.open(Order::buy("X", 1.0).with_stop_loss(95.0));
        book.refresh(&tick(1, 96.0));
        assert_eq!(book.get(&order.id).unwrap().status, OrderStatus::Opened);
        book.refresh(&tick(2, 94.0));
        let closed = book.get(&order.id).unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::StopLoss));
        assert_eq!(closed.close_price, 94.0);
        assert_abs_diff_eq!(book.balance(), 99_994.0, epsilon = 1e-9);
    }

    #[test]
    fn commission_charged_on_both_legs() {
        let cfg = OrderbookConfig::new(10_000.0, 1.0).with_commission(0.001);
        let mut book = OrderbookEngine::new(cfg).unwrap();
        book.refresh(&tick(0, 100.0));
        let order = book.open(Order::buy("X", 10.0));
        assert_abs_diff_eq!(order.commission, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(book.balance(), 8_999.0, epsilon = 1e-9);
        book.refresh(&tick(1, 110.0));
        let closed = book.close(&order.id).unwrap();
        assert_abs_diff_eq!(closed.commission, 2.1, epsilon = 1e-12);
        assert_abs_diff_eq!(closed.net_profit(), 97.9, epsilon = 1e-9);
        assert_abs_diff_eq!(book.balance(), 10_097.9, epsilon = 1e-9);
    }

    #[test]
    fn close_errors() {
        let mut book = engine(1_000.0, 1.0);
        book.refresh(&tick(0, 10.0));
        let missing = OrderId::from(99);
        assert_eq!(
            book.close(&missing),
            Err(OrderbookError::OrderNotFound(missing.clone()))
        );
        let order = book.open(Order::buy("X", 1.0));
        book.close(&order.id).unwrap();
        assert_eq!(
            book.close(&order.id),
            Err(OrderbookError::InvalidState(order.id.clone(), OrderStatus::Closed))
        );
    }

    #[test]
    fn clean_drops_only_closed() {
        let mut book = engine(1_000.0, 1.0);
        book.refresh(&tick(0, 10.0));
        let a = book.open(Order::buy("X", 1.0));
        let b = book.open(Order::buy("X", 1.0));
        book.close(&a.id).unwrap();
        assert_eq!(book.clean(), 1);
        assert!(book.get(&a.id).is_none());
        assert!(book.get(&b.id).is_some());
        assert_eq!(book.clean(), 0);
    }

    #[test]
    fn transactions_in_event_order() {
        let mut book = engine(1_000.0, 1.0);
        book.refresh(&tick(0, 10.0));
        let order = book.open(Order::buy("X", 1.0));
        book.close(&order.id).unwrap();
        let statuses: Vec<OrderStatus> = book.take_transactions().iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![OrderStatus::Opened, OrderStatus::Closed]);
        assert!(book.take_transactions().is_empty());
    }

    #[test]
    fn mark_moves_price_without_triggers() {
        let mut book = engine(1_000.0, 1.0);
        book.refresh(&tick(0, 100.0));
        let order = book.open(Order::buy("X", 1.0).with_take_profit(105.0));
        book.take_transactions();

        book.mark(&tick(1, 110.0));
        assert_eq!(book.last_price(), 110.0);
        assert_eq!(book.open_orders().count(), 1);
        assert!(book.take_transactions().is_empty());

        book.refresh(&tick(1, 110.0));
        let closed = book.get(&order.id).unwrap();
        assert_eq!(closed.close_reason, Some(CloseReason::TakeProfit));
        assert_eq!(closed.close_price, 110.0);
    }
}
