//! Order domain types.
//!
//! Status lifecycle:
//! - Opening → Opened → Closing → Closed
//! - Opening → Cancelled (rejected before it was opened)
//!
//! Closed and Cancelled are terminal.

use super::ids::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Opening,
    Opened,
    Closing,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Cancelled)
    }
}

/// Why an opened order was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    TakeProfit,
    StopLoss,
    Liquidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    pub volume: f64,
    pub executed_volume: f64,
    /// Entry price. Zero means "fill at the current tick".
    pub price: f64,
    pub close_price: f64,
    /// Zero disables the take-profit trigger.
    pub take_profit_price: f64,
    /// Zero disables the stop-loss trigger.
    pub stop_loss_price: f64,
    /// Commission charged so far (open + close legs).
    pub commission: f64,
    pub close_reason: Option<CloseReason>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Order {
    /// New order in the Opening state. The orderbook assigns the real id on `open`.
    pub fn new(symbol: &str, side: OrderSide, volume: f64) -> Self {
        Self {
            id: OrderId(String::new()),
            symbol: symbol.to_string(),
            side,
            status: OrderStatus::Opening,
            volume,
            executed_volume: 0.0,
            price: 0.0,
            close_price: 0.0,
            take_profit_price: 0.0,
            stop_loss_price: 0.0,
            commission: 0.0,
            close_reason: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn buy(symbol: &str, volume: f64) -> Self {
        Self::new(symbol, OrderSide::Buy, volume)
    }

    pub fn sell(symbol: &str, volume: f64) -> Self {
        Self::new(symbol, OrderSide::Sell, volume)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit_price = price;
        self
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss_price = price;
        self
    }

    pub fn notional(&self) -> f64 {
        self.volume * self.price
    }

    pub fn filled(&self) -> bool {
        self.volume > 0.0 && self.executed_volume >= self.volume
    }

    /// Realized profit against `close_price`.
    pub fn profit(&self) -> f64 {
        self.profit_at(self.close_price)
    }

    /// Profit if the order were closed at `mark`.
    pub fn profit_at(&self, mark: f64) -> f64 {
        match self.side {
            OrderSide::Sell => (self.price - mark) * self.volume,
            OrderSide::Buy => (mark - self.price) * self.volume,
        }
    }

    /// Realized return relative to entry price, 0 when entry price is 0.
    pub fn profit_percentage(&self) -> f64 {
        if self.price == 0.0 {
            return 0.0;
        }
        match self.side {
            OrderSide::Sell => (self.price - self.close_price) / self.price,
            OrderSide::Buy => (self.close_price - self.price) / self.price,
        }
    }

    /// Profit net of all commission charged.
    pub fn net_profit(&self) -> f64 {
        self.profit() - self.commission
    }

    /// Take-profit crossed by `price`, respecting side.
    pub fn hits_take_profit(&self, price: f64) -> bool {
        if self.status != OrderStatus::Opened || self.take_profit_price <= 0.0 {
            return false;
        }
        match self.side {
            OrderSide::Buy => price >= self.take_profit_price,
            OrderSide::Sell => price <= self.take_profit_price,
        }
    }

    /// Stop-loss crossed by `price`, respecting side.
    pub fn hits_stop_loss(&self, price: f64) -> bool {
        if self.status != OrderStatus::Opened || self.stop_loss_price <= 0.0 {
            return false;
        }
        match self.side {
            OrderSide::Buy => price <= self.stop_loss_price,
            OrderSide::Sell => price >= self.stop_loss_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed(side: OrderSide, price: f64, close_price: f64, volume: f64) -> Order {
        let mut order = Order::new("BTCUSDT", side, volume).with_price(price);
        order.close_price = close_price;
        order.status = OrderStatus::Closed;
        order
    }

    #[test]
    fn buy_profit_is_close_minus_entry() {
        let order = closed(OrderSide::Buy, 50_000.0, 60_000.0, 1.0);
        assert_eq!(order.profit(), 10_000.0);
        assert!((order.profit_percentage() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn sell_profit_is_entry_minus_close() {
        let order = closed(OrderSide::Sell, 50_000.0, 45_000.0, 2.0);
        assert_eq!(order.profit(), 10_000.0);
        assert!((order.profit_percentage() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn profit_percentage_zero_price() {
        let order = closed(OrderSide::Buy, 0.0, 10.0, 1.0);
        assert_eq!(order.profit_percentage(), 0.0);
    }

    #[test]
    fn triggers_respect_side() {
        let mut long = Order::buy("X", 1.0)
            .with_price(100.0)
            .with_take_profit(110.0)
            .with_stop_loss(95.0);
        long.status = OrderStatus::Opened;
        assert!(long.hits_take_profit(110.0));
        assert!(!long.hits_take_profit(109.9));
        assert!(long.hits_stop_loss(95.0));

        let mut short = Order::sell("X", 1.0)
            .with_price(100.0)
            .with_take_profit(90.0)
            .with_stop_loss(105.0);
        short.status = OrderStatus::Opened;
        assert!(short.hits_take_profit(89.0));
        assert!(!short.hits_take_profit(101.0));
        assert!(short.hits_stop_loss(106.0));
    }

    #[test]
    fn disabled_triggers_never_fire() {
        let mut order = Order::buy("X", 1.0).with_price(100.0);
        order.status = OrderStatus::Opened;
        assert!(!order.hits_take_profit(1e9));
        assert!(!order.hits_stop_loss(0.0));
    }

    #[test]
    fn triggers_ignore_unopened_orders() {
        let order = Order::buy("X", 1.0).with_price(100.0).with_take_profit(110.0);
        assert!(!order.hits_take_profit(120.0));
    }

    #[test]
    fn filled_requires_full_execution() {
        let mut order = Order::buy("X", 2.0);
        assert!(!order.filled());
        order.executed_volume = 2.0;
        assert!(order.filled());
    }
}
