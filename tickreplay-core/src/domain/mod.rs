//! Domain types for the tick replay engine.

pub mod candle;
pub mod ids;
pub mod order;
pub mod tick;
pub mod timeframe;

pub use candle::Candle;
pub use ids::{OrderId, StrategyId};
pub use order::{CloseReason, Order, OrderSide, OrderStatus};
pub use tick::{check_ordering, Tick, TickError};
pub use timeframe::{PeriodKind, Timeframe, TimeframeError};
