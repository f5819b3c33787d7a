//! 도메인 모델 정의.

pub mod bar;
pub mod order;
pub mod position;
pub mod signal;

pub use bar::Bar;
pub use order::{IntentTag, OrderIntent, OrderResult, OrderSide, OrderStatus};
pub use position::{calculate_pnl_pct, ExitReason, Position, TradeRecord, TRADE_HISTORY_CAP};
pub use signal::{EntrySignal, Side};
