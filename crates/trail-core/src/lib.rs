//! 트레일 실행 엔진의 핵심 도메인 타입.
//!
//! 이 crate는 다음을 제공합니다:
//! - 확정 봉(Bar)과 파생 가격 헬퍼
//! - 진입 신호(Signal)와 방향(Side)
//! - 포지션(Position), 청산 사유(ExitReason), 거래 기록(TradeRecord)
//! - 주문 의도(OrderIntent)와 주문 결과(OrderResult)
//!
//! 모든 가격/수량은 `rust_decimal::Decimal`을 사용합니다.
//! 부동소수점 오차로 인한 스톱 가격 오판을 방지하기 위함입니다.

pub mod domain;

// 주요 타입 재내보내기
pub use domain::bar::Bar;
pub use domain::order::{IntentTag, OrderIntent, OrderResult, OrderStatus};
pub use domain::position::{
    calculate_pnl_pct, ExitReason, Position, TradeRecord, TRADE_HISTORY_CAP,
};
pub use domain::signal::{EntrySignal, Side};
