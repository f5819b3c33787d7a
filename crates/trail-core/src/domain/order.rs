//! 주문 의도(OrderIntent)와 주문 결과(OrderResult).

use super::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 거래소 주문 방향 (BUY/SELL).
///
/// 포지션 방향(`Side`)과 구분됩니다. SHORT 진입은 SELL 주문,
/// SHORT 청산은 BUY 주문입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

impl Side {
    /// 이 방향으로 진입할 때의 주문 방향.
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// 이 방향 포지션을 청산할 때의 주문 방향.
    pub fn close_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

/// 주문 의도 태그.
///
/// 하나의 논리적 트레이드(trade_id)에 속한 주문들의 역할을 구분하며,
/// 멱등성 키 생성에도 들어갑니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentTag {
    /// 시장가 진입
    Entry,
    /// 익절 트리거 청산 (TAKE_PROFIT_MARKET, reduce-only)
    TakeProfitClose,
    /// 손절 트리거 청산 (STOP_MARKET, reduce-only)
    StopClose,
    /// 부분 청산 (시장가, reduce-only)
    PartialClose,
    /// 전량 청산 (시장가, reduce-only)
    FullClose,
}

impl IntentTag {
    /// 클라이언트 주문 id에 넣는 짧은 코드.
    pub fn code(&self) -> &'static str {
        match self {
            IntentTag::Entry => "en",
            IntentTag::TakeProfitClose => "tp",
            IntentTag::StopClose => "sl",
            IntentTag::PartialClose => "cp",
            IntentTag::FullClose => "cx",
        }
    }
}

impl fmt::Display for IntentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntentTag::Entry => "ENTRY",
            IntentTag::TakeProfitClose => "TAKE_PROFIT_CLOSE",
            IntentTag::StopClose => "STOP_CLOSE",
            IntentTag::PartialClose => "PARTIAL_CLOSE",
            IntentTag::FullClose => "FULL_CLOSE",
        };
        write!(f, "{}", s)
    }
}

/// 주문 의도.
///
/// ExecutionCoordinator가 구성하고 OrderGateway가 실행합니다.
/// `client_order_id`가 멱등성 키이며, 같은 키로는 거래소 주문이
/// 최대 1건만 생성됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// 멱등성 키 = 거래소 클라이언트 주문 id
    pub client_order_id: String,
    /// 심볼
    pub symbol: String,
    /// 의도 태그
    pub tag: IntentTag,
    /// 주문 방향 (BUY/SELL)
    pub order_side: OrderSide,
    /// 논리적 포지션 방향
    pub position_side: Side,
    /// 수량. 트리거 청산(closePosition)은 `None`.
    pub qty: Option<Decimal>,
    /// 트리거 가격 (TP/SL 주문 전용)
    pub trigger_price: Option<Decimal>,
    /// reduce-only 여부
    pub reduce_only: bool,
    /// 논리적 트레이드 id (진입/TP/SL/청산이 공유)
    pub trade_id: Uuid,
}

impl OrderIntent {
    /// 시장가 진입 의도.
    pub fn entry(
        client_order_id: String,
        symbol: impl Into<String>,
        side: Side,
        qty: Decimal,
        trade_id: Uuid,
    ) -> Self {
        Self {
            client_order_id,
            symbol: symbol.into(),
            tag: IntentTag::Entry,
            order_side: side.entry_order_side(),
            position_side: side,
            qty: Some(qty),
            trigger_price: None,
            reduce_only: false,
            trade_id,
        }
    }

    /// 익절 트리거 청산 의도 (포지션 전량).
    pub fn take_profit_close(
        client_order_id: String,
        symbol: impl Into<String>,
        side: Side,
        trigger_price: Decimal,
        trade_id: Uuid,
    ) -> Self {
        Self {
            client_order_id,
            symbol: symbol.into(),
            tag: IntentTag::TakeProfitClose,
            order_side: side.close_order_side(),
            position_side: side,
            qty: None,
            trigger_price: Some(trigger_price),
            reduce_only: true,
            trade_id,
        }
    }

    /// 손절 트리거 청산 의도 (포지션 전량).
    pub fn stop_close(
        client_order_id: String,
        symbol: impl Into<String>,
        side: Side,
        trigger_price: Decimal,
        trade_id: Uuid,
    ) -> Self {
        Self {
            client_order_id,
            symbol: symbol.into(),
            tag: IntentTag::StopClose,
            order_side: side.close_order_side(),
            position_side: side,
            qty: None,
            trigger_price: Some(trigger_price),
            reduce_only: true,
            trade_id,
        }
    }

    /// 부분 청산 의도 (시장가 reduce-only).
    pub fn partial_close(
        client_order_id: String,
        symbol: impl Into<String>,
        side: Side,
        qty: Decimal,
        trade_id: Uuid,
    ) -> Self {
        Self {
            client_order_id,
            symbol: symbol.into(),
            tag: IntentTag::PartialClose,
            order_side: side.close_order_side(),
            position_side: side,
            qty: Some(qty),
            trigger_price: None,
            reduce_only: true,
            trade_id,
        }
    }

    /// 전량 청산 의도 (시장가 reduce-only).
    pub fn full_close(
        client_order_id: String,
        symbol: impl Into<String>,
        side: Side,
        qty: Decimal,
        trade_id: Uuid,
    ) -> Self {
        Self {
            client_order_id,
            symbol: symbol.into(),
            tag: IntentTag::FullClose,
            order_side: side.close_order_side(),
            position_side: side,
            qty: Some(qty),
            trigger_price: None,
            reduce_only: true,
            trade_id,
        }
    }
}

/// 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// 거래소 호출 전 기록됨 (재시작 시 정합성 복구 대상)
    Pending,
    /// 거래소 접수 완료
    Sent,
    /// 거래소 거절 (검증 실패, 재시도 금지)
    Rejected,
    /// 결과 불명 (타임아웃/재시도 소진, 조회로 해소 필요)
    Unknown,
}

impl OrderStatus {
    /// 더 이상 변하지 않는 최종 상태인지.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Sent | OrderStatus::Rejected)
    }
}

/// 주문 결과.
///
/// 같은 멱등성 키로 재호출하면 저장된 결과가 그대로 반환됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// 멱등성 키
    pub client_order_id: String,
    /// 심볼
    pub symbol: String,
    /// 의도 태그
    pub tag: IntentTag,
    /// 주문 방향
    pub order_side: OrderSide,
    /// 상태
    pub status: OrderStatus,
    /// 거래소 주문 id (접수된 경우)
    pub exchange_order_id: Option<String>,
    /// 평균 체결가 (체결된 경우)
    pub avg_price: Option<Decimal>,
    /// 체결 수량
    pub executed_qty: Option<Decimal>,
    /// 논리적 트레이드 id
    pub trade_id: Uuid,
    /// 기록 시각
    pub updated_at: DateTime<Utc>,
    /// 실패 사유 (거절/불명 시)
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_order_side_follows_position_side() {
        let long = OrderIntent::entry(
            "trail-en-abc".into(),
            "ETHUSDT",
            Side::Long,
            dec!(0.5),
            Uuid::new_v4(),
        );
        assert_eq!(long.order_side, OrderSide::Buy);
        assert!(!long.reduce_only);

        let short = OrderIntent::entry(
            "trail-en-def".into(),
            "ETHUSDT",
            Side::Short,
            dec!(0.5),
            Uuid::new_v4(),
        );
        assert_eq!(short.order_side, OrderSide::Sell);
    }

    #[test]
    fn test_close_intents_are_reduce_only_and_opposite_side() {
        let trade_id = Uuid::new_v4();
        let tp = OrderIntent::take_profit_close(
            "trail-tp-abc".into(),
            "ETHUSDT",
            Side::Long,
            dec!(2100),
            trade_id,
        );
        assert_eq!(tp.order_side, OrderSide::Sell);
        assert!(tp.reduce_only);
        assert_eq!(tp.qty, None);
        assert_eq!(tp.trigger_price, Some(dec!(2100)));

        let sl = OrderIntent::stop_close(
            "trail-sl-abc".into(),
            "ETHUSDT",
            Side::Short,
            dec!(2100),
            trade_id,
        );
        assert_eq!(sl.order_side, OrderSide::Buy);
        assert_eq!(sl.trade_id, tp.trade_id);
    }

    #[test]
    fn test_intent_tag_codes_are_distinct() {
        let tags = [
            IntentTag::Entry,
            IntentTag::TakeProfitClose,
            IntentTag::StopClose,
            IntentTag::PartialClose,
            IntentTag::FullClose,
        ];
        let mut codes: Vec<&str> = tags.iter().map(|t| t.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), tags.len());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Sent.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_order_result_serde_round_trip() {
        let result = OrderResult {
            client_order_id: "trail-en-abc".to_string(),
            symbol: "ETHUSDT".to_string(),
            tag: IntentTag::Entry,
            order_side: OrderSide::Buy,
            status: OrderStatus::Sent,
            exchange_order_id: Some("123456".to_string()),
            avg_price: Some(dec!(2001.5)),
            executed_qty: Some(dec!(0.5)),
            trade_id: Uuid::new_v4(),
            updated_at: Utc::now(),
            error: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        let restored: OrderResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, restored);
    }
}
