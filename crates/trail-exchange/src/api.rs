//! 거래소 중립 선물 API 추상화.
//!
//! OrderGateway와 ExecutionCoordinator는 이 trait만 바라보며,
//! 실물 구현은 `connector::binance`, 테스트 구현은 `provider::mock`이
//! 제공합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trail_core::domain::{Bar, OrderIntent, Side};

use crate::ExchangeError;

// ==================== 응답 타입 ====================

/// 거래소에 기록된 주문 한 건.
///
/// 주문 제출 응답과 조회 응답이 같은 필드를 공유하므로 한 타입으로
/// 다룹니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    /// 거래소 주문 id
    pub exchange_order_id: String,
    /// 클라이언트 주문 id (멱등성 키)
    pub client_order_id: String,
    /// 심볼
    pub symbol: String,
    /// 거래소 상태 문자열 (NEW, FILLED, CANCELED 등)
    pub status: String,
    /// 평균 체결가 (미체결이면 None)
    pub avg_price: Option<Decimal>,
    /// 체결 수량
    pub executed_qty: Option<Decimal>,
    /// 거래소 기준 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl ExchangeOrder {
    /// 거래소가 주문을 살아있는 상태로 들고 있는지 (접수 또는 부분 체결).
    pub fn is_working(&self) -> bool {
        matches!(self.status.as_str(), "NEW" | "PARTIALLY_FILLED")
    }
}

/// 거래소 포지션 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    /// 심볼
    pub symbol: String,
    /// 보유 수량 (롱 양수, 숏 음수)
    pub position_amt: Decimal,
    /// 평균 진입가
    pub entry_price: Decimal,
    /// 마크 가격
    pub mark_price: Decimal,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
}

impl PositionInfo {
    /// 수량이 0이 아닌지.
    pub fn is_open(&self) -> bool {
        !self.position_amt.is_zero()
    }

    /// 보유 방향. 수량이 0이면 None.
    pub fn side(&self) -> Option<Side> {
        if self.position_amt.is_zero() {
            None
        } else if self.position_amt > Decimal::ZERO {
            Some(Side::Long)
        } else {
            Some(Side::Short)
        }
    }
}

/// 봉 조회 응답 한 건.
///
/// `close_time`이 현재 시각보다 과거인 봉만 확정봉으로 취급합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
}

impl Kline {
    /// 이 봉이 `now` 기준으로 마감되었는지.
    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        self.close_time <= now
    }

    /// 도메인 Bar로 변환. 봉 시각은 open_time을 사용합니다.
    pub fn to_bar(&self, symbol: impl Into<String>) -> Bar {
        Bar::new(
            symbol,
            self.open_time,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

// ==================== API trait ====================

/// USDT-M 선물 주문/조회 API.
///
/// 모든 주문은 `OrderIntent::client_order_id`를 거래소 clientOrderId로
/// 전달해야 합니다. 거래소는 같은 clientOrderId를 중복 접수하지 않으므로
/// 이 값이 곧 멱등성 키가 됩니다.
#[async_trait]
pub trait FuturesApi: Send + Sync {
    /// 주문 제출.
    ///
    /// # Errors
    ///
    /// 네트워크/서버 오류는 재시도 가능으로, 검증 실패와 중복
    /// clientOrderId 거절은 재시도 불가로 분류되어 반환됩니다.
    async fn place_order(&self, intent: &OrderIntent) -> Result<ExchangeOrder, ExchangeError>;

    /// 클라이언트 주문 id로 주문 조회. 미체결/체결 이력 모두 대상이며
    /// 거래소에 없는 주문은 `Ok(None)`.
    ///
    /// # Errors
    ///
    /// 네트워크/서버/파싱 오류.
    async fn fetch_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<ExchangeOrder>, ExchangeError>;

    /// 심볼의 미체결 주문 목록.
    ///
    /// # Errors
    ///
    /// 네트워크/서버/파싱 오류.
    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError>;

    /// 클라이언트 주문 id로 주문 취소.
    ///
    /// # Errors
    ///
    /// 대상 주문이 없으면 `ExchangeError::OrderNotFound`.
    async fn cancel_order(&self, symbol: &str, client_order_id: &str)
        -> Result<(), ExchangeError>;

    /// 보유 포지션 조회. `symbol`이 None이면 전체.
    ///
    /// # Errors
    ///
    /// 네트워크/서버/파싱 오류.
    async fn fetch_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<PositionInfo>, ExchangeError>;

    /// 봉 조회 (오름차순, 최대 `limit`개; 마지막 봉은 진행 중일 수 있음).
    ///
    /// # Errors
    ///
    /// 네트워크/서버/파싱 오류.
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError>;

    /// 거래소 이름.
    fn exchange_name(&self) -> &str;
}
