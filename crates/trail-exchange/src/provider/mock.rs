//! 테스트용 FuturesApi 구현.
//!
//! 실제 거래소처럼 clientOrderId 기준으로 주문을 중복 접수하지 않으며,
//! 호출 횟수 추적과 실패 주입을 지원합니다. 게이트웨이/코디네이터의
//! 멱등성과 장애 경로 테스트에 사용합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use trail_core::domain::{IntentTag, OrderIntent};

use crate::api::{ExchangeOrder, FuturesApi, Kline, PositionInfo};
use crate::ExchangeError;

/// 주입할 실패 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// 일시적 네트워크 오류 (재시도 대상)
    Transient,
    /// 요청 시간 초과 (재시도 대상)
    Timeout,
    /// 검증 실패 (재시도 금지)
    Validation,
    /// 중복 클라이언트 주문 id 거절
    Duplicate,
}

fn make_error(kind: MockFailure) -> ExchangeError {
    match kind {
        MockFailure::Transient => ExchangeError::NetworkError("모의 네트워크 오류".to_string()),
        MockFailure::Timeout => ExchangeError::Timeout("모의 타임아웃".to_string()),
        MockFailure::Validation => ExchangeError::InvalidOrder("모의 검증 실패".to_string()),
        MockFailure::Duplicate => ExchangeError::ApiError {
            code: -4116,
            message: "ClientOrderId is duplicated.".to_string(),
        },
    }
}

/// 가상 선물 거래소.
#[derive(Debug, Default)]
pub struct MockFuturesApi {
    /// clientOrderId → 접수된 주문
    orders: RwLock<HashMap<String, ExchangeOrder>>,
    klines: RwLock<Vec<Kline>>,
    positions: RwLock<Vec<PositionInfo>>,
    /// (남은 실패 횟수, 실패 종류)
    failure_plan: RwLock<Option<(u32, MockFailure)>>,
    /// (clientOrderId 부분 문자열, 실패 종류) — 매칭되는 제출만 계속 실패
    targeted_failure: RwLock<Option<(String, MockFailure)>>,
    /// 체결가 주입 (시장가 주문의 avgPrice)
    fill_price: RwLock<Option<rust_decimal::Decimal>>,
    fail_fetches: AtomicBool,
    place_calls: AtomicU32,
    fetch_calls: AtomicU32,
    next_order_id: AtomicU32,
}

impl MockFuturesApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후 `count`회의 주문 제출을 지정한 오류로 실패시킵니다.
    pub async fn fail_next_places(&self, count: u32, kind: MockFailure) {
        *self.failure_plan.write().await = Some((count, kind));
    }

    /// clientOrderId에 지정 문자열이 포함된 제출만 골라 실패시킵니다.
    /// `fail_next_places`와 달리 해제 전까지 계속 적용됩니다.
    pub async fn fail_place_when(&self, id_contains: &str, kind: MockFailure) {
        *self.targeted_failure.write().await = Some((id_contains.to_string(), kind));
    }

    /// 주문 조회 실패 주입 (켜져 있는 동안 네트워크 오류).
    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// 시장가 체결가 주입.
    pub async fn set_fill_price(&self, price: rust_decimal::Decimal) {
        *self.fill_price.write().await = Some(price);
    }

    pub async fn set_klines(&self, klines: Vec<Kline>) {
        *self.klines.write().await = klines;
    }

    pub async fn set_positions(&self, positions: Vec<PositionInfo>) {
        *self.positions.write().await = positions;
    }

    /// 거래소에 이미 존재하는 주문을 심어 둡니다 (재기동 정합성 테스트용).
    pub async fn seed_order(&self, order: ExchangeOrder) {
        self.orders
            .write()
            .await
            .insert(order.client_order_id.clone(), order);
    }

    /// 지금까지 접수된 주문 수.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// place_order 호출 횟수 (실패 포함).
    pub fn place_call_count(&self) -> u32 {
        self.place_calls.load(Ordering::SeqCst)
    }

    /// fetch_order 호출 횟수.
    pub fn fetch_call_count(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn take_planned_failure(&self) -> Option<MockFailure> {
        let mut plan = self.failure_plan.write().await;
        match plan.take() {
            Some((remaining, kind)) if remaining > 0 => {
                if remaining > 1 {
                    *plan = Some((remaining - 1, kind));
                }
                Some(kind)
            }
            other => {
                *plan = other;
                None
            }
        }
    }
}

#[async_trait]
impl FuturesApi for MockFuturesApi {
    async fn place_order(&self, intent: &OrderIntent) -> Result<ExchangeOrder, ExchangeError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);

        {
            let targeted = self.targeted_failure.read().await;
            if let Some((needle, kind)) = targeted.as_ref() {
                if intent.client_order_id.contains(needle.as_str()) {
                    return Err(make_error(*kind));
                }
            }
        }

        if let Some(kind) = self.take_planned_failure().await {
            return Err(make_error(kind));
        }

        let mut orders = self.orders.write().await;
        // 실제 거래소처럼 같은 clientOrderId는 다시 접수하지 않음
        if orders.contains_key(&intent.client_order_id) {
            return Err(make_error(MockFailure::Duplicate));
        }

        let is_trigger = matches!(
            intent.tag,
            IntentTag::TakeProfitClose | IntentTag::StopClose
        );
        let order = ExchangeOrder {
            exchange_order_id: (self.next_order_id.fetch_add(1, Ordering::SeqCst) + 1).to_string(),
            client_order_id: intent.client_order_id.clone(),
            symbol: intent.symbol.clone(),
            status: if is_trigger { "NEW" } else { "FILLED" }.to_string(),
            avg_price: if is_trigger {
                None
            } else {
                *self.fill_price.read().await
            },
            executed_qty: if is_trigger { None } else { intent.qty },
            updated_at: Utc::now(),
        };
        orders.insert(intent.client_order_id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(
        &self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<ExchangeOrder>, ExchangeError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ExchangeError::NetworkError("모의 조회 실패".to_string()));
        }
        Ok(self.orders.read().await.get(client_order_id).cloned())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|o| o.symbol == symbol && o.is_working())
            .cloned()
            .collect())
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<(), ExchangeError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(client_order_id) {
            Some(order) => {
                order.status = "CANCELED".to_string();
                Ok(())
            }
            None => Err(ExchangeError::OrderNotFound(client_order_id.to_string())),
        }
    }

    async fn fetch_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<PositionInfo>, ExchangeError> {
        let positions = self.positions.read().await;
        Ok(positions
            .iter()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }

    async fn fetch_klines(
        &self,
        _symbol: &str,
        _interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let klines = self.klines.read().await;
        let skip = klines.len().saturating_sub(limit as usize);
        Ok(klines.iter().skip(skip).cloned().collect())
    }

    fn exchange_name(&self) -> &str {
        "MockFutures"
    }
}
