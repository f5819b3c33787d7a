//! 멱등 주문 게이트웨이.
//!
//! 모든 주문은 결정적 멱등성 키(= 거래소 clientOrderId)를 가지며,
//! 키별 기록을 거래소 호출 전에 PENDING으로 저장하고 결과로 갱신합니다.
//! 같은 키로 다시 호출하면 저장된 최종 결과를 그대로 돌려주므로
//! 거래소에는 키당 주문이 최대 1건만 생성됩니다.
//!
//! 유일하게 남는 틈은 거래소 접수와 기록 저장 사이의 프로세스 중단으로,
//! 이때 PENDING/UNKNOWN으로 남은 기록은 `reconcile`이 clientOrderId
//! 조회로 해소합니다. 해소 전까지 해당 심볼은 신규 진입을 금지해야
//! 합니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trail_core::domain::{IntentTag, OrderIntent, OrderResult, OrderStatus};
use trail_store::{StateStore, StoreError};

use crate::api::{ExchangeOrder, FuturesApi};
use crate::retry::{with_retry, RetryConfig};

// ==================== 오류 ====================

/// 게이트웨이 오류.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 검증 실패 또는 거래소 거절. 재시도 금지, 해당 봉의 사이클 중단.
    #[error("주문 거절: {0}")]
    Rejected(String),

    /// 재시도를 소진했고 서버측 결과를 알 수 없음.
    /// `reconcile`로 해소될 때까지 해당 심볼은 신규 진입 금지.
    #[error("주문 결과 불명: {client_order_id}")]
    UnknownOutcome { client_order_id: String },

    /// 거래소 조회/통신 오류.
    #[error("거래소 오류: {0}")]
    Exchange(#[from] crate::ExchangeError),

    /// 주문 기록 저장/복원 실패.
    #[error("주문 상태 저장 오류: {0}")]
    Store(#[from] StoreError),
}

// ==================== 멱등성 키 ====================

/// 멱등성 키 생성.
///
/// `trail-{태그코드}-{sha256(symbol-태그코드-trade_id) 앞 16자}` 형식의
/// 25자 고정 길이로, 거래소 clientOrderId 제한(36자) 안에 들어갑니다.
/// 같은 논리적 트레이드의 같은 의도는 항상 같은 키를 얻습니다.
pub fn idempotency_key(symbol: &str, tag: IntentTag, trade_id: &Uuid) -> String {
    let digest = Sha256::digest(format!("{}-{}-{}", symbol, tag.code(), trade_id).as_bytes());
    let hash = hex::encode(digest);
    format!("trail-{}-{}", tag.code(), &hash[..16])
}

// ==================== 저장 기록 ====================

/// 키별 주문 기록. 재제출을 위해 의도 원본도 함께 저장합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredOrder {
    intent: OrderIntent,
    result: OrderResult,
}

fn store_key(symbol: &str) -> String {
    format!("orders-{}", symbol)
}

fn pending_result(intent: &OrderIntent, now: DateTime<Utc>) -> OrderResult {
    OrderResult {
        client_order_id: intent.client_order_id.clone(),
        symbol: intent.symbol.clone(),
        tag: intent.tag,
        order_side: intent.order_side,
        status: OrderStatus::Pending,
        exchange_order_id: None,
        avg_price: None,
        executed_qty: None,
        trade_id: intent.trade_id,
        updated_at: now,
        error: None,
    }
}

fn promote_to_sent(stored: &mut StoredOrder, exchange_order: &ExchangeOrder) {
    stored.result.status = OrderStatus::Sent;
    stored.result.exchange_order_id = Some(exchange_order.exchange_order_id.clone());
    stored.result.avg_price = exchange_order.avg_price;
    stored.result.executed_qty = exchange_order.executed_qty;
    stored.result.updated_at = Utc::now();
    stored.result.error = None;
}

fn mark_failed(stored: &mut StoredOrder, status: OrderStatus, error: &crate::ExchangeError) {
    stored.result.status = status;
    stored.result.updated_at = Utc::now();
    stored.result.error = Some(error.to_string());
}

// ==================== 게이트웨이 ====================

/// 멱등 주문 게이트웨이.
pub struct OrderGateway {
    api: Arc<dyn FuturesApi>,
    store: Arc<dyn StateStore>,
    retry: RetryConfig,
}

impl OrderGateway {
    pub fn new(api: Arc<dyn FuturesApi>, store: Arc<dyn StateStore>) -> Self {
        Self {
            api,
            store,
            retry: RetryConfig::default(),
        }
    }

    /// 재시도 설정 교체.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 주문 실행.
    ///
    /// 키에 최종 결과(SENT/REJECTED)가 저장되어 있으면 거래소를 다시
    /// 호출하지 않고 그 결과를 돌려줍니다. PENDING/UNKNOWN 기록은 먼저
    /// 거래소 조회로 해소하고, 기록이 없으면 PENDING 저장이 성공한
    /// 뒤에만 거래소를 호출합니다.
    ///
    /// # Errors
    ///
    /// * [`GatewayError::Rejected`] - 검증 실패/거래소 거절 (재호출해도 동일)
    /// * [`GatewayError::UnknownOutcome`] - 재시도 소진, `reconcile` 필요
    /// * [`GatewayError::Store`] - PENDING 선기록 실패 (거래소 호출 안 함)
    pub async fn place(&self, intent: &OrderIntent) -> Result<OrderResult, GatewayError> {
        let key = intent.client_order_id.as_str();
        let mut orders = self.load_orders(&intent.symbol).await?;

        if let Some(stored) = orders.get(key) {
            match stored.result.status {
                OrderStatus::Sent => {
                    debug!(client_order_id = key, "멱등성 캐시 적중 (SENT)");
                    return Ok(stored.result.clone());
                }
                OrderStatus::Rejected => {
                    debug!(client_order_id = key, "멱등성 캐시 적중 (REJECTED)");
                    let reason = stored
                        .result
                        .error
                        .clone()
                        .unwrap_or_else(|| "이전 거절 기록".to_string());
                    return Err(GatewayError::Rejected(reason));
                }
                OrderStatus::Pending | OrderStatus::Unknown => {
                    if let Some(result) = self
                        .resolve_by_lookup(&intent.symbol, key, &mut orders)
                        .await?
                    {
                        return Ok(result);
                    }
                    debug!(client_order_id = key, "거래소에 기록 없음, 같은 키로 재제출");
                }
            }
        }

        // 거래소 호출 전에 PENDING을 먼저 저장. 저장이 실패하면 주문을
        // 내지 않아 추적 불가능한 주문이 생기지 않습니다.
        let stored = StoredOrder {
            intent: intent.clone(),
            result: pending_result(intent, Utc::now()),
        };
        orders.insert(key.to_string(), stored);
        self.save_orders(&intent.symbol, &orders).await?;

        match with_retry(&self.retry, || self.api.place_order(intent)).await {
            Ok(exchange_order) => {
                if let Some(stored) = orders.get_mut(key) {
                    promote_to_sent(stored, &exchange_order);
                }
                // 접수 후 저장 실패는 기록만 남김. 주문은 이미 거래소에
                // 있으므로 호출자에게는 접수 결과를 돌려줘야 합니다.
                if let Err(e) = self.save_orders(&intent.symbol, &orders).await {
                    error!(error = %e, client_order_id = key, "접수 기록 저장 실패");
                }
                let result = orders[key].result.clone();
                info!(
                    symbol = %intent.symbol,
                    tag = %intent.tag,
                    client_order_id = key,
                    exchange_order_id = ?result.exchange_order_id,
                    "주문 접수"
                );
                Ok(result)
            }
            Err(e) if e.is_duplicate_client_order_id() => {
                info!(client_order_id = key, "중복 clientOrderId 거절, 기존 주문 조회");
                match self
                    .resolve_by_lookup(&intent.symbol, key, &mut orders)
                    .await?
                {
                    Some(result) => Ok(result),
                    None => {
                        // 거래소가 중복이라며 거절했는데 조회에도 없음
                        warn!(client_order_id = key, "중복 거절 후 조회 실패, 결과 불명");
                        self.settle_failure(intent, &mut orders, OrderStatus::Unknown, &e)
                            .await;
                        Err(GatewayError::UnknownOutcome {
                            client_order_id: key.to_string(),
                        })
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                // 재시도 소진. 요청이 서버에 닿았는지 알 수 없으므로
                // 조회로 해소되기 전까지 이 키는 미해소로 남습니다.
                warn!(error = %e, client_order_id = key, "재시도 소진, 주문 결과 불명");
                self.settle_failure(intent, &mut orders, OrderStatus::Unknown, &e)
                    .await;
                Err(GatewayError::UnknownOutcome {
                    client_order_id: key.to_string(),
                })
            }
            Err(e) => {
                warn!(error = %e, client_order_id = key, "주문 거절");
                self.settle_failure(intent, &mut orders, OrderStatus::Rejected, &e)
                    .await;
                Err(GatewayError::Rejected(e.to_string()))
            }
        }
    }

    /// 키에 저장된 결과 조회.
    pub async fn result_for(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderResult>, GatewayError> {
        let mut orders = self.load_orders(symbol).await?;
        Ok(orders.remove(client_order_id).map(|s| s.result))
    }

    /// PENDING/UNKNOWN 기록이 남아 있는지.
    pub async fn has_unresolved(&self, symbol: &str) -> Result<bool, GatewayError> {
        let orders = self.load_orders(symbol).await?;
        Ok(orders.values().any(|s| !s.result.status.is_terminal()))
    }

    /// 심볼의 미해소(PENDING/UNKNOWN) 기록을 모두 정리합니다.
    ///
    /// 거래소에 주문이 있으면 SENT로 승격하고, 없으면 저장된 의도로
    /// 같은 clientOrderId를 다시 제출합니다. 반환값은 해소한 기록 수.
    ///
    /// # Errors
    ///
    /// 일시적 오류로 미해소 기록이 남으면 오류를 반환합니다. 호출자는
    /// 해소에 성공할 때까지 신규 진입을 막아야 합니다.
    pub async fn reconcile(&self, symbol: &str) -> Result<usize, GatewayError> {
        let mut orders = self.load_orders(symbol).await?;
        let unresolved: Vec<String> = orders
            .iter()
            .filter(|(_, s)| !s.result.status.is_terminal())
            .map(|(k, _)| k.clone())
            .collect();

        if unresolved.is_empty() {
            return Ok(0);
        }

        info!(symbol = %symbol, count = unresolved.len(), "미해소 주문 기록 정리 시작");
        let mut settled = 0;

        for key in unresolved {
            if self
                .resolve_by_lookup(symbol, &key, &mut orders)
                .await?
                .is_some()
            {
                settled += 1;
                continue;
            }

            // 거래소에 기록 없음: 저장된 의도로 재제출.
            // 같은 clientOrderId라 이중 생성은 일어나지 않습니다.
            let Some(intent) = orders.get(&key).map(|s| s.intent.clone()) else {
                continue;
            };
            warn!(client_order_id = %key, "거래소에 기록 없음, 재제출");

            match with_retry(&self.retry, || self.api.place_order(&intent)).await {
                Ok(exchange_order) => {
                    if let Some(stored) = orders.get_mut(&key) {
                        promote_to_sent(stored, &exchange_order);
                    }
                    self.save_orders(symbol, &orders).await?;
                    settled += 1;
                }
                Err(e) if e.is_duplicate_client_order_id() => {
                    if self
                        .resolve_by_lookup(symbol, &key, &mut orders)
                        .await?
                        .is_some()
                    {
                        settled += 1;
                    } else {
                        return Err(GatewayError::UnknownOutcome {
                            client_order_id: key,
                        });
                    }
                }
                Err(e) if e.is_retryable() => {
                    if let Some(stored) = orders.get_mut(&key) {
                        mark_failed(stored, OrderStatus::Unknown, &e);
                    }
                    self.save_orders(symbol, &orders).await?;
                    return Err(GatewayError::UnknownOutcome {
                        client_order_id: key,
                    });
                }
                Err(e) => {
                    // 재제출이 검증 거절되면 그 키는 거절로 종결
                    warn!(error = %e, client_order_id = %key, "재제출 거절, 기록 종결");
                    if let Some(stored) = orders.get_mut(&key) {
                        mark_failed(stored, OrderStatus::Rejected, &e);
                    }
                    self.save_orders(symbol, &orders).await?;
                    settled += 1;
                }
            }
        }

        info!(symbol = %symbol, settled, "미해소 주문 기록 정리 완료");
        Ok(settled)
    }

    /// `max_age`보다 오래된 최종 상태 기록을 제거합니다. 반환값은 제거 수.
    ///
    /// 미해소(PENDING/UNKNOWN) 기록은 나이와 무관하게 남겨 둡니다.
    pub async fn cleanup_old(&self, symbol: &str, max_age: Duration) -> Result<usize, GatewayError> {
        let mut orders = self.load_orders(symbol).await?;
        let cutoff = Utc::now() - max_age;
        let before = orders.len();
        orders.retain(|_, s| !s.result.status.is_terminal() || s.result.updated_at >= cutoff);
        let removed = before - orders.len();

        if removed > 0 {
            self.save_orders(symbol, &orders).await?;
            debug!(symbol = %symbol, removed, "오래된 주문 기록 정리");
        }
        Ok(removed)
    }

    /// PENDING/UNKNOWN 기록을 거래소 조회로 해소합니다.
    /// 주문이 있으면 SENT로 승격하고 저장한 뒤 결과를 돌려줍니다.
    async fn resolve_by_lookup(
        &self,
        symbol: &str,
        key: &str,
        orders: &mut HashMap<String, StoredOrder>,
    ) -> Result<Option<OrderResult>, GatewayError> {
        let found = with_retry(&self.retry, || self.api.fetch_order(symbol, key)).await?;
        let Some(exchange_order) = found else {
            return Ok(None);
        };

        let Some(stored) = orders.get_mut(key) else {
            return Ok(None);
        };
        promote_to_sent(stored, &exchange_order);
        let result = stored.result.clone();
        self.save_orders(symbol, orders).await?;
        info!(client_order_id = key, "조회로 주문 상태 해소 (SENT)");
        Ok(Some(result))
    }

    /// 실패 상태를 기록하고 저장합니다. 저장 실패는 로그만 남깁니다.
    /// 호출자에게는 어차피 실패가 반환되므로 저장 오류로 덮지 않습니다.
    async fn settle_failure(
        &self,
        intent: &OrderIntent,
        orders: &mut HashMap<String, StoredOrder>,
        status: OrderStatus,
        error: &crate::ExchangeError,
    ) {
        if let Some(stored) = orders.get_mut(intent.client_order_id.as_str()) {
            mark_failed(stored, status, error);
        }
        if let Err(e) = self.save_orders(&intent.symbol, orders).await {
            error!(
                error = %e,
                client_order_id = %intent.client_order_id,
                "실패 기록 저장 실패"
            );
        }
    }

    async fn load_orders(&self, symbol: &str) -> Result<HashMap<String, StoredOrder>, GatewayError> {
        match self.store.load(&store_key(symbol)).await? {
            Some(value) => {
                serde_json::from_value(value).map_err(|e| GatewayError::Store(e.into()))
            }
            None => Ok(HashMap::new()),
        }
    }

    async fn save_orders(
        &self,
        symbol: &str,
        orders: &HashMap<String, StoredOrder>,
    ) -> Result<(), GatewayError> {
        let value = serde_json::to_value(orders).map_err(|e| GatewayError::Store(e.into()))?;
        self.store.save(&store_key(symbol), value).await?;
        Ok(())
    }
}
