//! 멱등 주문 게이트웨이 통합 테스트
//!
//! ## 멱등성 프로토콜 핵심
//!
//! 1. 키별 기록을 거래소 호출 전에 PENDING으로 저장 (저장 실패 시 호출 안 함)
//! 2. 최종 상태(SENT/REJECTED)는 캐시에서 바로 반환, 거래소 재호출 없음
//! 3. PENDING/UNKNOWN은 clientOrderId 조회로 해소, 없으면 같은 키로 재제출
//! 4. 일시적 오류만 재시도, 검증 거절은 즉시 REJECTED
//! 5. 재시도 소진 시 UNKNOWN으로 남기고 `reconcile` 전까지 미해소 취급

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use trail_core::domain::{IntentTag, OrderIntent, OrderResult, OrderStatus, Side};
use trail_exchange::{
    idempotency_key, ExchangeOrder, GatewayError, MockFailure, MockFuturesApi, OrderGateway,
    RetryConfig,
};
use trail_store::{MemoryStore, StateStore};

// ============================================================================
// 테스트 헬퍼 함수
// ============================================================================

/// 지연이 거의 없는 테스트용 재시도 설정
fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: std::time::Duration::from_millis(10),
        max_delay: std::time::Duration::from_millis(50),
        add_jitter: false,
        ..Default::default()
    }
}

/// 모의 거래소 + 인메모리 저장소를 붙인 게이트웨이
fn build_gateway(max_retries: u32) -> (OrderGateway, Arc<MockFuturesApi>, Arc<MemoryStore>) {
    let api = Arc::new(MockFuturesApi::new());
    let store = Arc::new(MemoryStore::new());
    let gateway = OrderGateway::new(api.clone(), store.clone())
        .with_retry_config(fast_retry(max_retries));
    (gateway, api, store)
}

/// ETHUSDT 롱 진입 의도
fn entry_intent(trade_id: Uuid) -> OrderIntent {
    OrderIntent::entry(
        idempotency_key("ETHUSDT", IntentTag::Entry, &trade_id),
        "ETHUSDT",
        Side::Long,
        dec!(0.5),
        trade_id,
    )
}

/// 저장소에 직접 넣을 주문 기록 JSON (이전 실행이 남긴 상태 재현용)
fn stored_order_json(
    intent: &OrderIntent,
    status: OrderStatus,
    updated_at: chrono::DateTime<Utc>,
) -> serde_json::Value {
    let result = OrderResult {
        client_order_id: intent.client_order_id.clone(),
        symbol: intent.symbol.clone(),
        tag: intent.tag,
        order_side: intent.order_side,
        status,
        exchange_order_id: None,
        avg_price: None,
        executed_qty: None,
        trade_id: intent.trade_id,
        updated_at,
        error: None,
    };
    json!({ "intent": intent, "result": result })
}

/// 거래소 응답으로 사용할 주문 한 건
fn exchange_order(client_order_id: &str, exchange_order_id: &str) -> ExchangeOrder {
    ExchangeOrder {
        exchange_order_id: exchange_order_id.to_string(),
        client_order_id: client_order_id.to_string(),
        symbol: "ETHUSDT".to_string(),
        status: "NEW".to_string(),
        avg_price: None,
        executed_qty: None,
        updated_at: Utc::now(),
    }
}

// ============================================================================
// 멱등성 (키당 주문 최대 1건)
// ============================================================================

#[tokio::test]
async fn test_place_same_key_twice_places_exactly_one_order() {
    let (gateway, api, _store) = build_gateway(3);
    let intent = entry_intent(Uuid::new_v4());

    let first = gateway.place(&intent).await.unwrap();
    let second = gateway.place(&intent).await.unwrap();

    // 두 번째 호출은 캐시에서 동일한 결과를 돌려줌
    assert_eq!(first.status, OrderStatus::Sent);
    assert_eq!(first, second);

    // 거래소에는 주문이 정확히 1건
    assert_eq!(api.place_call_count(), 1);
    assert_eq!(api.order_count().await, 1);
}

#[tokio::test]
async fn test_bracket_orders_use_distinct_keys_for_same_trade() {
    let (gateway, api, _store) = build_gateway(3);
    let trade_id = Uuid::new_v4();

    let entry = entry_intent(trade_id);
    let tp = OrderIntent::take_profit_close(
        idempotency_key("ETHUSDT", IntentTag::TakeProfitClose, &trade_id),
        "ETHUSDT",
        Side::Long,
        dec!(2060),
        trade_id,
    );
    let sl = OrderIntent::stop_close(
        idempotency_key("ETHUSDT", IntentTag::StopClose, &trade_id),
        "ETHUSDT",
        Side::Long,
        dec!(1940),
        trade_id,
    );

    let entry_result = gateway.place(&entry).await.unwrap();
    let tp_result = gateway.place(&tp).await.unwrap();
    let sl_result = gateway.place(&sl).await.unwrap();

    // 같은 trade_id, 서로 다른 키로 3건
    assert_eq!(api.order_count().await, 3);
    assert_eq!(entry_result.trade_id, trade_id);
    assert_eq!(tp_result.trade_id, trade_id);
    assert_eq!(sl_result.trade_id, trade_id);
    assert_ne!(entry_result.client_order_id, tp_result.client_order_id);
    assert_ne!(tp_result.client_order_id, sl_result.client_order_id);

    // 트리거 주문은 미체결 접수 상태
    assert_eq!(tp_result.status, OrderStatus::Sent);
    assert!(tp_result.avg_price.is_none());
}

// ============================================================================
// 재시도 분류
// ============================================================================

#[tokio::test]
async fn test_transient_errors_retried_until_success() {
    let (gateway, api, _store) = build_gateway(3);
    api.fail_next_places(2, MockFailure::Transient).await;

    let intent = entry_intent(Uuid::new_v4());
    let result = gateway.place(&intent).await.unwrap();

    assert_eq!(result.status, OrderStatus::Sent);
    // 실패 2회 + 성공 1회
    assert_eq!(api.place_call_count(), 3);
    assert_eq!(api.order_count().await, 1);
}

#[tokio::test]
async fn test_validation_rejection_not_retried_and_cached() {
    let (gateway, api, _store) = build_gateway(3);
    api.fail_next_places(1, MockFailure::Validation).await;

    let intent = entry_intent(Uuid::new_v4());
    let err = gateway.place(&intent).await.unwrap_err();
    assert!(matches!(err, GatewayError::Rejected(_)));
    // 검증 거절은 재시도하지 않음
    assert_eq!(api.place_call_count(), 1);

    // 같은 키 재호출도 캐시된 거절을 반환, 거래소 재호출 없음
    let err = gateway.place(&intent).await.unwrap_err();
    assert!(matches!(err, GatewayError::Rejected(_)));
    assert_eq!(api.place_call_count(), 1);
    assert!(!gateway.has_unresolved("ETHUSDT").await.unwrap());
}

#[tokio::test]
async fn test_exhausted_retries_leave_unresolved_record() {
    let (gateway, api, _store) = build_gateway(1);
    api.fail_next_places(10, MockFailure::Transient).await;

    let intent = entry_intent(Uuid::new_v4());
    let err = gateway.place(&intent).await.unwrap_err();

    match err {
        GatewayError::UnknownOutcome { client_order_id } => {
            assert_eq!(client_order_id, intent.client_order_id);
        }
        other => panic!("UnknownOutcome이어야 함: {other:?}"),
    }
    // 초기 시도 + 재시도 1회
    assert_eq!(api.place_call_count(), 2);
    // 해소 전까지 미해소 기록이 남음
    assert!(gateway.has_unresolved("ETHUSDT").await.unwrap());
}

// ============================================================================
// 저장 우선 순서 (PENDING 선기록)
// ============================================================================

#[tokio::test]
async fn test_store_failure_blocks_exchange_call() {
    let api = Arc::new(MockFuturesApi::new());
    let store = Arc::new(MemoryStore::new());
    let gateway =
        OrderGateway::new(api.clone(), store.clone()).with_retry_config(fast_retry(3));

    store.set_fail_saves(true);
    let intent = entry_intent(Uuid::new_v4());
    let err = gateway.place(&intent).await.unwrap_err();

    assert!(matches!(err, GatewayError::Store(_)));
    // PENDING 기록에 실패하면 거래소를 호출하지 않음
    assert_eq!(api.place_call_count(), 0);
    assert_eq!(api.order_count().await, 0);
}

// ============================================================================
// 미해소 기록 해소 (reconcile)
// ============================================================================

#[tokio::test]
async fn test_reconcile_promotes_order_found_on_exchange() {
    let (gateway, api, _store) = build_gateway(0);
    let intent = entry_intent(Uuid::new_v4());

    // 타임아웃: 요청이 거래소에 닿았는지 알 수 없는 상황
    api.fail_next_places(1, MockFailure::Timeout).await;
    let err = gateway.place(&intent).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnknownOutcome { .. }));

    // 사실은 접수되어 있었음
    api.seed_order(exchange_order(&intent.client_order_id, "9001"))
        .await;

    let settled = gateway.reconcile("ETHUSDT").await.unwrap();
    assert_eq!(settled, 1);
    assert!(!gateway.has_unresolved("ETHUSDT").await.unwrap());

    let result = gateway
        .result_for("ETHUSDT", &intent.client_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.status, OrderStatus::Sent);
    assert_eq!(result.exchange_order_id.as_deref(), Some("9001"));

    // 해소 후 같은 키 재호출은 캐시 적중, 신규 제출 없음
    let cached = gateway.place(&intent).await.unwrap();
    assert_eq!(cached.status, OrderStatus::Sent);
    assert_eq!(api.place_call_count(), 1);
}

#[tokio::test]
async fn test_reconcile_replaces_order_missing_on_exchange() {
    let (gateway, api, store) = build_gateway(3);
    let intent = entry_intent(Uuid::new_v4());

    // 이전 실행이 PENDING만 남기고 죽은 상태 재현 (거래소에는 없음)
    let mut doc = serde_json::Map::new();
    doc.insert(
        intent.client_order_id.clone(),
        stored_order_json(&intent, OrderStatus::Pending, Utc::now()),
    );
    store
        .save("orders-ETHUSDT", serde_json::Value::Object(doc))
        .await
        .unwrap();
    assert!(gateway.has_unresolved("ETHUSDT").await.unwrap());

    // 저장된 의도로 같은 키 재제출
    let settled = gateway.reconcile("ETHUSDT").await.unwrap();
    assert_eq!(settled, 1);
    assert_eq!(api.place_call_count(), 1);
    assert_eq!(api.order_count().await, 1);
    assert!(!gateway.has_unresolved("ETHUSDT").await.unwrap());

    let result = gateway
        .result_for("ETHUSDT", &intent.client_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.status, OrderStatus::Sent);
}

#[tokio::test]
async fn test_duplicate_rejection_resolved_via_lookup() {
    let (gateway, api, _store) = build_gateway(3);
    let intent = entry_intent(Uuid::new_v4());

    // 거래소에는 이미 같은 clientOrderId 주문이 존재 (기록 유실 상황)
    api.seed_order(exchange_order(&intent.client_order_id, "7777"))
        .await;

    // 제출은 중복 거절되지만 조회로 기존 주문을 받아 성공 처리
    let result = gateway.place(&intent).await.unwrap();
    assert_eq!(result.status, OrderStatus::Sent);
    assert_eq!(result.exchange_order_id.as_deref(), Some("7777"));
    assert_eq!(api.place_call_count(), 1);
    assert_eq!(api.order_count().await, 1);
}

// ============================================================================
// 기록 정리
// ============================================================================

#[tokio::test]
async fn test_cleanup_old_keeps_unresolved_records() {
    let (gateway, _api, store) = build_gateway(3);

    let old_sent = entry_intent(Uuid::new_v4());
    let old_pending = OrderIntent::entry(
        idempotency_key("ETHUSDT", IntentTag::Entry, &Uuid::new_v4()),
        "ETHUSDT",
        Side::Long,
        dec!(0.5),
        Uuid::new_v4(),
    );
    let two_days_ago = Utc::now() - Duration::hours(48);

    let mut doc = serde_json::Map::new();
    doc.insert(
        old_sent.client_order_id.clone(),
        stored_order_json(&old_sent, OrderStatus::Sent, two_days_ago),
    );
    doc.insert(
        old_pending.client_order_id.clone(),
        stored_order_json(&old_pending, OrderStatus::Pending, two_days_ago),
    );
    store
        .save("orders-ETHUSDT", serde_json::Value::Object(doc))
        .await
        .unwrap();

    let removed = gateway
        .cleanup_old("ETHUSDT", Duration::hours(24))
        .await
        .unwrap();

    // 오래된 최종 기록만 제거, 미해소 기록은 나이와 무관하게 유지
    assert_eq!(removed, 1);
    assert!(gateway
        .result_for("ETHUSDT", &old_sent.client_order_id)
        .await
        .unwrap()
        .is_none());
    assert!(gateway.has_unresolved("ETHUSDT").await.unwrap());
}
