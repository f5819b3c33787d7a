//! 운영 보조 기능: 심볼 상태 조회와 전 포지션 수동 청산.
//!
//! CLI에서 엔진을 띄우지 않고 호출합니다. 수동 청산은 로컬 기록이
//! 없는 포지션도 거래소 기준으로 정리합니다.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use trail_core::{ExitReason, IntentTag, OrderIntent, Position, TradeRecord};
use trail_exchange::{idempotency_key, FuturesApi, OrderGateway};
use trail_risk::{PositionManager, RiskConfig, TradeBlockState};
use trail_store::StateStore;

use crate::EngineError;

/// 심볼 하나의 요약 상태.
#[derive(Debug)]
pub struct SymbolStatus {
    pub symbol: String,
    pub position: Option<Position>,
    /// 기록된 거래 수
    pub trades: usize,
    /// 기록된 거래 수익률 합 (%)
    pub total_pnl_pct: Decimal,
    pub block: TradeBlockState,
}

/// 저장소 기준의 심볼 상태를 읽습니다. 거래소 호출은 없습니다.
pub async fn symbol_status(
    symbol: &str,
    risk: RiskConfig,
    store: Arc<dyn StateStore>,
) -> Result<SymbolStatus, EngineError> {
    let manager = PositionManager::load(symbol, risk, store).await?;
    let total_pnl_pct = manager.history().iter().map(|r| r.pnl_pct).sum();
    Ok(SymbolStatus {
        symbol: symbol.to_string(),
        position: manager.position().cloned(),
        trades: manager.history().len(),
        total_pnl_pct,
        block: manager.should_block_trades(Utc::now()),
    })
}

/// 거래소의 열린 포지션을 전부 시장가로 청산합니다.
///
/// 심볼마다 미체결 주문을 먼저 걷고 잔량을 reduce-only 시장가로
/// 닫습니다. 로컬 포지션이 있던 심볼은 거래 기록을 남겨 반환하고,
/// 청산 주문이 실패한 심볼은 건너뜁니다.
pub async fn close_all(
    api: Arc<dyn FuturesApi>,
    store: Arc<dyn StateStore>,
) -> Result<Vec<TradeRecord>, EngineError> {
    let gateway = OrderGateway::new(Arc::clone(&api), Arc::clone(&store));
    let positions = api.fetch_positions(None).await?;

    let mut records = Vec::new();
    for position_info in positions.iter().filter(|p| p.is_open()) {
        let Some(side) = position_info.side() else {
            continue;
        };
        let symbol = position_info.symbol.clone();

        match api.fetch_open_orders(&symbol).await {
            Ok(open) => {
                for order in &open {
                    if let Err(e) = api.cancel_order(&symbol, &order.client_order_id).await {
                        warn!(
                            symbol = %symbol,
                            client_order_id = %order.client_order_id,
                            error = %e,
                            "주문 취소 실패"
                        );
                    }
                }
            }
            Err(e) => warn!(symbol = %symbol, error = %e, "미체결 주문 조회 실패"),
        }

        let qty = position_info.position_amt.abs();
        let trade_id = Uuid::new_v4();
        let key = idempotency_key(&symbol, IntentTag::FullClose, &trade_id);
        let intent = OrderIntent::full_close(key, symbol.as_str(), side, qty, trade_id);
        let exit_price = match gateway.place(&intent).await {
            Ok(result) => result.avg_price.unwrap_or(position_info.mark_price),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "청산 주문 실패, 건너뜀");
                continue;
            }
        };

        let mut manager =
            match PositionManager::load(&symbol, RiskConfig::default(), Arc::clone(&store)).await {
                Ok(manager) => manager,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "포지션 상태 복원 실패");
                    continue;
                }
            };
        match manager.close(exit_price, Utc::now(), ExitReason::Manual).await {
            Some(record) => {
                info!(
                    symbol = %symbol,
                    exit_price = %exit_price,
                    pnl_pct = %record.pnl_pct,
                    "수동 청산"
                );
                records.push(record);
            }
            None => {
                info!(symbol = %symbol, exit_price = %exit_price, "수동 청산 (로컬 기록 없음)")
            }
        }
    }
    Ok(records)
}
