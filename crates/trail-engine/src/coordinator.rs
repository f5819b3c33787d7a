//! 심볼 실행 코디네이터.
//!
//! 확정 봉 하나를 받아 지표 갱신 → 포지션 관리 → 신호 평가 → 진입까지
//! 한 사이클을 수행합니다. 거래소 호출은 전부 게이트웨이를 거치고, 알림
//! 실패는 로그만 남기고 삼킵니다.
//!
//! 진입 가드 순서: 포지션 보유 → 미해소 주문 → 연속 손실 차단 →
//! 저장 성능 저하 → 중복 신호. 신호는 진입 주문 전에 기록되므로 결과를
//! 모르는 주문이 남아도 같은 봉에서 재진입하지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trail_core::{Bar, EntrySignal, IntentTag, OrderIntent, Position, Side};
use trail_exchange::{
    idempotency_key, quantize_price, quantize_qty, FuturesApi, GatewayError, OrderGateway,
};
use trail_indicator::IndicatorEngine;
use trail_notification::{notify, AlertEvent, NotificationSender};
use trail_risk::{PositionManager, RiskAction};
use trail_store::StateStore;
use trail_strategy::{evaluate, RegimeDetector};

use crate::config::SymbolConfig;
use crate::latency::LatencyTracker;
use crate::EngineError;

fn signal_key(symbol: &str) -> String {
    format!("signals-{}", symbol)
}

/// 마지막으로 집행한 진입 신호.
///
/// 같은 봉의 같은 방향 신호를 두 번 집행하지 않기 위해 저장소에
/// 보관합니다. 진입 주문의 결과를 모른 채 재기동해도 이 기록이 남아
/// 있으므로 같은 봉에서 다시 진입하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct LastSignal {
    side: Side,
    bar_time: DateTime<Utc>,
}

async fn load_last_signal(store: &dyn StateStore, symbol: &str) -> Option<LastSignal> {
    match store.load(&signal_key(symbol)).await {
        Ok(Some(doc)) => match serde_json::from_value(doc) {
            Ok(last) => Some(last),
            Err(e) => {
                warn!(symbol, error = %e, "신호 기록 역직렬화 실패, 무시");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(symbol, error = %e, "신호 기록 읽기 실패, 무시");
            None
        }
    }
}

/// 심볼 하나의 집행 파이프라인.
pub struct ExecutionCoordinator {
    config: SymbolConfig,
    indicator: IndicatorEngine,
    regime: RegimeDetector,
    manager: PositionManager,
    gateway: Arc<OrderGateway>,
    api: Arc<dyn FuturesApi>,
    store: Arc<dyn StateStore>,
    alerts: Option<Arc<dyn NotificationSender>>,
    latency_warn_ms: f64,
    last_signal: Option<LastSignal>,
    /// 차단 에피소드당 알림 1회
    block_alerted: bool,
}

impl ExecutionCoordinator {
    /// 저장소에서 포지션/이력/신호 기록을 복원해 코디네이터를 만듭니다.
    pub async fn new(
        config: SymbolConfig,
        api: Arc<dyn FuturesApi>,
        gateway: Arc<OrderGateway>,
        store: Arc<dyn StateStore>,
        alerts: Option<Arc<dyn NotificationSender>>,
        latency_warn_ms: f64,
    ) -> Result<Self, EngineError> {
        let manager =
            PositionManager::load(&config.symbol, config.risk.clone(), Arc::clone(&store)).await?;
        let last_signal = load_last_signal(store.as_ref(), &config.symbol).await;
        Ok(Self {
            indicator: IndicatorEngine::new(config.indicator.clone()),
            regime: RegimeDetector::new(config.regime_lookback),
            manager,
            gateway,
            api,
            store,
            alerts,
            latency_warn_ms,
            last_signal,
            block_alerted: false,
            config,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    /// 과거 봉으로 지표와 레짐 감지기를 데웁니다. 주문은 내지 않습니다.
    pub fn warm_up(&mut self, bars: &[Bar]) {
        let mut warm = false;
        for bar in bars {
            let snapshot = self.indicator.step(bar);
            self.regime.update(&snapshot);
            warm = snapshot.warm;
        }
        info!(
            symbol = %self.config.symbol,
            bars = bars.len(),
            warm,
            "지표 워밍업 완료"
        );
    }

    /// 종결된 지 오래된 주문 기록 정리.
    pub async fn cleanup(&self, max_age: chrono::Duration) {
        match self.gateway.cleanup_old(&self.config.symbol, max_age).await {
            Ok(0) => {}
            Ok(removed) => info!(symbol = %self.config.symbol, removed, "주문 기록 정리"),
            Err(e) => warn!(symbol = %self.config.symbol, error = %e, "주문 기록 정리 실패"),
        }
    }

    /// 확정 봉 하나를 처리합니다.
    ///
    /// 보유 포지션 관리가 신규 진입보다 항상 먼저입니다. 반환 오류는
    /// 주문/상태 계층의 실패이며, 워커는 오류가 나도 다음 봉을 계속
    /// 처리합니다.
    pub async fn on_bar(&mut self, bar: &Bar) -> Result<(), EngineError> {
        let latency = LatencyTracker::start(self.latency_warn_ms);

        let snapshot = self.indicator.step(bar);
        let regime = self.regime.update(&snapshot);

        let open_trade = self.manager.position().map(|p| (p.side, p.position_id));
        let actions = self.manager.update(bar, &snapshot).await;
        self.apply_actions(&actions, open_trade).await;

        let Some(signal) = evaluate(&self.config.symbol, &snapshot, regime, &self.config.evaluator)
        else {
            return Ok(());
        };
        self.try_enter(signal, &latency).await
    }

    /// 리스크 액션을 거래소에 반영합니다.
    ///
    /// 한 봉에서 스탑 이동이 여러 번 나오면 (본전 + 트레일링) 마지막
    /// 것만 집행합니다. `open_trade`는 `update` 직전의 (방향, 트레이드 id).
    async fn apply_actions(&self, actions: &[RiskAction], open_trade: Option<(Side, Uuid)>) {
        let last_move = actions
            .iter()
            .rposition(|a| matches!(a, RiskAction::MoveStop { .. }));
        for (i, action) in actions.iter().enumerate() {
            if matches!(action, RiskAction::MoveStop { .. }) && Some(i) != last_move {
                continue;
            }
            self.apply_action(action, open_trade).await;
        }
    }

    async fn apply_action(&self, action: &RiskAction, open_trade: Option<(Side, Uuid)>) {
        let symbol = self.config.symbol.clone();
        let Some((side, trade_id)) = open_trade else {
            return;
        };

        match action {
            RiskAction::MoveStop {
                kind,
                old_sl,
                new_sl,
            } => match self.replace_stop_order(side, *new_sl, trade_id).await {
                Ok(()) => {
                    info!(
                        symbol = %symbol,
                        kind = %kind,
                        old_sl = %old_sl,
                        new_sl = %new_sl,
                        "스탑 주문 교체"
                    );
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "스탑 주문 교체 실패");
                    self.alert_system_error(format!("{} 스탑 교체", symbol), &e)
                        .await;
                }
            },

            RiskAction::PartialClose {
                close_qty,
                price,
                profit_pct,
            } => {
                let qty = match quantize_qty(*close_qty, self.config.step_size) {
                    Ok(qty) => qty,
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "부분 익절 수량 양자화 실패");
                        return;
                    }
                };
                let key = idempotency_key(&symbol, IntentTag::PartialClose, &trade_id);
                let intent =
                    OrderIntent::partial_close(key, symbol.as_str(), side, qty, trade_id);
                match self.gateway.place(&intent).await {
                    Ok(_) => {
                        info!(symbol = %symbol, qty = %qty, price = %price, "부분 익절 주문 접수");
                        notify(
                            self.alerts.as_deref(),
                            AlertEvent::PartialExit {
                                symbol: symbol.clone(),
                                side,
                                price: *price,
                                closed_qty: qty,
                                profit_pct: *profit_pct,
                            },
                        )
                        .await;
                    }
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "부분 익절 주문 실패");
                        self.alert_system_error(format!("{} 부분 익절", symbol), &e)
                            .await;
                    }
                }
            }

            RiskAction::FullClose { record, close_qty } => {
                // 트리거 주문을 먼저 걷어야 이중 청산이 없다
                self.cancel_tagged_orders(&[IntentTag::TakeProfitClose, IntentTag::StopClose])
                    .await;

                match quantize_qty(*close_qty, self.config.step_size) {
                    Ok(qty) => {
                        let key = idempotency_key(&symbol, IntentTag::FullClose, &trade_id);
                        let intent =
                            OrderIntent::full_close(key, symbol.as_str(), side, qty, trade_id);
                        match self.gateway.place(&intent).await {
                            Ok(_) => {
                                info!(
                                    symbol = %symbol,
                                    qty = %qty,
                                    exit_price = %record.exit_price,
                                    reason = %record.reason,
                                    "청산 주문 접수"
                                );
                            }
                            // 트리거가 이미 체결되어 잔여 수량이 없으면 거절됨
                            Err(GatewayError::Rejected(msg)) => {
                                warn!(
                                    symbol = %symbol,
                                    msg = %msg,
                                    "청산 주문 거절, 이미 청산된 것으로 간주"
                                );
                            }
                            Err(e) => {
                                error!(symbol = %symbol, error = %e, "청산 주문 실패");
                                self.alert_system_error(format!("{} 청산", symbol), &e)
                                    .await;
                            }
                        }
                    }
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "청산 수량 양자화 실패");
                    }
                }

                notify(
                    self.alerts.as_deref(),
                    AlertEvent::PositionClosed {
                        symbol: record.symbol.clone(),
                        side: record.side,
                        entry_price: record.entry_price,
                        exit_price: record.exit_price,
                        pnl_pct: record.pnl_pct,
                        reason: record.reason,
                    },
                )
                .await;
            }
        }
    }

    /// 지정 태그의 미체결 주문을 clientOrderId 접두사로 찾아 취소합니다.
    async fn cancel_tagged_orders(&self, tags: &[IntentTag]) -> usize {
        let symbol = &self.config.symbol;
        let open = match self.api.fetch_open_orders(symbol).await {
            Ok(open) => open,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "미체결 주문 조회 실패");
                return 0;
            }
        };

        let prefixes: Vec<String> = tags
            .iter()
            .map(|tag| format!("trail-{}-", tag.code()))
            .collect();
        let mut canceled = 0;
        for order in &open {
            if !prefixes
                .iter()
                .any(|p| order.client_order_id.starts_with(p.as_str()))
            {
                continue;
            }
            match self.api.cancel_order(symbol, &order.client_order_id).await {
                Ok(()) => canceled += 1,
                Err(e) => warn!(
                    symbol = %symbol,
                    client_order_id = %order.client_order_id,
                    error = %e,
                    "주문 취소 실패"
                ),
            }
        }
        if canceled > 0 {
            debug!(symbol = %symbol, canceled, "트리거 주문 취소");
        }
        canceled
    }

    /// 스탑 주문 교체: 기존 스탑 취소 후 새 트리거 가격으로 재발행.
    ///
    /// 교체는 트레이드당 여러 번 일어나므로 멱등성 키를 매번 새로
    /// 만듭니다. 논리적 트레이드 id는 포지션 것을 그대로 씁니다.
    async fn replace_stop_order(
        &self,
        side: Side,
        new_sl: Decimal,
        trade_id: Uuid,
    ) -> Result<(), GatewayError> {
        self.cancel_tagged_orders(&[IntentTag::StopClose]).await;

        let symbol = &self.config.symbol;
        let price = quantize_price(new_sl, self.config.tick_size)?;
        let key = idempotency_key(symbol, IntentTag::StopClose, &Uuid::new_v4());
        let intent = OrderIntent::stop_close(key, symbol.as_str(), side, price, trade_id);
        self.gateway.place(&intent).await?;
        Ok(())
    }

    /// 진입 시도. 모든 가드를 통과하면 ENTRY → TP → SL 순서로 발행하고
    /// 포지션을 등록합니다.
    async fn try_enter(
        &mut self,
        signal: EntrySignal,
        latency: &LatencyTracker,
    ) -> Result<(), EngineError> {
        let symbol = self.config.symbol.clone();

        if self.manager.has_position() {
            debug!(symbol = %symbol, "포지션 보유 중, 신호 무시");
            return Ok(());
        }

        if !self.ensure_orders_resolved(&symbol).await {
            return Ok(());
        }

        let block = self.manager.should_block_trades(Utc::now());
        if block.blocked {
            warn!(symbol = %symbol, reason = %block.reason, "신규 진입 차단");
            if !self.block_alerted {
                self.block_alerted = true;
                notify(
                    self.alerts.as_deref(),
                    AlertEvent::TradeBlocked {
                        symbol: symbol.clone(),
                        reason: block.reason,
                    },
                )
                .await;
            }
            return Ok(());
        }
        self.block_alerted = false;

        if self.manager.persistence_degraded() {
            error!(symbol = %symbol, "상태 저장 반복 실패, 신규 진입 중단");
            return Ok(());
        }

        if self
            .last_signal
            .map_or(false, |s| s.side == signal.side && s.bar_time == signal.bar_time)
        {
            debug!(symbol = %symbol, "이미 집행한 신호, 무시");
            return Ok(());
        }

        // 주문 전에 기록해야 결과 불명 주문이 남아도 재진입하지 않는다
        self.remember_signal(&signal).await;

        let entry_price = quantize_price(signal.price, self.config.tick_size)?;
        let qty = quantize_qty(self.config.quote_qty / entry_price, self.config.step_size)?;

        let pct = Decimal::ONE_HUNDRED;
        let (tp_raw, sl_raw) = match signal.side {
            Side::Long => (
                signal.price * (Decimal::ONE + self.config.tp_pct / pct),
                signal.price * (Decimal::ONE - self.config.sl_pct / pct),
            ),
            Side::Short => (
                signal.price * (Decimal::ONE - self.config.tp_pct / pct),
                signal.price * (Decimal::ONE + self.config.sl_pct / pct),
            ),
        };
        let tp_price = quantize_price(tp_raw, self.config.tick_size)?;
        let sl_price = quantize_price(sl_raw, self.config.tick_size)?;

        let trade_id = Uuid::new_v4();
        let entry_key = idempotency_key(&symbol, IntentTag::Entry, &trade_id);
        let entry = OrderIntent::entry(entry_key, symbol.as_str(), signal.side, qty, trade_id);

        let result = match self.gateway.place(&entry).await {
            Ok(result) => result,
            Err(e) => {
                error!(symbol = %symbol, error = %e, "진입 주문 실패");
                self.alert_system_error(format!("{} 진입", symbol), &e).await;
                return Err(e.into());
            }
        };
        let latency_ms = latency.checkpoint(&symbol, "진입 주문");

        let fill_price = result.avg_price.unwrap_or(entry_price);
        let fill_qty = result.executed_qty.unwrap_or(qty);

        // 보호 주문은 둘 다 시도한다. 실패해도 포지션 등록은 진행하고
        // 마지막 오류를 호출자에게 알린다.
        let mut protection_error: Option<GatewayError> = None;

        let tp_key = idempotency_key(&symbol, IntentTag::TakeProfitClose, &trade_id);
        let tp = OrderIntent::take_profit_close(tp_key, symbol.as_str(), signal.side, tp_price, trade_id);
        if let Err(e) = self.gateway.place(&tp).await {
            error!(symbol = %symbol, error = %e, "익절 주문 실패");
            protection_error = Some(e);
        }

        let sl_key = idempotency_key(&symbol, IntentTag::StopClose, &trade_id);
        let sl = OrderIntent::stop_close(sl_key, symbol.as_str(), signal.side, sl_price, trade_id);
        if let Err(e) = self.gateway.place(&sl).await {
            error!(symbol = %symbol, error = %e, "손절 주문 실패");
            protection_error = Some(e);
        }

        let position = Position::open(
            symbol.as_str(),
            signal.side,
            fill_price,
            fill_qty,
            sl_price,
            trade_id,
            Utc::now(),
        );
        self.manager.register(position).await?;

        info!(
            symbol = %symbol,
            side = %signal.side,
            entry = %fill_price,
            qty = %fill_qty,
            tp = %tp_price,
            sl = %sl_price,
            confidence = signal.confidence,
            latency_ms,
            "진입 체결"
        );
        notify(
            self.alerts.as_deref(),
            AlertEvent::EntryFilled {
                symbol: symbol.clone(),
                side: signal.side,
                entry: fill_price,
                tp: tp_price,
                sl: sl_price,
                confidence: signal.confidence,
                latency_ms,
            },
        )
        .await;

        if let Some(e) = protection_error {
            self.alert_system_error(format!("{} 보호 주문", symbol), &e)
                .await;
            return Err(e.into());
        }
        Ok(())
    }

    /// 미해소 주문이 없는 상태를 보장합니다. 반환 false면 이 봉의 진입을
    /// 건너뜁니다.
    ///
    /// 정리 과정에서 과거 진입 주문이 뒤늦게 체결될 수 있습니다. 그래서
    /// 정리 직후 거래소 포지션을 확인하고, 추적하지 않는 포지션이 보이면
    /// 운영자 알림을 남기고 진입을 멈춥니다.
    async fn ensure_orders_resolved(&self, symbol: &str) -> bool {
        match self.gateway.has_unresolved(symbol).await {
            Ok(false) => return true,
            Ok(true) => {}
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "미해소 주문 확인 실패, 진입 보류");
                return false;
            }
        }

        let settled = match self.gateway.reconcile(symbol).await {
            Ok(settled) => settled,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "미해소 주문 정리 실패, 진입 보류");
                return false;
            }
        };
        info!(symbol = %symbol, settled, "미해소 주문 정리 완료");

        match self.api.fetch_positions(Some(symbol)).await {
            Ok(positions) if positions.iter().any(|p| p.is_open()) => {
                error!(
                    symbol = %symbol,
                    "정리 후 추적하지 않는 거래소 포지션 발견, 진입 중단"
                );
                notify(
                    self.alerts.as_deref(),
                    AlertEvent::SystemError {
                        context: format!("{} 주문 정리", symbol),
                        message: "추적하지 않는 거래소 포지션이 있습니다. close-all로 정리하세요."
                            .to_string(),
                    },
                )
                .await;
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "거래소 포지션 확인 실패, 진입 보류");
                false
            }
        }
    }

    async fn remember_signal(&mut self, signal: &EntrySignal) {
        let last = LastSignal {
            side: signal.side,
            bar_time: signal.bar_time,
        };
        match serde_json::to_value(last) {
            Ok(doc) => {
                if let Err(e) = self.store.save(&signal_key(&self.config.symbol), doc).await {
                    warn!(symbol = %self.config.symbol, error = %e, "신호 기록 저장 실패");
                }
            }
            Err(e) => warn!(symbol = %self.config.symbol, error = %e, "신호 기록 직렬화 실패"),
        }
        self.last_signal = Some(last);
    }

    async fn alert_system_error(&self, context: String, error: &GatewayError) {
        notify(
            self.alerts.as_deref(),
            AlertEvent::SystemError {
                context,
                message: error.to_string(),
            },
        )
        .await;
    }
}
