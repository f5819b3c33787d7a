//! 포지션 생애주기 상태 기계.
//!
//! 확정 봉마다 고정된 우선순위로 규칙을 적용합니다:
//!
//! 1. 본전 이동 (한 번만)
//! 2. 트레일링 스탑 갱신 (유리한 방향으로만)
//! 3. 부분 익절 (한 번만)
//! 4. 트레일링 스탑 터치 → 전량 청산
//! 5. EMA 추세 반전 → 전량 청산
//! 6. 거래량 급증 + 반대 HA 캔들 → 전량 청산
//!
//! 3~6은 청산 결정이므로 봉당 최대 하나만 발동하고, 먼저 걸린 것이
//! 우선합니다. 관리자는 결정을 [`RiskAction`]으로 돌려줄 뿐 거래소를
//! 호출하지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info};

use trail_core::{
    calculate_pnl_pct, Bar, ExitReason, Position, Side, TradeRecord, TRADE_HISTORY_CAP,
};
use trail_indicator::IndicatorSnapshot;
use trail_store::{StateStore, StoreError};

use crate::blocker::{self, TradeBlockState};
use crate::config::RiskConfig;
use crate::RiskError;

/// 이 횟수 이상 저장에 연속 실패하면 신규 진입을 막아야 합니다.
/// 메모리 상태와 디스크가 갈라진 채 거래를 쌓는 것을 방지합니다.
const PERSIST_FAILURE_LIMIT: u32 = 3;

fn position_key(symbol: &str) -> String {
    format!("positions-{}", symbol)
}

fn history_key(symbol: &str) -> String {
    format!("trades-{}", symbol)
}

/// 부분 익절 이후 남은 실제 수량.
fn remaining_qty(pos: &Position) -> Decimal {
    pos.qty * pos.remaining_position_pct / Decimal::ONE_HUNDRED
}

/// 스탑 이동의 원인.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMoveKind {
    /// 본전 이동
    BreakEven,
    /// 트레일링
    Trail,
}

impl std::fmt::Display for StopMoveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopMoveKind::BreakEven => write!(f, "BREAK_EVEN"),
            StopMoveKind::Trail => write!(f, "TRAIL"),
        }
    }
}

/// 봉 하나를 처리한 뒤 코디네이터가 실행해야 할 결정.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskAction {
    /// 스탑 가격 이동. 거래소의 SL 트리거 주문을 교체해야 합니다.
    MoveStop {
        kind: StopMoveKind,
        old_sl: Decimal,
        new_sl: Decimal,
    },
    /// 부분 익절. `close_qty`만큼 reduce-only 시장가 청산.
    PartialClose {
        close_qty: Decimal,
        price: Decimal,
        profit_pct: Decimal,
    },
    /// 전량 청산. 기록은 이미 이력에 추가되었고 포지션은 제거된 상태입니다.
    /// `close_qty`는 부분 익절을 반영한 잔여 수량입니다.
    FullClose {
        record: TradeRecord,
        close_qty: Decimal,
    },
}

/// 심볼 하나의 포지션 상태 기계.
///
/// 심볼 워커가 단독으로 소유하며, 같은 심볼의 봉은 항상 순서대로
/// 들어온다고 가정합니다. 변경이 생길 때마다 전체 스냅샷을 저장소에
/// 기록하므로 재기동 후 [`PositionManager::load`]로 이어서 복원됩니다.
#[derive(Debug)]
pub struct PositionManager {
    symbol: String,
    config: RiskConfig,
    store: Arc<dyn StateStore>,
    position: Option<Position>,
    history: Vec<TradeRecord>,
    persist_failures: u32,
}

impl PositionManager {
    /// 저장소에서 포지션과 거래 이력을 복원해 관리자를 만듭니다.
    pub async fn load(
        symbol: impl Into<String>,
        config: RiskConfig,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, RiskError> {
        let symbol = symbol.into();
        let position: Option<Position> = match store.load(&position_key(&symbol)).await? {
            Some(doc) => Some(serde_json::from_value(doc)?),
            None => None,
        };
        let history: Vec<TradeRecord> = match store.load(&history_key(&symbol)).await? {
            Some(doc) => serde_json::from_value(doc)?,
            None => Vec::new(),
        };
        info!(
            symbol = %symbol,
            has_position = position.is_some(),
            history_len = history.len(),
            "리스크 상태 복원"
        );
        Ok(Self {
            symbol,
            config,
            store,
            position,
            history,
            persist_failures: 0,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// 현재 보유 포지션.
    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    /// 청산 기록 (오래된 것부터, 최대 [`TRADE_HISTORY_CAP`]건).
    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    /// 진입 체결된 포지션을 등록합니다. 심볼당 최대 1개입니다.
    pub async fn register(&mut self, position: Position) -> Result<(), RiskError> {
        if self.position.is_some() {
            return Err(RiskError::PositionExists(self.symbol.clone()));
        }
        info!(
            symbol = %position.symbol,
            side = %position.side,
            entry_price = %position.entry_price,
            initial_sl = %position.initial_sl,
            qty = %position.qty,
            "포지션 등록"
        );
        self.position = Some(position);
        self.persist().await;
        Ok(())
    }

    /// 확정 봉 하나에 상태 기계를 적용합니다.
    ///
    /// 포지션이 없으면 아무 일도 하지 않습니다. 청산이 결정되면 기록을
    /// 이력에 추가하고 포지션을 제거한 뒤 [`RiskAction::FullClose`]를
    /// 돌려줍니다.
    pub async fn update(&mut self, bar: &Bar, snapshot: &IndicatorSnapshot) -> Vec<RiskAction> {
        let Some(mut pos) = self.position.take() else {
            return Vec::new();
        };

        let price = bar.close;
        let mut actions = Vec::new();

        pos.entry_bar_count += 1;
        let profit_pct = pos.unrealized_pnl_pct(price);
        if profit_pct > pos.highest_profit {
            pos.highest_profit = profit_pct;
        }

        // 1. 본전 이동: 한 번만. 스탑이 이미 진입가보다 유리하면 건드리지 않는다.
        if !pos.break_even_moved && profit_pct >= self.config.break_even_threshold {
            pos.break_even_moved = true;
            let tightens = match pos.side {
                Side::Long => pos.entry_price > pos.current_sl,
                Side::Short => pos.entry_price < pos.current_sl,
            };
            if tightens {
                let old_sl = pos.current_sl;
                pos.current_sl = pos.entry_price;
                info!(
                    symbol = %pos.symbol,
                    old_sl = %old_sl,
                    new_sl = %pos.current_sl,
                    profit_pct = %profit_pct,
                    "본전 이동"
                );
                actions.push(RiskAction::MoveStop {
                    kind: StopMoveKind::BreakEven,
                    old_sl,
                    new_sl: pos.current_sl,
                });
            }
        }

        // 2. 트레일링 갱신: 현재가에서 trail_step만큼 떨어진 후보가
        //    기존 스탑을 조일 때만 이동한다.
        if profit_pct >= self.config.trail_start {
            pos.trailing_active = true;
            let step = self.config.trail_step / Decimal::ONE_HUNDRED;
            let candidate = match pos.side {
                Side::Long => price * (Decimal::ONE - step),
                Side::Short => price * (Decimal::ONE + step),
            };
            let tightens = match pos.side {
                Side::Long => candidate > pos.current_sl,
                Side::Short => candidate < pos.current_sl,
            };
            if tightens {
                let old_sl = pos.current_sl;
                pos.current_sl = candidate;
                debug!(
                    symbol = %pos.symbol,
                    old_sl = %old_sl,
                    new_sl = %candidate,
                    profit_pct = %profit_pct,
                    "트레일링 스탑 이동"
                );
                actions.push(RiskAction::MoveStop {
                    kind: StopMoveKind::Trail,
                    old_sl,
                    new_sl: candidate,
                });
            }
        }

        // 3. 부분 익절: 한 번만. 발동하면 이 봉의 청산 검사는 여기서 끝.
        if !pos.partial_exit_done && profit_pct >= self.config.partial_exit_trigger {
            pos.partial_exit_done = true;
            pos.remaining_position_pct = Decimal::ONE_HUNDRED - self.config.partial_exit_pct;
            let close_qty = pos.qty * self.config.partial_exit_pct / Decimal::ONE_HUNDRED;
            info!(
                symbol = %pos.symbol,
                close_qty = %close_qty,
                price = %price,
                profit_pct = %profit_pct,
                remaining_pct = %pos.remaining_position_pct,
                "부분 익절"
            );
            actions.push(RiskAction::PartialClose {
                close_qty,
                price,
                profit_pct,
            });
            self.position = Some(pos);
            self.persist().await;
            return actions;
        }

        // 4. 트레일링 스탑 터치: 스탑 가격으로 전량 청산
        if pos.stop_hit(bar.low, bar.high) {
            let exit_price = pos.current_sl;
            let close_qty = remaining_qty(&pos);
            let record =
                self.finalize_close(pos, exit_price, bar.timestamp, ExitReason::TrailingStop);
            actions.push(RiskAction::FullClose { record, close_qty });
            self.persist().await;
            return actions;
        }

        // 5. EMA 추세 반전 청산
        if self.trend_reversal_triggered(&pos, snapshot, profit_pct) {
            let close_qty = remaining_qty(&pos);
            let record = self.finalize_close(pos, price, bar.timestamp, ExitReason::TrendReversal);
            actions.push(RiskAction::FullClose { record, close_qty });
            self.persist().await;
            return actions;
        }

        // 6. 거래량 급증 + 반대 HA 캔들 청산
        if self.volume_exit_triggered(&pos, snapshot, profit_pct) {
            let close_qty = remaining_qty(&pos);
            let record = self.finalize_close(pos, price, bar.timestamp, ExitReason::VolumeExit);
            actions.push(RiskAction::FullClose { record, close_qty });
            self.persist().await;
            return actions;
        }

        self.position = Some(pos);
        self.persist().await;
        actions
    }

    /// 외부 요인(거래소 TP/SL 체결, 수동 청산 등)으로 끝난 포지션을 마감합니다.
    pub async fn close(
        &mut self,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<TradeRecord> {
        let pos = self.position.take()?;
        let record = self.finalize_close(pos, exit_price, exit_time, reason);
        self.persist().await;
        Some(record)
    }

    /// 연속 손실 차단 판정.
    pub fn should_block_trades(&self, now: DateTime<Utc>) -> TradeBlockState {
        blocker::should_block_trades(
            &self.history,
            self.config.max_consecutive_losses,
            self.config.cooldown_minutes,
            now,
        )
    }

    /// 저장 실패가 누적되어 상태를 신뢰할 수 없는 상황인지.
    ///
    /// 참이면 코디네이터는 신규 진입을 멈춰야 합니다.
    pub fn persistence_degraded(&self) -> bool {
        self.persist_failures >= PERSIST_FAILURE_LIMIT
    }

    fn trend_reversal_triggered(
        &self,
        pos: &Position,
        snapshot: &IndicatorSnapshot,
        profit_pct: Decimal,
    ) -> bool {
        if !self.config.use_trend_reversal_exit
            || pos.entry_bar_count < self.config.trend_reversal_min_bars
        {
            return false;
        }
        let min_profit = self.config.trend_reversal_min_profit_pct;
        if min_profit > Decimal::ZERO && profit_pct < min_profit {
            return false;
        }
        match (snapshot.ema_fast, snapshot.ema_slow) {
            (Some(fast), Some(slow)) => match pos.side {
                Side::Long => fast < slow,
                Side::Short => fast > slow,
            },
            _ => false,
        }
    }

    fn volume_exit_triggered(
        &self,
        pos: &Position,
        snapshot: &IndicatorSnapshot,
        profit_pct: Decimal,
    ) -> bool {
        if !self.config.use_volume_exit {
            return false;
        }
        if self.config.volume_exit_min_bars > 0
            && pos.entry_bar_count < self.config.volume_exit_min_bars
        {
            return false;
        }
        let min_profit = self.config.volume_exit_min_profit_pct;
        if min_profit > Decimal::ZERO && profit_pct < min_profit {
            return false;
        }
        let Some(volume_ratio) = snapshot.volume_ratio else {
            return false;
        };
        if volume_ratio < self.config.volume_exit_threshold {
            return false;
        }
        match pos.side {
            Side::Long => snapshot.ha.is_bearish(),
            Side::Short => snapshot.ha.is_bullish(),
        }
    }

    /// 청산 기록을 만들고 이력에 추가합니다. 포지션은 호출자가 이미 꺼낸 상태.
    fn finalize_close(
        &mut self,
        pos: Position,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
    ) -> TradeRecord {
        let record = TradeRecord {
            symbol: pos.symbol.clone(),
            side: pos.side,
            entry_price: pos.entry_price,
            exit_price,
            pnl_pct: calculate_pnl_pct(pos.side, pos.entry_price, exit_price),
            entry_time: pos.entry_time,
            exit_time,
            reason,
        };
        info!(
            symbol = %record.symbol,
            reason = %reason,
            exit_price = %exit_price,
            pnl_pct = %record.pnl_pct,
            bars_held = pos.entry_bar_count,
            "포지션 청산"
        );
        self.push_history(record.clone());
        record
    }

    fn push_history(&mut self, record: TradeRecord) {
        self.history.push(record);
        if self.history.len() > TRADE_HISTORY_CAP {
            let excess = self.history.len() - TRADE_HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    /// 현재 상태 전체 스냅샷을 저장합니다.
    ///
    /// 실패해도 메모리 상태로 계속 진행하되, 다음 변경에서 전체 스냅샷을
    /// 다시 쓰므로 저장은 자연히 재시도됩니다. 연속 실패는
    /// [`persistence_degraded`](Self::persistence_degraded)로 드러납니다.
    async fn persist(&mut self) {
        match self.try_persist().await {
            Ok(()) => {
                self.persist_failures = 0;
            }
            Err(e) => {
                self.persist_failures += 1;
                error!(
                    symbol = %self.symbol,
                    failures = self.persist_failures,
                    error = %e,
                    "리스크 상태 저장 실패"
                );
            }
        }
    }

    async fn try_persist(&self) -> Result<(), StoreError> {
        match &self.position {
            Some(pos) => {
                let doc = serde_json::to_value(pos)?;
                self.store.save(&position_key(&self.symbol), doc).await?;
            }
            None => {
                self.store.remove(&position_key(&self.symbol)).await?;
            }
        }
        let doc = serde_json::to_value(&self.history)?;
        self.store.save(&history_key(&self.symbol), doc).await
    }
}
