//! 포지션, 청산 사유, 거래 기록.

use super::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 트레이드 블로커가 참조하는 거래 기록 보관 한도.
pub const TRADE_HISTORY_CAP: usize = 100;

/// 청산 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// 트레일링 스탑(또는 본전 이동된 스탑) 도달
    TrailingStop,
    /// EMA 추세 반전
    TrendReversal,
    /// 거래량 급증 + 반대 방향 캔들
    VolumeExit,
    /// 부분 익절
    PartialExit,
    /// 수동 청산 (CLI close-all 등)
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TrailingStop => "TRAILING_STOP",
            ExitReason::TrendReversal => "TREND_REVERSAL",
            ExitReason::VolumeExit => "VOLUME_EXIT",
            ExitReason::PartialExit => "PARTIAL_EXIT",
            ExitReason::Manual => "MANUAL",
        };
        write!(f, "{}", s)
    }
}

/// 보유 포지션.
///
/// 심볼당 최대 1개만 존재하며, 생성은 진입 주문 성공 시,
/// 변경은 PositionManager에서만, 제거는 전량 청산 시 일어납니다.
///
/// 모든 `*_pct` 필드는 퍼센트 단위입니다 (0.3 == 0.3%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 심볼
    pub symbol: String,
    /// 방향
    pub side: Side,
    /// 진입가
    pub entry_price: Decimal,
    /// 수량 (계약/코인 단위)
    pub qty: Decimal,
    /// 최초 스탑 가격
    pub initial_sl: Decimal,
    /// 현재 스탑 가격 (본전 이동/트레일링으로 갱신)
    pub current_sl: Decimal,
    /// 포지션 식별자 (논리적 트레이드 id와 동일)
    pub position_id: Uuid,
    /// 진입 시각
    pub entry_time: DateTime<Utc>,
    /// 진입 후 경과 확정 봉 수
    pub entry_bar_count: u32,
    /// 본전 이동 완료 여부 (정확히 1회)
    pub break_even_moved: bool,
    /// 트레일링 스탑 활성화 여부
    pub trailing_active: bool,
    /// 부분 익절 완료 여부 (정확히 1회)
    pub partial_exit_done: bool,
    /// 남은 포지션 비율 (%, 부분 익절 후 100 미만)
    pub remaining_position_pct: Decimal,
    /// 보유 중 최고 수익률 (%)
    pub highest_profit: Decimal,
}

impl Position {
    /// 진입 체결로 새 포지션 생성.
    pub fn open(
        symbol: impl Into<String>,
        side: Side,
        entry_price: Decimal,
        qty: Decimal,
        initial_sl: Decimal,
        position_id: Uuid,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            qty,
            initial_sl,
            current_sl: initial_sl,
            position_id,
            entry_time,
            entry_bar_count: 0,
            break_even_moved: false,
            trailing_active: false,
            partial_exit_done: false,
            remaining_position_pct: Decimal::ONE_HUNDRED,
            highest_profit: Decimal::ZERO,
        }
    }

    /// 주어진 가격 기준 미실현 수익률 (%).
    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Decimal {
        calculate_pnl_pct(self.side, self.entry_price, price)
    }

    /// 봉 저가/고가가 현재 스탑을 포지션 반대 방향으로 터치했는지.
    ///
    /// LONG은 저가 ≤ 스탑, SHORT는 고가 ≥ 스탑일 때 참입니다.
    pub fn stop_hit(&self, bar_low: Decimal, bar_high: Decimal) -> bool {
        match self.side {
            Side::Long => bar_low <= self.current_sl,
            Side::Short => bar_high >= self.current_sl,
        }
    }
}

/// 체결 완료된 거래 기록. 청산 시 추가되며 이후 불변입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 심볼
    pub symbol: String,
    /// 방향
    pub side: Side,
    /// 진입가
    pub entry_price: Decimal,
    /// 청산가
    pub exit_price: Decimal,
    /// 실현 수익률 (%)
    pub pnl_pct: Decimal,
    /// 진입 시각
    pub entry_time: DateTime<Utc>,
    /// 청산 시각
    pub exit_time: DateTime<Utc>,
    /// 청산 사유
    pub reason: ExitReason,
}

impl TradeRecord {
    /// 손실 거래 여부.
    pub fn is_loss(&self) -> bool {
        self.pnl_pct < Decimal::ZERO
    }
}

/// 방향을 반영한 수익률 계산 (%).
///
/// LONG: `(price - entry) / entry * 100`, SHORT: 부호 반전.
pub fn calculate_pnl_pct(side: Side, entry_price: Decimal, price: Decimal) -> Decimal {
    if entry_price.is_zero() {
        return Decimal::ZERO;
    }
    side.sign() * (price - entry_price) / entry_price * Decimal::ONE_HUNDRED
}
