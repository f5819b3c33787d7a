//! 확정 봉(OHLCV) 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 확정된 OHLCV 봉.
///
/// 데이터 피드가 봉 마감 후에만 생성하며, 불변입니다.
/// 같은 심볼의 봉은 `timestamp` 오름차순으로, 중복 없이 도착한다고 가정합니다.
/// 진행 중(미확정) 봉은 이 타입으로 표현하지 않습니다 — 신호 계산에
/// 미확정 봉이 섞이면 look-ahead 편향이 생기기 때문입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// 심볼 (예: "ETHUSDT")
    pub symbol: String,
    /// 봉 시작 시각 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: Decimal,
}

impl Bar {
    /// 새 봉 생성.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 중간 가격 (high + low) / 2.
    ///
    /// SuperTrend 밴드 계산의 기준 가격입니다.
    pub fn hl2(&self) -> Decimal {
        (self.high + self.low) / Decimal::TWO
    }

    /// 양봉 여부 (종가 > 시가).
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}
