//! 진입 신호와 포지션 방향.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 포지션 방향.
///
/// 선물 기준 LONG/SHORT 두 방향만 존재합니다.
/// "신호 없음(FLAT)"은 `Option<Side>` 혹은 `Option<EntrySignal>`의
/// `None`으로 표현합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// 매수 포지션
    Long,
    /// 매도 포지션
    Short,
}

impl Side {
    /// 반대 방향 반환.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// 방향 부호 (+1 / −1).
    ///
    /// `pnl = sign * (price - entry)` 형태의 계산에 사용합니다.
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// 진입 신호.
///
/// SignalEvaluator가 확정 봉 기준으로 생성합니다. 평가 결과가 FLAT이면
/// 신호 자체가 만들어지지 않습니다 (`Option::None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    /// 심볼
    pub symbol: String,
    /// 진입 방향
    pub side: Side,
    /// 신호 확신도 (0.0 ~ 1.0)
    pub confidence: f64,
    /// 신호 기준 가격 (확정 봉 종가)
    pub price: Decimal,
    /// 신호를 만든 확정 봉의 시작 시각
    pub bar_time: DateTime<Utc>,
}

impl EntrySignal {
    /// 새 진입 신호 생성. 확신도는 0.0~1.0으로 클램프됩니다.
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        confidence: f64,
        price: Decimal,
        bar_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            confidence: confidence.clamp(0.0, 1.0),
            price,
            bar_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite_and_sign() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
        assert_eq!(Side::Long.sign(), Decimal::ONE);
        assert_eq!(Side::Short.sign(), Decimal::NEGATIVE_ONE);
    }

    #[test]
    fn test_side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Long).unwrap(), "\"LONG\"");
        assert_eq!(serde_json::to_string(&Side::Short).unwrap(), "\"SHORT\"");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let s = EntrySignal::new("ETHUSDT", Side::Long, 1.7, dec!(2000), Utc::now());
        assert_eq!(s.confidence, 1.0);

        let s = EntrySignal::new("ETHUSDT", Side::Short, -0.3, dec!(2000), Utc::now());
        assert_eq!(s.confidence, 0.0);
    }
}
