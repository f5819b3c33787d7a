//! 지수이동평균 (EMA).

use rust_decimal::Decimal;

/// EMA 증분 계산기.
///
/// `alpha = 2 / (period + 1)`, 첫 샘플로 시드합니다
/// (pandas `ewm(span, adjust=False)` / TradingView `ema()`와 동일).
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: Decimal,
    value: Option<Decimal>,
    period: u32,
}

impl Ema {
    /// 새 계산기 생성. `period`는 1 이상이어야 합니다.
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        let alpha = Decimal::TWO / Decimal::from(period + 1);
        Self {
            alpha,
            value: None,
            period,
        }
    }

    /// 설정된 기간.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// 현재 값. 첫 샘플 전에는 `None`.
    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    /// 새 샘플을 반영하고 갱신된 EMA를 반환.
    pub fn update(&mut self, sample: Decimal) -> Decimal {
        let next = match self.value {
            Some(prev) => prev + self.alpha * (sample - prev),
            None => sample,
        };
        self.value = Some(next);
        next
    }
}
