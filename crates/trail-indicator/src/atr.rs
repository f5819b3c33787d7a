//! Wilder 평활 ATR 계산기.

use rust_decimal::Decimal;

/// ATR (Average True Range) 증분 계산기.
///
/// True Range는 `max(high − low, |high − prevClose|, |low − prevClose|)`,
/// 첫 봉은 `high − low`입니다. 처음 `period`개 TR의 단순 평균으로 시드한 뒤
/// Wilder 평활을 적용합니다:
///
/// ```text
/// atr = (prevATR * (period − 1) + tr) / period
/// ```
///
/// `period`번째 봉 전까지 `update`는 `None`을 돌려줍니다.
#[derive(Debug, Clone)]
pub struct Atr {
    period: u32,
    prev_close: Option<Decimal>,
    /// 시드 구간 TR 누적 합
    tr_sum: Decimal,
    /// 소화한 TR 개수
    count: u32,
    value: Option<Decimal>,
}

impl Atr {
    /// 새 계산기 생성. `period`는 1 이상이어야 합니다.
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            tr_sum: Decimal::ZERO,
            count: 0,
            value: None,
        }
    }

    /// 설정된 기간.
    pub fn period(&self) -> u32 {
        self.period
    }

    /// 현재 ATR 값. 워밍업 전에는 `None`.
    pub fn value(&self) -> Option<Decimal> {
        self.value
    }

    /// 새 봉의 고가/저가/종가를 반영하고 갱신된 ATR을 반환.
    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let tr = match self.prev_close {
            Some(prev_close) => (high - low)
                .max((high - prev_close).abs())
                .max((low - prev_close).abs()),
            None => high - low,
        };
        self.prev_close = Some(close);
        self.count += 1;

        let period = Decimal::from(self.period);
        match self.value {
            Some(prev_atr) => {
                let atr = (prev_atr * (period - Decimal::ONE) + tr) / period;
                self.value = Some(atr);
            }
            None => {
                self.tr_sum += tr;
                if self.count >= self.period {
                    self.value = Some(self.tr_sum / period);
                }
            }
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_returns_none_until_period_bars() {
        let mut atr = Atr::new(3);
        assert_eq!(atr.update(dec!(10), dec!(9), dec!(9.5)), None);
        assert_eq!(atr.update(dec!(10.5), dec!(9.5), dec!(10)), None);
        assert!(atr.update(dec!(11), dec!(10), dec!(10.5)).is_some());
    }

    #[test]
    fn test_seed_is_simple_mean_of_true_ranges() {
        let mut atr = Atr::new(3);
        // TR0 = 10 - 9 = 1 (이전 종가 없음)
        atr.update(dec!(10), dec!(9), dec!(9.5));
        // TR1 = max(1, |10.5-9.5|, |9.5-9.5|) = 1
        atr.update(dec!(10.5), dec!(9.5), dec!(10));
        // TR2 = max(1, |11-10|, |10-10|) = 1
        let seeded = atr.update(dec!(11), dec!(10), dec!(10.5)).unwrap();
        assert_eq!(seeded, dec!(1));
    }

    #[test]
    fn test_wilder_smoothing_after_seed() {
        let mut atr = Atr::new(2);
        atr.update(dec!(10), dec!(9), dec!(9.5)); // TR = 1
        atr.update(dec!(10), dec!(9), dec!(9.5)); // TR = max(1, 0.5, 0.5) = 1
        let seeded = atr.value().unwrap();
        assert_eq!(seeded, dec!(1));

        // TR = max(12-10, |12-9.5|, |10-9.5|) = 2.5
        // atr = (1 * 1 + 2.5) / 2 = 1.75
        let next = atr.update(dec!(12), dec!(10), dec!(11)).unwrap();
        assert_eq!(next, dec!(1.75));
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let mut atr = Atr::new(1);
        atr.update(dec!(100), dec!(99), dec!(100));
        // 갭 상승: TR = max(0.5, |105-100|, |104.5-100|) = 5
        let v = atr.update(dec!(105), dec!(104.5), dec!(105)).unwrap();
        assert_eq!(v, dec!(5));
    }
}
