//! Heikin-Ashi 캔들 변환.

use rust_decimal::Decimal;
use trail_core::Bar;

/// Heikin-Ashi 캔들 하나.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaBar {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl HaBar {
    /// 양봉 여부 (haClose > haOpen).
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 음봉 여부 (haClose < haOpen).
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// 중간 가격 (haHigh + haLow) / 2.
    pub fn hl2(&self) -> Decimal {
        (self.high + self.low) / Decimal::TWO
    }
}

/// Heikin-Ashi 증분 변환기.
///
/// ```text
/// haClose = (O + H + L + C) / 4
/// haOpen  = (prevHaOpen + prevHaClose) / 2   (첫 봉: (open + close) / 2)
/// haHigh  = max(high, haOpen, haClose)
/// haLow   = min(low,  haOpen, haClose)
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeikinAshi {
    prev: Option<HaBar>,
}

impl HeikinAshi {
    /// 새 변환기 생성.
    pub fn new() -> Self {
        Self { prev: None }
    }

    /// 마지막 HA 캔들.
    pub fn last(&self) -> Option<HaBar> {
        self.prev
    }

    /// 원시 봉을 HA 캔들로 변환.
    pub fn update(&mut self, bar: &Bar) -> HaBar {
        let ha_close =
            (bar.open + bar.high + bar.low + bar.close) / Decimal::from(4);
        let ha_open = match self.prev {
            Some(prev) => (prev.open + prev.close) / Decimal::TWO,
            None => (bar.open + bar.close) / Decimal::TWO,
        };
        let ha = HaBar {
            open: ha_open,
            high: bar.high.max(ha_open).max(ha_close),
            low: bar.low.min(ha_open).min(ha_close),
            close: ha_close,
        };
        self.prev = Some(ha);
        ha
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar::new("ETHUSDT", Utc::now(), open, high, low, close, dec!(1000))
    }

    #[test]
    fn test_first_bar_seeds_open_from_raw_open_close() {
        let mut ha = HeikinAshi::new();
        let c = ha.update(&bar(dec!(100), dec!(110), dec!(90), dec!(104)));
        assert_eq!(c.open, dec!(102)); // (100 + 104) / 2
        assert_eq!(c.close, dec!(101)); // (100+110+90+104) / 4
        assert_eq!(c.high, dec!(110));
        assert_eq!(c.low, dec!(90));
    }

    #[test]
    fn test_subsequent_open_uses_previous_ha_candle() {
        let mut ha = HeikinAshi::new();
        ha.update(&bar(dec!(100), dec!(110), dec!(90), dec!(104)));
        // prev: haOpen=102, haClose=101 → 다음 haOpen = 101.5
        let c = ha.update(&bar(dec!(104), dec!(108), dec!(102), dec!(106)));
        assert_eq!(c.open, dec!(101.5));
        assert_eq!(c.close, dec!(105)); // (104+108+102+106)/4
        assert_eq!(c.high, dec!(108));
        assert_eq!(c.low, dec!(101.5)); // min(102, 101.5, 105)
    }

    #[test]
    fn test_candle_direction_helpers() {
        let up = HaBar {
            open: dec!(100),
            high: dec!(105),
            low: dec!(99),
            close: dec!(104),
        };
        assert!(up.is_bullish());
        assert!(!up.is_bearish());
    }
}
