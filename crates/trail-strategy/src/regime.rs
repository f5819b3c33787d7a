//! 변동성/추세 레짐 감지와 레짐별 진입 문턱.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use trail_indicator::IndicatorSnapshot;

/// 변동성 레짐.
///
/// ATR%를 최근 분포의 33/67 분위수와 비교해 분류합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityRegime::Low => write!(f, "LOW"),
            VolatilityRegime::Medium => write!(f, "MEDIUM"),
            VolatilityRegime::High => write!(f, "HIGH"),
        }
    }
}

/// 추세 레짐.
///
/// EMA50/EMA200 관계와 EMA50 기울기로 분류합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendRegime {
    Uptrend,
    Downtrend,
    Range,
}

impl fmt::Display for TrendRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendRegime::Uptrend => write!(f, "UPTREND"),
            TrendRegime::Downtrend => write!(f, "DOWNTREND"),
            TrendRegime::Range => write!(f, "RANGE"),
        }
    }
}

/// 변동성 × 추세 레짐 조합.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketRegime {
    pub volatility: VolatilityRegime,
    pub trend: TrendRegime,
}

impl MarketRegime {
    /// 레짐별 (롱 문턱, 숏 문턱).
    ///
    /// 순방향 진입은 문턱을 낮추고, 역방향 진입과 고변동성 구간은 높입니다.
    pub fn thresholds(&self) -> (f64, f64) {
        use TrendRegime::*;
        use VolatilityRegime::*;
        match (self.volatility, self.trend) {
            (Low, Uptrend) => (0.55, 0.70),
            (Low, Downtrend) => (0.70, 0.55),
            (Low, Range) => (0.60, 0.60),
            (Medium, Uptrend) => (0.60, 0.70),
            (Medium, Downtrend) => (0.70, 0.60),
            (Medium, Range) => (0.65, 0.65),
            (High, Uptrend) => (0.65, 0.75),
            (High, Downtrend) => (0.75, 0.65),
            (High, Range) => (0.70, 0.70),
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vol={}, Trend={}", self.volatility, self.trend)
    }
}

/// 레짐 감지기.
///
/// 심볼 워커가 봉마다 `update`를 호출해 ATR% 분포를 누적합니다.
/// `lookback` 봉을 채우기 전에는 `None`을 돌려주며, 그동안 평가기는
/// 정적 문턱을 사용합니다.
#[derive(Debug)]
pub struct RegimeDetector {
    lookback: usize,
    atr_pct_history: VecDeque<Decimal>,
}

impl RegimeDetector {
    /// 새 감지기 생성. `lookback`은 1 이상이어야 합니다.
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
            atr_pct_history: VecDeque::new(),
        }
    }

    /// 새 스냅샷을 반영하고 현재 레짐을 돌려준다.
    pub fn update(&mut self, snapshot: &IndicatorSnapshot) -> Option<MarketRegime> {
        if let Some(atr_pct) = snapshot.atr_pct {
            self.atr_pct_history.push_back(atr_pct);
            while self.atr_pct_history.len() > self.lookback {
                self.atr_pct_history.pop_front();
            }
        }

        if (snapshot.bars_seen as usize) < self.lookback {
            return None;
        }

        let atr_pct = snapshot.atr_pct?;
        let volatility = self.classify_volatility(atr_pct)?;
        let trend = classify_trend(snapshot.ema_fast, snapshot.ema_slow, snapshot.ema_fast_slope);
        Some(MarketRegime { volatility, trend })
    }

    /// 현재 ATR%를 이력 분포의 33/67 분위수와 비교.
    fn classify_volatility(&self, atr_pct: Decimal) -> Option<VolatilityRegime> {
        if self.atr_pct_history.is_empty() {
            return None;
        }
        let mut sorted: Vec<Decimal> = self.atr_pct_history.iter().copied().collect();
        sorted.sort();

        let low_threshold = percentile(&sorted, Decimal::new(33, 2));
        let high_threshold = percentile(&sorted, Decimal::new(67, 2));

        let regime = if atr_pct < low_threshold {
            VolatilityRegime::Low
        } else if atr_pct > high_threshold {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Medium
        };
        Some(regime)
    }
}

/// EMA 관계와 기울기로 추세를 분류.
///
/// 상승: fast > slow 이고 기울기 양수. 하락: fast ≤ slow 이고 기울기 음수.
/// 그 외(기울기 미확정 포함)는 횡보.
fn classify_trend(
    ema_fast: Option<Decimal>,
    ema_slow: Option<Decimal>,
    slope: Option<Decimal>,
) -> TrendRegime {
    let (Some(fast), Some(slow), Some(slope)) = (ema_fast, ema_slow, slope) else {
        return TrendRegime::Range;
    };

    if fast > slow && slope > Decimal::ZERO {
        TrendRegime::Uptrend
    } else if fast <= slow && slope < Decimal::ZERO {
        TrendRegime::Downtrend
    } else {
        TrendRegime::Range
    }
}

/// 정렬된 표본의 선형 보간 분위수.
fn percentile(sorted: &[Decimal], q: Decimal) -> Decimal {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * Decimal::from(n - 1);
    let idx = pos.floor();
    let frac = pos - idx;
    let lo = idx.to_usize().unwrap_or(0).min(n - 1);
    let hi = (lo + 1).min(n - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use trail_indicator::HaBar;

    fn snapshot(atr_pct: Decimal, bars_seen: u32) -> IndicatorSnapshot {
        let price = dec!(100);
        IndicatorSnapshot {
            bar_time: Utc::now(),
            close: price,
            src: price,
            atr: Some(atr_pct),
            atr_pct: Some(atr_pct),
            trailing_stop: Some(price),
            direction: trail_indicator::Direction::Flat,
            crossed_above: false,
            crossed_below: false,
            supertrend: Some(price),
            ha: HaBar {
                open: price,
                high: price,
                low: price,
                close: price,
            },
            ema_fast: Some(price),
            ema_slow: Some(price),
            ema_fast_slope: Some(Decimal::ZERO),
            volume_ratio: Some(Decimal::ONE),
            bars_seen,
            warm: true,
        }
    }

    #[test]
    fn test_threshold_table_matches_regime_matrix() {
        let cases = [
            (VolatilityRegime::Low, TrendRegime::Uptrend, 0.55, 0.70),
            (VolatilityRegime::Low, TrendRegime::Downtrend, 0.70, 0.55),
            (VolatilityRegime::Low, TrendRegime::Range, 0.60, 0.60),
            (VolatilityRegime::Medium, TrendRegime::Uptrend, 0.60, 0.70),
            (VolatilityRegime::Medium, TrendRegime::Downtrend, 0.70, 0.60),
            (VolatilityRegime::Medium, TrendRegime::Range, 0.65, 0.65),
            (VolatilityRegime::High, TrendRegime::Uptrend, 0.65, 0.75),
            (VolatilityRegime::High, TrendRegime::Downtrend, 0.75, 0.65),
            (VolatilityRegime::High, TrendRegime::Range, 0.70, 0.70),
        ];
        for (vol, trend, long, short) in cases {
            let regime = MarketRegime {
                volatility: vol,
                trend,
            };
            assert_eq!(regime.thresholds(), (long, short), "{regime}");
        }
    }

    #[test]
    fn test_trend_classification() {
        let up = classify_trend(Some(dec!(110)), Some(dec!(100)), Some(dec!(1)));
        assert_eq!(up, TrendRegime::Uptrend);

        let down = classify_trend(Some(dec!(90)), Some(dec!(100)), Some(dec!(-1)));
        assert_eq!(down, TrendRegime::Downtrend);

        // fast > slow 인데 기울기 음수 → 횡보
        let mixed = classify_trend(Some(dec!(110)), Some(dec!(100)), Some(dec!(-1)));
        assert_eq!(mixed, TrendRegime::Range);

        // 기울기 미확정 → 횡보
        let unknown = classify_trend(Some(dec!(110)), Some(dec!(100)), None);
        assert_eq!(unknown, TrendRegime::Range);
    }

    #[test]
    fn test_detector_returns_none_until_lookback() {
        let mut detector = RegimeDetector::new(5);
        for i in 1..5u32 {
            assert_eq!(detector.update(&snapshot(dec!(1), i)), None);
        }
        assert!(detector.update(&snapshot(dec!(1), 5)).is_some());
    }

    #[test]
    fn test_constant_distribution_is_medium() {
        let mut detector = RegimeDetector::new(4);
        let mut regime = None;
        for i in 1..=4u32 {
            regime = detector.update(&snapshot(dec!(1), i));
        }
        // 분포가 전부 같으면 분위수와 현재값이 일치해 MEDIUM
        assert_eq!(
            regime.map(|r| r.volatility),
            Some(VolatilityRegime::Medium)
        );
    }

    #[test]
    fn test_volatility_spike_is_high() {
        let mut detector = RegimeDetector::new(4);
        detector.update(&snapshot(dec!(1), 1));
        detector.update(&snapshot(dec!(1), 2));
        detector.update(&snapshot(dec!(1), 3));
        let regime = detector.update(&snapshot(dec!(5), 4));
        assert_eq!(regime.map(|r| r.volatility), Some(VolatilityRegime::High));
    }

    #[test]
    fn test_volatility_collapse_is_low() {
        let mut detector = RegimeDetector::new(4);
        detector.update(&snapshot(dec!(5), 1));
        detector.update(&snapshot(dec!(5), 2));
        detector.update(&snapshot(dec!(5), 3));
        let regime = detector.update(&snapshot(dec!(1), 4));
        assert_eq!(regime.map(|r| r.volatility), Some(VolatilityRegime::Low));
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let sorted = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        // pos = 0.33 * 3 = 0.99 → 1 + (2-1)*0.99 = 1.99
        assert_eq!(percentile(&sorted, dec!(0.33)), dec!(1.99));
        // pos = 0.67 * 3 = 2.01 → 3 + (4-3)*0.01 = 3.01
        assert_eq!(percentile(&sorted, dec!(0.67)), dec!(3.01));
        assert_eq!(percentile(&[dec!(7)], dec!(0.5)), dec!(7));
    }
}
