//! 심볼별 지표 상태를 묶는 엔진.

use crate::atr::Atr;
use crate::ema::Ema;
use crate::heikin_ashi::{HaBar, HeikinAshi};
use crate::supertrend::SuperTrend;
use crate::trailing_stop::{AtrTrailingStop, Direction};
use crate::volume::VolumeRatio;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::VecDeque;
use trail_core::Bar;

// ==================== 설정 ====================

/// 지표 파라미터.
///
/// TOML 심볼 설정에서 역직렬화되며, 생략한 필드는 기본값을 씁니다.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    /// ATR 기간
    #[serde(default = "default_atr_period")]
    pub atr_period: u32,
    /// 트레일링 스탑 민감도 (nLoss = key_value × ATR)
    #[serde(default = "default_key_value")]
    pub key_value: Decimal,
    /// SuperTrend 밴드 배수
    #[serde(default = "default_supertrend_factor")]
    pub supertrend_factor: Decimal,
    /// 빠른 EMA 기간 (추세 판정)
    #[serde(default = "default_ema_fast_period")]
    pub ema_fast_period: u32,
    /// 느린 EMA 기간 (추세 판정)
    #[serde(default = "default_ema_slow_period")]
    pub ema_slow_period: u32,
    /// 거래량 이동평균 창
    #[serde(default = "default_volume_window")]
    pub volume_window: usize,
    /// 빠른 EMA 기울기 측정 창 (봉 수)
    #[serde(default = "default_slope_window")]
    pub slope_window: usize,
    /// Heikin-Ashi를 신호 가격으로 사용할지
    #[serde(default)]
    pub use_heikin_ashi: bool,
}

fn default_atr_period() -> u32 {
    10
}

fn default_key_value() -> Decimal {
    Decimal::from(3)
}

fn default_supertrend_factor() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

fn default_ema_fast_period() -> u32 {
    50
}

fn default_ema_slow_period() -> u32 {
    200
}

fn default_volume_window() -> usize {
    20
}

fn default_slope_window() -> usize {
    5
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            atr_period: default_atr_period(),
            key_value: default_key_value(),
            supertrend_factor: default_supertrend_factor(),
            ema_fast_period: default_ema_fast_period(),
            ema_slow_period: default_ema_slow_period(),
            volume_window: default_volume_window(),
            slope_window: default_slope_window(),
            use_heikin_ashi: false,
        }
    }
}

// ==================== 스냅샷 ====================

/// 확정 봉 하나를 반영한 뒤의 지표 단면.
///
/// SignalEvaluator와 PositionManager가 읽는 유일한 지표 출력입니다.
/// 워밍업이 끝나지 않은 지표는 `None`입니다.
#[derive(Debug, Clone)]
pub struct IndicatorSnapshot {
    /// 봉 시작 시각
    pub bar_time: DateTime<Utc>,
    /// 원시 종가
    pub close: Decimal,
    /// 신호 기준 가격 (HA 모드면 haClose, 아니면 종가)
    pub src: Decimal,
    /// Wilder ATR
    pub atr: Option<Decimal>,
    /// ATR을 가격 대비 %로 환산한 값 (변동성 레짐용)
    pub atr_pct: Option<Decimal>,
    /// ATR 트레일링 스탑
    pub trailing_stop: Option<Decimal>,
    /// 트레일링 스탑 기준 추세 방향
    pub direction: Direction,
    /// 이번 봉에서 src가 스탑을 상향 돌파했는지
    pub crossed_above: bool,
    /// 이번 봉에서 src가 스탑을 하향 돌파했는지
    pub crossed_below: bool,
    /// SuperTrend 라인
    pub supertrend: Option<Decimal>,
    /// 이번 봉의 Heikin-Ashi 캔들
    pub ha: HaBar,
    /// 빠른 EMA (원시 종가 기준)
    pub ema_fast: Option<Decimal>,
    /// 느린 EMA (원시 종가 기준)
    pub ema_slow: Option<Decimal>,
    /// 빠른 EMA의 slope_window 봉 전 대비 변화량
    pub ema_fast_slope: Option<Decimal>,
    /// 거래량 / 이동평균 비율
    pub volume_ratio: Option<Decimal>,
    /// 소화한 확정 봉 수
    pub bars_seen: u32,
    /// 신호 생성에 필요한 최소 봉 수(max(atr_period, 2))를 넘었는지
    pub warm: bool,
}

// ==================== 엔진 ====================

/// 심볼 하나의 지표 상태 전체.
///
/// 소유권은 해당 심볼의 워커에 있으며, 봉당 정확히 한 번 `step`이
/// 호출됩니다. 상태는 영속화하지 않습니다 — 재시작 시 백필 봉을
/// 순서대로 다시 먹여 워밍업합니다.
#[derive(Debug)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
    atr: Atr,
    trailing: AtrTrailingStop,
    supertrend: SuperTrend,
    heikin: HeikinAshi,
    ema_fast: Ema,
    ema_slow: Ema,
    volume: VolumeRatio,
    /// 기울기 계산용 빠른 EMA 이력 (slope_window + 1개 유지)
    ema_fast_history: VecDeque<Decimal>,
    bars_seen: u32,
}

impl IndicatorEngine {
    /// 새 엔진 생성.
    pub fn new(config: IndicatorConfig) -> Self {
        let atr = Atr::new(config.atr_period);
        let ema_fast = Ema::new(config.ema_fast_period);
        let ema_slow = Ema::new(config.ema_slow_period);
        let volume = VolumeRatio::new(config.volume_window);
        Self {
            config,
            atr,
            trailing: AtrTrailingStop::new(),
            supertrend: SuperTrend::new(),
            heikin: HeikinAshi::new(),
            ema_fast,
            ema_slow,
            volume,
            ema_fast_history: VecDeque::new(),
            bars_seen: 0,
        }
    }

    /// 설정 참조.
    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// 소화한 확정 봉 수.
    pub fn bars_seen(&self) -> u32 {
        self.bars_seen
    }

    /// 확정 봉 하나를 반영하고 스냅샷을 돌려준다.
    ///
    /// 호출자는 봉이 timestamp 오름차순, 중복 없이 들어오는 것을 보장해야
    /// 합니다. 진행 중인 봉을 넣으면 look-ahead가 생기므로 금지입니다.
    pub fn step(&mut self, bar: &Bar) -> IndicatorSnapshot {
        let ha = self.heikin.update(bar);

        // HA 모드면 ATR/트레일링/SuperTrend 모두 HA 가격으로 계산
        let (high, low, close, src, hl2) = if self.config.use_heikin_ashi {
            (ha.high, ha.low, ha.close, ha.close, ha.hl2())
        } else {
            (bar.high, bar.low, bar.close, bar.close, bar.hl2())
        };

        let atr = self.atr.update(high, low, close);

        let mut trailing_stop = None;
        let mut crossed_above = false;
        let mut crossed_below = false;
        let mut supertrend = None;
        if let Some(atr) = atr {
            let n_loss = self.config.key_value * atr;
            let update = self.trailing.update(src, n_loss);
            trailing_stop = Some(update.stop);
            crossed_above = update.crossed_above;
            crossed_below = update.crossed_below;

            let band = atr * self.config.supertrend_factor;
            supertrend = Some(self.supertrend.update(hl2, band, src));
        }

        // 레짐/반전 판정용 EMA는 항상 원시 종가 기준
        let ema_fast = self.ema_fast.update(bar.close);
        let ema_slow = self.ema_slow.update(bar.close);

        self.ema_fast_history.push_back(ema_fast);
        while self.ema_fast_history.len() > self.config.slope_window + 1 {
            self.ema_fast_history.pop_front();
        }
        let ema_fast_slope = if self.ema_fast_history.len() > self.config.slope_window {
            self.ema_fast_history.front().map(|first| ema_fast - *first)
        } else {
            None
        };

        let volume_ratio = self.volume.update(bar.volume);

        let atr_pct = atr.and_then(|a| {
            if bar.close.is_zero() {
                None
            } else {
                Some(a / bar.close * Decimal::ONE_HUNDRED)
            }
        });

        self.bars_seen = self.bars_seen.saturating_add(1);
        let min_bars = self.config.atr_period.max(2);

        IndicatorSnapshot {
            bar_time: bar.timestamp,
            close: bar.close,
            src,
            atr,
            atr_pct,
            trailing_stop,
            direction: self.trailing.direction(),
            crossed_above,
            crossed_below,
            supertrend,
            ha,
            ema_fast: Some(ema_fast),
            ema_slow: Some(ema_slow),
            ema_fast_slope,
            volume_ratio,
            bars_seen: self.bars_seen,
            warm: self.bars_seen >= min_bars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn flat_bar(ts: DateTime<Utc>, price: Decimal) -> Bar {
        Bar::new("ETHUSDT", ts, price, price, price, price, dec!(1000))
    }

    #[test]
    fn test_warm_flag_requires_atr_period_bars() {
        let mut engine = IndicatorEngine::new(IndicatorConfig {
            atr_period: 3,
            ..Default::default()
        });
        let t0 = Utc::now();
        let s1 = engine.step(&flat_bar(t0, dec!(100)));
        assert!(!s1.warm);
        assert_eq!(s1.trailing_stop, None);

        let s2 = engine.step(&flat_bar(t0 + Duration::minutes(1), dec!(100)));
        assert!(!s2.warm);

        let s3 = engine.step(&flat_bar(t0 + Duration::minutes(2), dec!(100)));
        assert!(s3.warm);
        assert!(s3.trailing_stop.is_some());
    }

    /// 횡보 후 상승 시나리오: [100]×10 + [101..120], ATR 기간 10, keyValue 3.
    ///
    /// 상승 시작 후 스탑은 가격 아래에서 따라붙고,
    /// 어느 봉에서도 `price − 3×ATR`를 넘지 않아야 한다.
    #[test]
    fn test_flat_then_rising_stop_tracks_below_price() {
        let config = IndicatorConfig {
            atr_period: 10,
            key_value: dec!(3),
            ..Default::default()
        };
        let mut engine = IndicatorEngine::new(config);
        let t0 = Utc::now();

        let mut prices: Vec<Decimal> = vec![dec!(100); 10];
        for p in 101..=120u32 {
            prices.push(Decimal::from(p));
        }

        let mut saw_rising = false;
        for (i, price) in prices.iter().enumerate() {
            let bar = flat_bar(t0 + Duration::minutes(i as i64), *price);
            let snap = engine.step(&bar);

            if let (Some(stop), Some(atr)) = (snap.trailing_stop, snap.atr) {
                let bound = *price - dec!(3) * atr;
                assert!(
                    stop <= bound,
                    "bar {}: stop {} > price − 3×ATR {}",
                    i,
                    stop,
                    bound
                );
                if i >= 10 {
                    saw_rising = true;
                    assert!(stop < *price, "bar {}: stop {} not below price", i, price);
                }
            }
        }
        assert!(saw_rising);
    }

    #[test]
    fn test_first_rising_bar_emits_upward_cross() {
        let config = IndicatorConfig {
            atr_period: 10,
            key_value: dec!(3),
            ..Default::default()
        };
        let mut engine = IndicatorEngine::new(config);
        let t0 = Utc::now();

        for i in 0..10 {
            engine.step(&flat_bar(t0 + Duration::minutes(i), dec!(100)));
        }
        // 횡보 구간에서 스탑 == 가격(ATR 0) → 첫 상승 봉이 상향 돌파
        let snap = engine.step(&flat_bar(t0 + Duration::minutes(10), dec!(101)));
        assert!(snap.crossed_above);
        assert!(!snap.crossed_below);
    }

    #[test]
    fn test_heikin_ashi_mode_uses_ha_close_as_src() {
        let mut engine = IndicatorEngine::new(IndicatorConfig {
            atr_period: 2,
            use_heikin_ashi: true,
            ..Default::default()
        });
        let bar = Bar::new(
            "ETHUSDT",
            Utc::now(),
            dec!(100),
            dec!(110),
            dec!(90),
            dec!(104),
            dec!(1000),
        );
        let snap = engine.step(&bar);
        assert_eq!(snap.src, dec!(101)); // (100+110+90+104)/4
        assert_eq!(snap.close, dec!(104)); // 원시 종가는 그대로
    }

    #[test]
    fn test_ema_slope_appears_after_window() {
        let mut engine = IndicatorEngine::new(IndicatorConfig {
            atr_period: 2,
            slope_window: 3,
            ..Default::default()
        });
        let t0 = Utc::now();
        for i in 0..3 {
            let snap = engine.step(&flat_bar(t0 + Duration::minutes(i), dec!(100)));
            assert_eq!(snap.ema_fast_slope, None);
        }
        let snap = engine.step(&flat_bar(t0 + Duration::minutes(3), dec!(100)));
        assert_eq!(snap.ema_fast_slope, Some(dec!(0)));
    }
}
