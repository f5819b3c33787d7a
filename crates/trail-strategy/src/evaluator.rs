//! 진입 신호 평가기.
//!
//! 트레일링 스탑 돌파를 방향 트리거로 쓰고, 보조 지표 동의 여부로
//! 확신도를 매긴 뒤 레짐 문턱과 필터를 통과한 신호만 내보냅니다.
//! 포지션/주문 상태는 전혀 모르는 순수 함수입니다.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use trail_core::{EntrySignal, Side};
use trail_indicator::IndicatorSnapshot;

use crate::regime::MarketRegime;

/// 돌파만으로 얻는 기본 확신도.
const BASE_CONFIDENCE: f64 = 0.60;
/// SuperTrend 라인이 같은 방향일 때 가산.
const SUPERTREND_AGREE_BONUS: f64 = 0.15;
/// Heikin-Ashi 캔들이 같은 방향일 때 가산.
const HEIKIN_ASHI_AGREE_BONUS: f64 = 0.15;
/// 거래량이 평균 이상일 때 가산.
const VOLUME_ABOVE_AVERAGE_BONUS: f64 = 0.10;

// ==================== 설정 ====================

/// 평가기 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorConfig {
    /// 레짐 미적용 시 롱 문턱
    #[serde(default = "default_threshold")]
    pub thr_long: f64,
    /// 레짐 미적용 시 숏 문턱
    #[serde(default = "default_threshold")]
    pub thr_short: f64,
    /// 레짐별 문턱 사용 여부
    #[serde(default = "default_true")]
    pub use_regime_thresholds: bool,
    /// EMA50/EMA200 정렬 필터 사용 여부
    #[serde(default = "default_true")]
    pub require_trend_alignment: bool,
    /// 거래량 필터 문턱 (평균 대비 비율, 초과해야 통과)
    #[serde(default = "default_min_volume_ratio")]
    pub min_volume_ratio: Decimal,
}

fn default_threshold() -> f64 {
    0.60
}

fn default_true() -> bool {
    true
}

fn default_min_volume_ratio() -> Decimal {
    Decimal::new(85, 2) // 0.85
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            thr_long: default_threshold(),
            thr_short: default_threshold(),
            use_regime_thresholds: true,
            require_trend_alignment: true,
            min_volume_ratio: default_min_volume_ratio(),
        }
    }
}

// ==================== 평가 ====================

/// 확정 봉 스냅샷 하나를 평가해 진입 신호를 돌려준다.
///
/// 반환 `None`은 FLAT입니다. 워밍업 전이거나, 돌파가 없거나,
/// 문턱/필터에 걸리면 신호가 나가지 않습니다.
pub fn evaluate(
    symbol: &str,
    snapshot: &IndicatorSnapshot,
    regime: Option<MarketRegime>,
    config: &EvaluatorConfig,
) -> Option<EntrySignal> {
    if !snapshot.warm {
        return None;
    }
    let stop = snapshot.trailing_stop?;

    // 방향 트리거: 스탑 돌파 + 스탑 기준 위치
    let side = if snapshot.crossed_above && snapshot.src > stop {
        Side::Long
    } else if snapshot.crossed_below && snapshot.src < stop {
        Side::Short
    } else {
        return None;
    };

    let confidence = score_confidence(snapshot, side);

    let (thr_long, thr_short) = match (config.use_regime_thresholds, regime) {
        (true, Some(regime)) => {
            let thresholds = regime.thresholds();
            debug!(symbol, %regime, thr_long = thresholds.0, thr_short = thresholds.1, "레짐 문턱 적용");
            thresholds
        }
        _ => (config.thr_long, config.thr_short),
    };
    let threshold = match side {
        Side::Long => thr_long,
        Side::Short => thr_short,
    };
    if confidence < threshold {
        debug!(symbol, %side, confidence, threshold, "확신도 미달");
        return None;
    }

    // EMA 정렬 필터: 롱은 fast > slow, 숏은 fast < slow
    if config.require_trend_alignment {
        let aligned = match (snapshot.ema_fast, snapshot.ema_slow) {
            (Some(fast), Some(slow)) => match side {
                Side::Long => fast > slow,
                Side::Short => fast < slow,
            },
            _ => false,
        };
        if !aligned {
            debug!(symbol, %side, "EMA 정렬 필터 거부");
            return None;
        }
    }

    // 거래량 필터: 평균 정보가 없으면 통과
    if let Some(volume_ratio) = snapshot.volume_ratio {
        if volume_ratio <= config.min_volume_ratio {
            debug!(symbol, %side, %volume_ratio, "거래량 필터 거부");
            return None;
        }
    }

    Some(EntrySignal::new(
        symbol,
        side,
        confidence,
        snapshot.close,
        snapshot.bar_time,
    ))
}

/// 보조 지표 동의 여부로 확신도를 매긴다.
fn score_confidence(snapshot: &IndicatorSnapshot, side: Side) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    if let Some(supertrend) = snapshot.supertrend {
        let agrees = match side {
            Side::Long => snapshot.src > supertrend,
            Side::Short => snapshot.src < supertrend,
        };
        if agrees {
            confidence += SUPERTREND_AGREE_BONUS;
        }
    }

    let ha_agrees = match side {
        Side::Long => snapshot.ha.is_bullish(),
        Side::Short => snapshot.ha.is_bearish(),
    };
    if ha_agrees {
        confidence += HEIKIN_ASHI_AGREE_BONUS;
    }

    if snapshot
        .volume_ratio
        .is_some_and(|ratio| ratio >= Decimal::ONE)
    {
        confidence += VOLUME_ABOVE_AVERAGE_BONUS;
    }

    confidence.min(1.0)
}
