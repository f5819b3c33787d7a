//! 리스크 파라미터.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 포지션 관리 파라미터.
///
/// 수익률 계열 필드는 모두 퍼센트 단위입니다 (0.25 == 0.25%).
/// 심볼별 TOML 테이블에서 역직렬화되며, 생략한 필드는 기본값을 씁니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// 이 수익률 도달 시 스탑을 진입가로 이동 (한 번만)
    #[serde(default = "default_break_even_threshold")]
    pub break_even_threshold: Decimal,

    /// 이 수익률부터 트레일링 활성화
    #[serde(default = "default_trail_start")]
    pub trail_start: Decimal,

    /// 트레일링 간격: 현재가에서 이만큼 떨어진 가격이 스탑 후보
    #[serde(default = "default_trail_step")]
    pub trail_step: Decimal,

    /// 부분 익절 발동 수익률
    #[serde(default = "default_partial_exit_trigger")]
    pub partial_exit_trigger: Decimal,

    /// 부분 익절로 청산하는 비중 (%)
    #[serde(default = "default_partial_exit_pct")]
    pub partial_exit_pct: Decimal,

    /// EMA 추세 반전 청산 사용 여부
    #[serde(default = "default_true")]
    pub use_trend_reversal_exit: bool,

    /// 추세 반전 청산이 가능해지는 최소 보유 봉수
    #[serde(default = "default_trend_reversal_min_bars")]
    pub trend_reversal_min_bars: u32,

    /// 추세 반전 청산 최소 수익률. 0이면 조건 없음.
    #[serde(default)]
    pub trend_reversal_min_profit_pct: Decimal,

    /// 거래량 급증 청산 사용 여부
    #[serde(default = "default_true")]
    pub use_volume_exit: bool,

    /// 거래량 급증 청산 문턱 (평균 거래량 대비 배수)
    #[serde(default = "default_volume_exit_threshold")]
    pub volume_exit_threshold: Decimal,

    /// 거래량 청산 최소 수익률. 0이면 조건 없음.
    #[serde(default)]
    pub volume_exit_min_profit_pct: Decimal,

    /// 거래량 청산이 가능해지는 최소 보유 봉수. 0이면 조건 없음.
    #[serde(default)]
    pub volume_exit_min_bars: u32,

    /// 이 횟수만큼 연속 손실이면 신규 진입 차단
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: usize,

    /// 차단 쿨다운 (분)
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
}

fn default_break_even_threshold() -> Decimal {
    Decimal::new(25, 2) // 0.25%
}

fn default_trail_start() -> Decimal {
    Decimal::new(35, 2) // 0.35%
}

fn default_trail_step() -> Decimal {
    Decimal::new(1, 1) // 0.1%
}

fn default_partial_exit_trigger() -> Decimal {
    Decimal::ONE // 1.0%
}

fn default_partial_exit_pct() -> Decimal {
    Decimal::from(75)
}

fn default_true() -> bool {
    true
}

fn default_trend_reversal_min_bars() -> u32 {
    5
}

fn default_volume_exit_threshold() -> Decimal {
    Decimal::from(3)
}

fn default_max_consecutive_losses() -> usize {
    5
}

fn default_cooldown_minutes() -> i64 {
    60
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            break_even_threshold: default_break_even_threshold(),
            trail_start: default_trail_start(),
            trail_step: default_trail_step(),
            partial_exit_trigger: default_partial_exit_trigger(),
            partial_exit_pct: default_partial_exit_pct(),
            use_trend_reversal_exit: default_true(),
            trend_reversal_min_bars: default_trend_reversal_min_bars(),
            trend_reversal_min_profit_pct: Decimal::ZERO,
            use_volume_exit: default_true(),
            volume_exit_threshold: default_volume_exit_threshold(),
            volume_exit_min_profit_pct: Decimal::ZERO,
            volume_exit_min_bars: 0,
            max_consecutive_losses: default_max_consecutive_losses(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: RiskConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config, RiskConfig::default());
        assert_eq!(config.break_even_threshold, dec!(0.25));
        assert_eq!(config.trail_step, dec!(0.1));
        assert_eq!(config.partial_exit_pct, dec!(75));
        assert_eq!(config.max_consecutive_losses, 5);
    }

    #[test]
    fn test_partial_document_overrides_only_named_fields() {
        let config: RiskConfig = serde_json::from_value(json!({
            "trail_start": 0.5,
            "use_volume_exit": false,
            "cooldown_minutes": 120,
        }))
        .unwrap();
        assert_eq!(config.trail_start, dec!(0.5));
        assert!(!config.use_volume_exit);
        assert_eq!(config.cooldown_minutes, 120);
        // 나머지는 기본값 유지
        assert_eq!(config.break_even_threshold, dec!(0.25));
        assert!(config.use_trend_reversal_exit);
    }
}
