//! 엔진 설정.
//!
//! 런타임 전역 설정은 환경 변수(.env)에서, 심볼별 거래 파라미터는 TOML
//! 파일의 `[[symbols]]` 테이블에서 읽습니다. 하위 테이블(indicator /
//! evaluator / risk)은 생략하면 전부 기본값입니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use trail_indicator::IndicatorConfig;
use trail_risk::RiskConfig;
use trail_strategy::EvaluatorConfig;

use crate::EngineError;

/// 환경 변수를 `T`로 파싱. 없거나 파싱에 실패하면 기본값.
fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 엔진 전역 설정.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 상태 문서 저장 디렉터리
    pub state_path: PathBuf,
    /// 심볼 설정 TOML 경로
    pub symbols_path: PathBuf,
    /// kline 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 이 지연(ms)을 넘으면 경고 로그
    pub latency_warn_ms: f64,
    /// 종결 주문 기록 보관 시간 (시간 단위)
    pub cleanup_max_age_hours: i64,
}

impl EngineConfig {
    /// 환경 변수에서 설정을 읽습니다. `.env` 파일이 있으면 먼저 적재합니다.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            state_path: PathBuf::from(
                std::env::var("TRAIL_STATE_PATH").unwrap_or_else(|_| "state".to_string()),
            ),
            symbols_path: PathBuf::from(
                std::env::var("TRAIL_SYMBOLS_PATH").unwrap_or_else(|_| "symbols.toml".to_string()),
            ),
            poll_interval_secs: env_var_parse("TRAIL_POLL_INTERVAL_SECS", 5),
            latency_warn_ms: env_var_parse("TRAIL_LATENCY_WARN_MS", 300.0),
            cleanup_max_age_hours: env_var_parse("TRAIL_CLEANUP_MAX_AGE_HOURS", 24),
        }
    }
}

/// 심볼 하나의 거래 설정 (TOML `[[symbols]]` 테이블).
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    /// 거래 심볼 (예: "ETHUSDT")
    pub symbol: String,

    /// 봉 주기 (거래소 표기, 예: "15m")
    #[serde(default = "default_interval")]
    pub interval: String,

    /// 진입 1회에 투입하는 견적 통화 금액 (USDT)
    pub quote_qty: Decimal,

    /// 익절 문턱 (%, 진입가 기준)
    #[serde(default = "default_tp_pct")]
    pub tp_pct: Decimal,

    /// 손절 문턱 (%, 진입가 기준)
    #[serde(default = "default_sl_pct")]
    pub sl_pct: Decimal,

    /// 가격 최소 단위
    pub tick_size: Decimal,

    /// 수량 최소 단위
    pub step_size: Decimal,

    /// 레짐 감지에 쓰는 봉 수
    #[serde(default = "default_regime_lookback")]
    pub regime_lookback: usize,

    /// 지표 파라미터
    #[serde(default)]
    pub indicator: IndicatorConfig,

    /// 진입 평가 파라미터
    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    /// 리스크 파라미터
    #[serde(default)]
    pub risk: RiskConfig,
}

fn default_interval() -> String {
    "15m".to_string()
}

fn default_tp_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_sl_pct() -> Decimal {
    Decimal::new(12, 1) // 1.2%
}

fn default_regime_lookback() -> usize {
    100
}

/// symbols.toml 루트.
#[derive(Debug, Deserialize)]
struct SymbolsFile {
    #[serde(default)]
    symbols: Vec<SymbolConfig>,
}

/// TOML 파일에서 심볼 설정 목록을 읽습니다.
///
/// # Errors
///
/// 파일이 없거나, TOML이 깨졌거나, 심볼이 하나도 없거나, 같은 심볼이
/// 두 번 나오면 [`EngineError::Config`].
pub fn load_symbol_configs(path: &Path) -> Result<Vec<SymbolConfig>, EngineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("{} 읽기 실패: {}", path.display(), e)))?;
    let file: SymbolsFile = toml::from_str(&text)
        .map_err(|e| EngineError::Config(format!("{} 파싱 실패: {}", path.display(), e)))?;

    if file.symbols.is_empty() {
        return Err(EngineError::Config(format!(
            "{}에 심볼이 하나도 없음",
            path.display()
        )));
    }

    // 심볼 중복은 같은 상태 키를 두 워커가 다투게 되므로 막는다
    let mut seen = std::collections::HashSet::new();
    for config in &file.symbols {
        if !seen.insert(config.symbol.as_str()) {
            return Err(EngineError::Config(format!(
                "심볼 중복: {}",
                config.symbol
            )));
        }
    }

    Ok(file.symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbols_toml_parses_with_defaults() {
        let text = r#"
[[symbols]]
symbol = "ETHUSDT"
quote_qty = 1000
tick_size = 0.01
step_size = 0.001

[[symbols]]
symbol = "BTCUSDT"
interval = "1h"
quote_qty = 2000
tp_pct = 3.0
sl_pct = 1.5
tick_size = 0.1
step_size = 0.001
regime_lookback = 80

[symbols.indicator]
atr_period = 14

[symbols.risk]
trail_step = 0.2
"#;
        let file: SymbolsFile = toml::from_str(text).unwrap();
        assert_eq!(file.symbols.len(), 2);

        let eth = &file.symbols[0];
        assert_eq!(eth.interval, "15m");
        assert_eq!(eth.tp_pct, dec!(0.5));
        assert_eq!(eth.sl_pct, dec!(1.2));
        assert_eq!(eth.regime_lookback, 100);
        assert_eq!(eth.indicator.atr_period, 10);
        assert_eq!(eth.risk, RiskConfig::default());

        let btc = &file.symbols[1];
        assert_eq!(btc.interval, "1h");
        assert_eq!(btc.tp_pct, dec!(3.0));
        assert_eq!(btc.regime_lookback, 80);
        // 하위 테이블은 지정한 필드만 덮어쓴다
        assert_eq!(btc.indicator.atr_period, 14);
        assert_eq!(btc.indicator.ema_slow_period, 200);
        assert_eq!(btc.risk.trail_step, dec!(0.2));
        assert_eq!(btc.risk.cooldown_minutes, 60);
    }

    #[test]
    fn test_load_rejects_empty_and_duplicate_symbols() {
        let dir = tempfile::tempdir().unwrap();

        let empty = dir.path().join("empty.toml");
        std::fs::write(&empty, "").unwrap();
        assert!(load_symbol_configs(&empty).is_err());

        let dup = dir.path().join("dup.toml");
        std::fs::write(
            &dup,
            r#"
[[symbols]]
symbol = "ETHUSDT"
quote_qty = 1000
tick_size = 0.01
step_size = 0.001

[[symbols]]
symbol = "ETHUSDT"
quote_qty = 500
tick_size = 0.01
step_size = 0.001
"#,
        )
        .unwrap();
        let err = load_symbol_configs(&dup).unwrap_err();
        assert!(err.to_string().contains("중복"));
    }

    #[test]
    fn test_env_var_parse_falls_back_on_missing_or_invalid() {
        std::env::remove_var("TRAIL_TEST_MISSING");
        assert_eq!(env_var_parse("TRAIL_TEST_MISSING", 7u64), 7);

        std::env::set_var("TRAIL_TEST_NUM", "42");
        assert_eq!(env_var_parse("TRAIL_TEST_NUM", 7u64), 42);

        std::env::set_var("TRAIL_TEST_BAD", "abc");
        assert_eq!(env_var_parse("TRAIL_TEST_BAD", 7u64), 7);
    }
}
