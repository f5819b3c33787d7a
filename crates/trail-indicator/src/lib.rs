//! 봉 단위 재귀 지표 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - Wilder 평활 ATR 계산기
//! - ATR 트레일링 스탑 (4분기 규칙) + 방향/돌파 감지
//! - SuperTrend 라인
//! - Heikin-Ashi 변환
//! - EMA, 거래량 비율 계산기
//! - 심볼별 상태를 묶는 `IndicatorEngine`과 봉당 `IndicatorSnapshot`
//!
//! 모든 계산기는 `update(이전 상태, 새 봉) → 새 상태` 형태의 증분 방식입니다.
//! DataFrame 전체를 다시 계산하지 않으므로 봉당 O(1)이고, 각 계산기를
//! 독립적으로 단위 테스트할 수 있습니다.
//!
//! 워밍업이 끝나기 전(lookback 미달)에는 값 대신 `None`을 돌려줍니다.
//! 데이터 부족은 에러가 아니라 "신호 없음"입니다.

pub mod atr;
pub mod ema;
pub mod engine;
pub mod heikin_ashi;
pub mod supertrend;
pub mod trailing_stop;
pub mod volume;

// 주요 타입 재내보내기
pub use atr::Atr;
pub use ema::Ema;
pub use engine::{IndicatorConfig, IndicatorEngine, IndicatorSnapshot};
pub use heikin_ashi::{HaBar, HeikinAshi};
pub use supertrend::SuperTrend;
pub use trailing_stop::{AtrTrailingStop, Direction, TrailingStopUpdate};
pub use volume::VolumeRatio;
