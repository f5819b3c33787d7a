//! 진입 신호 평가.
//!
//! 지표 스냅샷을 받아 방향과 확신도를 결정하는 순수 평가 레이어입니다.
//!
//! ## 두 가지 구성 요소
//!
//! 1. **레짐 감지** (RegimeDetector)
//!    - 변동성(LOW/MEDIUM/HIGH)과 추세(UPTREND/DOWNTREND/RANGE) 분류
//!    - 레짐 조합별로 진입 문턱을 넓히거나 좁힘
//!
//! 2. **신호 평가** (evaluate)
//!    - 트레일링 스탑 돌파를 방향 트리거로 사용
//!    - EMA 정렬 필터와 거래량 필터로 노이즈 제거
//!    - 부수 효과 없는 순수 함수 (포지션/주문 상태를 모름)

pub mod evaluator;
pub mod regime;

pub use evaluator::{evaluate, EvaluatorConfig};
pub use regime::{MarketRegime, RegimeDetector, TrendRegime, VolatilityRegime};
