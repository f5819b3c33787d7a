//! 실행 엔진.
//!
//! 심볼마다 독립 워커 태스크가 다음 파이프라인을 반복합니다:
//!
//! ```text
//! kline 폴링 → 확정 봉 추출 → 지표 갱신 → 포지션 관리(리스크 액션 집행)
//!            → 신호 평가 → 진입 가드 → ENTRY/TP/SL 발행 → 알림
//! ```
//!
//! 워커는 자신의 심볼 상태를 독점 소유하며 봉을 순서대로 처리합니다.
//! 거래소 호출은 전부 [`trail_exchange::OrderGateway`]를 거치므로 재시도
//! 중에도 키당 주문이 1건을 넘지 않습니다. 종료는 `CancellationToken`으로
//! 전파되고, 주문 발행이 시작된 봉은 끝까지 처리한 뒤 멈춥니다.

pub mod config;
pub mod coordinator;
pub mod feed;
pub mod latency;
pub mod ops;
pub mod worker;

// 주요 타입 재내보내기
pub use config::{load_symbol_configs, EngineConfig, SymbolConfig};
pub use coordinator::ExecutionCoordinator;
pub use feed::KlineFeed;
pub use latency::LatencyTracker;
pub use ops::{close_all, symbol_status, SymbolStatus};
pub use worker::{run_symbol_worker, Engine, WorkerParams, WARMUP_BARS};

use thiserror::Error;
use trail_exchange::{ExchangeError, GatewayError};
use trail_risk::RiskError;
use trail_store::StoreError;

/// 엔진 오류.
#[derive(Debug, Error)]
pub enum EngineError {
    /// 설정 파일/환경 변수 문제
    #[error("설정 오류: {0}")]
    Config(String),

    /// 거래소 API 오류
    #[error("거래소 오류: {0}")]
    Exchange(#[from] ExchangeError),

    /// 주문 게이트웨이 오류
    #[error("게이트웨이 오류: {0}")]
    Gateway(#[from] GatewayError),

    /// 상태 저장소 오류
    #[error("저장소 오류: {0}")]
    Store(#[from] StoreError),

    /// 리스크 계층 오류
    #[error("리스크 오류: {0}")]
    Risk(#[from] RiskError),
}
