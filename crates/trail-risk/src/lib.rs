//! 포지션 생애주기와 리스크 관리.
//!
//! 이 crate는 다음을 제공합니다:
//! - [`PositionManager`] - 심볼당 포지션 상태 기계 (본전 이동, 트레일링,
//!   부분 익절, 추세 반전/거래량 급증 청산)
//! - [`should_block_trades`] - 연속 손실 서킷 브레이커
//! - [`RiskConfig`] - 리스크 파라미터 (TOML 심볼 테이블에서 역직렬화)
//!
//! 관리자는 주문을 직접 내지 않습니다. 확정 봉마다 [`RiskAction`] 목록을
//! 돌려주고, 실제 거래소 호출은 코디네이터가 게이트웨이를 통해 수행합니다.
//! 상태가 변할 때마다 전체 스냅샷이 저장소에 기록되므로 재기동 후에도
//! 본전/트레일링/부분 익절 플래그가 유지됩니다.

pub mod blocker;
pub mod config;
pub mod manager;

// 주요 타입 재내보내기
pub use blocker::{should_block_trades, TradeBlockState};
pub use config::RiskConfig;
pub use manager::{PositionManager, RiskAction, StopMoveKind};

use thiserror::Error;
use trail_store::StoreError;

/// 리스크 계층 오류.
#[derive(Debug, Error)]
pub enum RiskError {
    /// 이미 포지션이 있는 심볼에 중복 등록 시도 (심볼당 최대 1개)
    #[error("{0} 포지션이 이미 존재함")]
    PositionExists(String),

    /// 상태 저장소 읽기/쓰기 실패
    #[error("상태 저장소 오류: {0}")]
    Store(#[from] StoreError),

    /// 저장된 상태 문서 역직렬화 실패
    #[error("상태 문서 역직렬화 오류: {0}")]
    Deserialization(#[from] serde_json::Error),
}
