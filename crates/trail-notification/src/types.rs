//! 알림 이벤트 타입과 전송기 계약.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use trail_core::{ExitReason, Side};

/// 알림 전송 오류.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// HTTP 요청 자체가 실패
    #[error("네트워크 오류: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// 서버가 전송을 거부 (4xx/5xx)
    #[error("전송 실패: {0}")]
    SendFailed(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과. {0}초 후 재시도 가능")]
    RateLimited(u64),
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// 알림을 일으킨 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    /// 진입 주문 체결
    EntryFilled {
        symbol: String,
        side: Side,
        entry: Decimal,
        tp: Decimal,
        sl: Decimal,
        /// 신호 확신도 (0.0 ~ 1.0)
        confidence: f64,
        /// 봉 확정부터 주문 접수까지 걸린 시간
        latency_ms: f64,
    },
    /// 전량 청산
    PositionClosed {
        symbol: String,
        side: Side,
        entry_price: Decimal,
        exit_price: Decimal,
        pnl_pct: Decimal,
        reason: ExitReason,
    },
    /// 부분 익절
    PartialExit {
        symbol: String,
        side: Side,
        price: Decimal,
        closed_qty: Decimal,
        profit_pct: Decimal,
    },
    /// 연속 손실로 신규 진입 차단
    TradeBlocked { symbol: String, reason: String },
    /// 운영자 확인이 필요한 오류
    SystemError { context: String, message: String },
}

/// 이벤트와 발생 시각을 묶은 봉투.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub event: AlertEvent,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// 현재 시각으로 알림을 만듭니다.
    pub fn new(event: AlertEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

/// 알림 채널 계약.
///
/// 구현체는 자신의 형식으로 메시지를 만들어 전송합니다. 비활성화
/// 상태에서는 조용히 성공해야 합니다.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 알림 하나를 전송합니다.
    async fn send(&self, alert: &Alert) -> NotificationResult<()>;

    /// 전송 활성화 여부.
    fn is_enabled(&self) -> bool;

    /// 채널 이름 (로그 식별용).
    fn name(&self) -> &str;
}
