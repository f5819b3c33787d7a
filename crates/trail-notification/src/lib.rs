//! 거래 알림.
//!
//! 진입/청산/차단 이벤트를 Telegram Bot API로 전달합니다. 알림은
//! 보조 경로입니다. 전송 실패가 주문 흐름을 막아서는 안 되므로
//! 호출부는 [`notify`]를 사용해 실패를 로그로만 남깁니다.

pub mod telegram;
pub mod types;

pub use telegram::{TelegramConfig, TelegramSender};
pub use types::{Alert, AlertEvent, NotificationError, NotificationResult, NotificationSender};

use tracing::warn;

/// 알림을 보내고 실패는 로그로만 남깁니다.
///
/// `sender`가 `None`이면 (알림 미설정) 아무 일도 하지 않습니다.
pub async fn notify(sender: Option<&dyn NotificationSender>, event: AlertEvent) {
    let Some(sender) = sender else {
        return;
    };
    let alert = Alert::new(event);
    if let Err(e) = sender.send(&alert).await {
        warn!(channel = sender.name(), error = %e, "알림 전송 실패");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingSender;

    #[async_trait]
    impl NotificationSender for FailingSender {
        async fn send(&self, _alert: &Alert) -> NotificationResult<()> {
            Err(NotificationError::SendFailed("강제 실패".to_string()))
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_notify_swallows_send_errors() {
        let sender = FailingSender;
        notify(
            Some(&sender),
            AlertEvent::SystemError {
                context: "주문 접수".to_string(),
                message: "테스트 오류".to_string(),
            },
        )
        .await;
        // 오류가 전파되지 않고 여기까지 오면 성공
    }

    #[tokio::test]
    async fn test_notify_without_sender_is_noop() {
        notify(
            None,
            AlertEvent::TradeBlocked {
                symbol: "ETHUSDT".to_string(),
                reason: "연속 손실 5회".to_string(),
            },
        )
        .await;
    }
}
