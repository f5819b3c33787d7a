//! Telegram 알림 서비스.
//!
//! Bot API `sendMessage`를 통해 거래 알림을 전송합니다.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, info, warn};

use trail_core::Side;

use crate::types::{Alert, AlertEvent, NotificationError, NotificationResult, NotificationSender};

/// Telegram 메시지 길이 상한. 초과분은 잘라서 보냅니다.
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn truncate(text: &str) -> String {
    if text.chars().count() <= TELEGRAM_MESSAGE_LIMIT {
        return text.to_string();
    }
    warn!(len = text.chars().count(), "메시지가 길어 잘라서 전송");
    text.chars().take(TELEGRAM_MESSAGE_LIMIT).collect()
}

/// Telegram 알림 전송 설정.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot 토큰 (BotFather 발급)
    pub bot_token: String,
    /// 대상 채팅 id
    pub chat_id: String,
    /// 전송 활성화 여부
    pub enabled: bool,
    /// API 기본 URL (테스트용 오버라이드)
    pub api_base: String,
}

impl TelegramConfig {
    /// 새 Telegram 설정을 생성합니다.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            enabled: true,
            api_base: "https://api.telegram.org".to_string(),
        }
    }

    /// API 기본 URL을 바꿉니다.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// 환경 변수에서 설정을 생성합니다.
    ///
    /// `TELEGRAM_BOT_TOKEN`과 `TELEGRAM_CHAT_ID`가 모두 있어야 하며,
    /// `TELEGRAM_ENABLED`로 끄고 켤 수 있습니다.
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        let enabled = std::env::var("TELEGRAM_ENABLED")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Some(Self {
            bot_token,
            chat_id,
            enabled,
            api_base: "https://api.telegram.org".to_string(),
        })
    }
}

/// Telegram 알림 전송기.
pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    /// 새 Telegram 전송기를 생성합니다.
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// 환경 변수에서 전송기를 생성합니다.
    pub fn from_env() -> Option<Self> {
        TelegramConfig::from_env().map(Self::new)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base, self.config.bot_token
        )
    }

    /// 알림을 HTML 메시지로 포맷합니다.
    fn format_message(&self, alert: &Alert) -> String {
        let timestamp = alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC");

        match &alert.event {
            AlertEvent::EntryFilled {
                symbol,
                side,
                entry,
                tp,
                sl,
                confidence,
                latency_ms,
            } => {
                let side_emoji = match side {
                    Side::Long => "🟢",
                    Side::Short => "🔴",
                };
                format!(
                    "{side_emoji} <b>진입 체결</b>\n\
                     📌 심볼: <code>{symbol}</code>\n\
                     📊 방향: {side}\n\
                     💰 진입가: {entry}\n\
                     🎯 TP: {tp}\n\
                     🛑 SL: {sl}\n\
                     📈 확신도: {:.0}%\n\
                     ⏱ 지연: {latency_ms:.1}ms\n\
                     {timestamp}",
                    confidence * 100.0
                )
            }

            AlertEvent::PositionClosed {
                symbol,
                side,
                entry_price,
                exit_price,
                pnl_pct,
                reason,
            } => {
                let pnl_emoji = if *pnl_pct >= Decimal::ZERO {
                    "💰"
                } else {
                    "📉"
                };
                let sign = if *pnl_pct >= Decimal::ZERO { "+" } else { "" };
                format!(
                    "{pnl_emoji} <b>포지션 청산</b>\n\
                     📌 심볼: <code>{symbol}</code>\n\
                     📊 방향: {side}\n\
                     💰 진입가: {entry_price}\n\
                     🏁 청산가: {exit_price}\n\
                     📈 손익: <b>{sign}{pnl_pct}%</b>\n\
                     🏷 사유: {reason}\n\
                     {timestamp}"
                )
            }

            AlertEvent::PartialExit {
                symbol,
                side,
                price,
                closed_qty,
                profit_pct,
            } => {
                format!(
                    "📤 <b>부분 익절</b>\n\
                     📌 심볼: <code>{symbol}</code>\n\
                     📊 방향: {side}\n\
                     💰 가격: {price}\n\
                     📦 청산 수량: {closed_qty}\n\
                     📈 수익률: +{profit_pct}%\n\
                     {timestamp}"
                )
            }

            AlertEvent::TradeBlocked { symbol, reason } => {
                format!(
                    "🚫 <b>신규 진입 차단</b>\n\
                     📌 심볼: <code>{symbol}</code>\n\
                     {reason}\n\
                     {timestamp}"
                )
            }

            AlertEvent::SystemError { context, message } => {
                format!(
                    "🚨 <b>시스템 오류</b>\n\
                     📍 위치: {context}\n\
                     {message}\n\
                     {timestamp}"
                )
            }
        }
    }

    /// `sendMessage`를 호출합니다.
    async fn send_message(&self, text: &str) -> NotificationResult<()> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": truncate(text),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        debug!("Telegram sendMessage 요청");

        let response = self
            .client
            .post(self.endpoint())
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(NotificationError::NetworkError)?;

        if response.status().is_success() {
            info!("Telegram 알림 전송 완료");
            return Ok(());
        }

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            warn!(retry_after, "Telegram rate limited");
            return Err(NotificationError::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        error!("Telegram 전송 실패: {} - {}", status, body);
        Err(NotificationError::SendFailed(format!(
            "HTTP {}: {}",
            status, body
        )))
    }

    /// 설정 확인용 테스트 메시지를 전송합니다.
    pub async fn send_test(&self) -> NotificationResult<()> {
        self.send_message(
            "✅ Telegram 알림 설정 완료\n거래 알림이 이 채팅으로 전송됩니다.",
        )
        .await
    }
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, alert: &Alert) -> NotificationResult<()> {
        if !self.is_enabled() {
            debug!("Telegram 알림이 비활성화되어 있습니다");
            return Ok(());
        }

        let message = self.format_message(alert);
        self.send_message(&message).await
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
            && !self.config.bot_token.is_empty()
            && !self.config.chat_id.is_empty()
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
