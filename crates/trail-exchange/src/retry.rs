//! 거래소 호출 재시도 유틸리티.
//!
//! 네트워크 단절, Rate Limit, 서버 오류 같은 일시적 오류만 재시도하며
//! 검증 실패나 인증 오류는 즉시 반환합니다. 대기 시간은 지수 백오프에
//! 지터를 더해 계산합니다.
//!
//! # 예시
//!
//! ```rust,ignore
//! use trail_exchange::retry::{with_retry, RetryConfig};
//!
//! let result = with_retry(&RetryConfig::default(), || async {
//!     api.fetch_open_orders("ETHUSDT").await
//! })
//! .await;
//! ```

use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::ExchangeError;

/// 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 기본 대기 시간. 오류가 대기 시간을 지정하면 그 값이 우선합니다.
    pub base_delay: Duration,
    /// 대기 시간 상한.
    pub max_delay: Duration,
    /// 지수 백오프 사용 여부.
    pub use_exponential_backoff: bool,
    /// 백오프 배수.
    pub backoff_multiplier: f64,
    /// 지터(±25% 무작위 지연) 추가 여부.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            use_exponential_backoff: true,
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// 짧은 지연의 빠른 재시도. 봉 폴링처럼 다음 주기가 곧 오는 호출용.
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// attempt번째 재시도 전 대기 시간.
    fn calculate_delay(&self, attempt: u32, error: &ExchangeError) -> Duration {
        let base = error
            .retry_delay_ms()
            .map(Duration::from_millis)
            .unwrap_or(self.base_delay);

        let delay = if self.use_exponential_backoff && attempt > 0 {
            let multiplier = self.backoff_multiplier.powi(attempt as i32);
            Duration::from_secs_f64(base.as_secs_f64() * multiplier)
        } else {
            base
        };

        let delay = delay.min(self.max_delay);

        if self.add_jitter {
            let jitter_range = delay.as_millis() as f64 * 0.25;
            let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
            Duration::from_millis((delay.as_millis() as f64 + jitter).max(0.0) as u64)
        } else {
            delay
        }
    }
}

/// 재시도가 포함된 비동기 작업 실행.
///
/// 치명적 오류(`is_fatal`)와 재시도 불가능한 오류(`!is_retryable`)는
/// 즉시 반환하고, 일시적 오류만 `max_retries`회까지 재시도합니다.
///
/// # Errors
///
/// 재시도 한도를 소진했거나 재시도 대상이 아닌 오류면 마지막 오류를
/// 그대로 반환합니다.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0;
    let mut total_delay = Duration::ZERO;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        attempts = attempt + 1,
                        total_delay_ms = total_delay.as_millis(),
                        "재시도 후 성공"
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if e.is_fatal() {
                    warn!(error = %e, "치명적 오류, 재시도 중단");
                    return Err(e);
                }

                if !e.is_retryable() {
                    debug!(error = %e, "재시도 대상 아님, 즉시 반환");
                    return Err(e);
                }

                if attempt >= config.max_retries {
                    warn!(
                        error = %e,
                        attempts = attempt + 1,
                        max_retries = config.max_retries,
                        "재시도 한도 소진"
                    );
                    return Err(e);
                }

                let delay = config.calculate_delay(attempt, &e);
                total_delay += delay;

                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis(),
                    "일시적 오류, 재시도 대기"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
