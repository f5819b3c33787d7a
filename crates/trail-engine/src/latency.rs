//! 신호→주문 지연 측정.
//!
//! 봉 처리 시작 시각을 기준으로 단계별 경과를 기록합니다. 확정 봉이
//! 도착하고 주문이 접수될 때까지의 시간이 핵심 지표이며, 문턱을 넘으면
//! 경고 로그를 남깁니다. 알림 페이로드의 `latency_ms`가 이 값입니다.

use std::time::Instant;

use tracing::warn;

/// 단계별 지연 추적기. 봉 하나를 처리할 때마다 새로 만듭니다.
#[derive(Debug)]
pub struct LatencyTracker {
    started: Instant,
    warn_threshold_ms: f64,
}

impl LatencyTracker {
    /// 지금을 기준점으로 추적 시작.
    pub fn start(warn_threshold_ms: f64) -> Self {
        Self {
            started: Instant::now(),
            warn_threshold_ms,
        }
    }

    /// 시작 이후 경과 (ms).
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// 단계 완료 기록. 경과 ms를 돌려주고 문턱 초과면 경고를 남깁니다.
    pub fn checkpoint(&self, symbol: &str, stage: &str) -> f64 {
        let elapsed_ms = self.elapsed_ms();
        if elapsed_ms > self.warn_threshold_ms {
            warn!(
                symbol,
                stage,
                elapsed_ms,
                threshold_ms = self.warn_threshold_ms,
                "처리 지연"
            );
        }
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_monotonic() {
        let tracker = LatencyTracker::start(1_000.0);
        let first = tracker.elapsed_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = tracker.elapsed_ms();
        assert!(first >= 0.0);
        assert!(second > first);
    }

    #[test]
    fn test_checkpoint_returns_elapsed() {
        let tracker = LatencyTracker::start(0.0);
        std::thread::sleep(std::time::Duration::from_millis(1));
        // 문턱 0이므로 경고 경로도 타지만 반환값은 경과 시간 그대로
        let elapsed = tracker.checkpoint("ETHUSDT", "테스트");
        assert!(elapsed >= 1.0);
    }
}
