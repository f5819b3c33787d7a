//! 심볼 워커와 엔진 구동.
//!
//! 워커는 심볼 하나를 배타적으로 소유하는 단일 태스크입니다. 폴링 →
//! 확정 봉 처리 → 주기 정리를 반복하고, 종료 신호는 봉 경계에서만
//! 확인합니다. 엔진은 심볼마다 워커를 하나씩 띄우고 전부 끝날 때까지
//! 기다립니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use trail_exchange::{FuturesApi, OrderGateway};
use trail_notification::NotificationSender;
use trail_store::StateStore;

use crate::config::{EngineConfig, SymbolConfig};
use crate::coordinator::ExecutionCoordinator;
use crate::feed::KlineFeed;

/// 워밍업에 쓰는 과거 봉 수. EMA(200)이 안정되는 여유분을 둡니다.
pub const WARMUP_BARS: u32 = 300;

/// 주기 폴링 때 가져오는 봉 수
const KLINE_POLL_LIMIT: u32 = 50;

/// 주문 기록 정리 주기
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// 워커 구동 파라미터.
#[derive(Debug, Clone)]
pub struct WorkerParams {
    /// 봉 폴링 간격
    pub poll_interval: Duration,
    /// 종결 주문 기록 보존 기간
    pub cleanup_max_age: chrono::Duration,
}

/// 심볼 하나의 폴링 루프.
///
/// 봉 처리 오류는 로그만 남기고 다음 봉을 계속 처리합니다. 취소
/// 신호가 와도 진행 중인 봉은 끝까지 처리합니다.
pub async fn run_symbol_worker(
    mut feed: KlineFeed,
    mut coordinator: ExecutionCoordinator,
    params: WorkerParams,
    cancel: CancellationToken,
) {
    let symbol = coordinator.symbol().to_string();
    let mut poll = tokio::time::interval(params.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // 첫 틱은 즉시 완료되므로 소비하고 시작한다
    poll.tick().await;
    let mut last_cleanup = Instant::now();

    info!(symbol = %symbol, "워커 시작");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(symbol = %symbol, "워커 종료");
                return;
            }
            _ = poll.tick() => {}
        }

        let bars = match feed.poll(KLINE_POLL_LIMIT).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "봉 조회 실패");
                continue;
            }
        };

        for bar in &bars {
            // 주문 발행 도중에는 끊지 않고 봉 경계에서만 종료를 확인한다
            if cancel.is_cancelled() {
                info!(symbol = %symbol, "워커 종료");
                return;
            }
            if let Err(e) = coordinator.on_bar(bar).await {
                error!(symbol = %symbol, error = %e, "봉 처리 실패");
            }
        }

        if last_cleanup.elapsed() >= CLEANUP_INTERVAL {
            coordinator.cleanup(params.cleanup_max_age).await;
            last_cleanup = Instant::now();
        }
    }
}

/// 전체 엔진. 심볼마다 워커 태스크를 하나씩 띄웁니다.
pub struct Engine {
    config: EngineConfig,
    symbols: Vec<SymbolConfig>,
    api: Arc<dyn FuturesApi>,
    store: Arc<dyn StateStore>,
    alerts: Option<Arc<dyn NotificationSender>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        symbols: Vec<SymbolConfig>,
        api: Arc<dyn FuturesApi>,
        store: Arc<dyn StateStore>,
        alerts: Option<Arc<dyn NotificationSender>>,
    ) -> Self {
        Self {
            config,
            symbols,
            api,
            store,
            alerts,
        }
    }

    /// 모든 워커를 띄우고 취소될 때까지 구동합니다.
    ///
    /// 워커 초기화 실패(설정·상태 복원 오류)는 해당 심볼만 멈추고
    /// 나머지는 계속 돕니다.
    pub async fn run(self, cancel: CancellationToken) {
        let params = WorkerParams {
            poll_interval: Duration::from_secs(self.config.poll_interval_secs),
            cleanup_max_age: chrono::Duration::hours(self.config.cleanup_max_age_hours),
        };
        info!(symbols = self.symbols.len(), "엔진 기동");

        let mut handles = Vec::with_capacity(self.symbols.len());
        for symbol_config in self.symbols {
            let api = Arc::clone(&self.api);
            let store = Arc::clone(&self.store);
            let alerts = self.alerts.clone();
            let params = params.clone();
            let latency_warn_ms = self.config.latency_warn_ms;
            let cancel = cancel.child_token();

            handles.push(tokio::spawn(async move {
                let symbol = symbol_config.symbol.clone();
                let interval = symbol_config.interval.clone();
                let gateway =
                    Arc::new(OrderGateway::new(Arc::clone(&api), Arc::clone(&store)));

                // 지난 세션이 남긴 미해소 주문부터 해소
                match gateway.reconcile(&symbol).await {
                    Ok(0) => {}
                    Ok(settled) => info!(symbol = %symbol, settled, "기동 시 미해소 주문 정리"),
                    Err(e) => warn!(symbol = %symbol, error = %e, "기동 시 주문 정리 실패"),
                }

                let mut coordinator = match ExecutionCoordinator::new(
                    symbol_config,
                    Arc::clone(&api),
                    gateway,
                    store,
                    alerts,
                    latency_warn_ms,
                )
                .await
                {
                    Ok(coordinator) => coordinator,
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "코디네이터 초기화 실패");
                        return;
                    }
                };

                let mut feed = KlineFeed::new(api, symbol.clone(), interval);
                match feed.backfill(WARMUP_BARS).await {
                    Ok(bars) => coordinator.warm_up(&bars),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "과거 봉 수집 실패, 워밍업 생략")
                    }
                }

                run_symbol_worker(feed, coordinator, params, cancel).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "워커 비정상 종료");
            }
        }
        info!("엔진 종료");
    }
}
