//! 확정 봉 수집.
//!
//! 거래소 kline 폴링 응답에서 마감된 봉만 골라 도메인 [`Bar`]로 바꿉니다.
//! 진행 중인 봉과 이미 반환한 봉은 걸러지므로, 호출자는 결과를 그대로
//! 순서대로 처리하면 됩니다 (open_time 기준 단조 증가).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use trail_core::Bar;
use trail_exchange::{ExchangeError, FuturesApi, Kline};

/// 심볼 하나의 확정 봉 피드.
pub struct KlineFeed {
    api: Arc<dyn FuturesApi>,
    symbol: String,
    interval: String,
    /// 마지막으로 반환한 봉의 open_time
    last_open_time: Option<DateTime<Utc>>,
}

impl KlineFeed {
    pub fn new(
        api: Arc<dyn FuturesApi>,
        symbol: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        Self {
            api,
            symbol: symbol.into(),
            interval: interval.into(),
            last_open_time: None,
        }
    }

    /// 과거 확정 봉 일괄 수집 (지표 워밍업용).
    pub async fn backfill(&mut self, limit: u32) -> Result<Vec<Bar>, ExchangeError> {
        let klines = self
            .api
            .fetch_klines(&self.symbol, &self.interval, limit)
            .await?;
        let bars = self.take_new_closed(&klines, Utc::now());
        info!(
            symbol = %self.symbol,
            interval = %self.interval,
            bars = bars.len(),
            "과거 봉 수집"
        );
        Ok(bars)
    }

    /// 새로 확정된 봉 폴링. 새 봉이 없으면 빈 목록.
    pub async fn poll(&mut self, limit: u32) -> Result<Vec<Bar>, ExchangeError> {
        let klines = self
            .api
            .fetch_klines(&self.symbol, &self.interval, limit)
            .await?;
        let bars = self.take_new_closed(&klines, Utc::now());
        if !bars.is_empty() {
            debug!(symbol = %self.symbol, bars = bars.len(), "새 확정 봉");
        }
        Ok(bars)
    }

    fn take_new_closed(&mut self, klines: &[Kline], now: DateTime<Utc>) -> Vec<Bar> {
        let mut bars = Vec::new();
        for kline in klines {
            if !kline.is_closed(now) {
                continue;
            }
            if self.last_open_time.map_or(false, |t| kline.open_time <= t) {
                continue;
            }
            bars.push(kline.to_bar(self.symbol.clone()));
            self.last_open_time = Some(kline.open_time);
        }
        bars
    }
}
