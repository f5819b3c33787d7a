//! 거래량 비율 계산기.

use rust_decimal::Decimal;
use std::collections::VecDeque;

/// 거래량 / 이동평균 비율 계산기.
///
/// `ratio = volume / SMA(volume, window)` (현재 봉 포함).
/// 급증 청산 판정(`ratio ≥ threshold`)과 레짐 게이트에 사용됩니다.
/// 창이 차기 전에는 `None`을 돌려줍니다.
#[derive(Debug, Clone)]
pub struct VolumeRatio {
    window: usize,
    samples: VecDeque<Decimal>,
    sum: Decimal,
}

impl VolumeRatio {
    /// 새 계산기 생성. `window`는 1 이상이어야 합니다.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window + 1),
            sum: Decimal::ZERO,
        }
    }

    /// 새 거래량을 반영하고 비율을 반환.
    pub fn update(&mut self, volume: Decimal) -> Option<Decimal> {
        self.samples.push_back(volume);
        self.sum += volume;
        if self.samples.len() > self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        if self.samples.len() < self.window {
            return None;
        }
        let mean = self.sum / Decimal::from(self.window as u64);
        if mean.is_zero() {
            return None;
        }
        Some(volume / mean)
    }
}
