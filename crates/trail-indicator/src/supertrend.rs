//! SuperTrend 라인.

use rust_decimal::Decimal;

/// SuperTrend 증분 계산기.
///
/// `band = ATR × factor`, `trendUp = hl2 − band`, `trendDown = hl2 + band`.
/// 첫 봉은 `trendDown`으로 시작하고, 이후:
///
/// ```text
/// candidate = close > prevLine ? max(trendUp, prevLine) : min(trendDown, prevLine)
/// line      = close <= candidate ? trendDown : trendUp
/// ```
///
/// 종가가 후보선 위에 있으면 하단 밴드(trendUp)에, 아래에 있으면 상단
/// 밴드(trendDown)에 스냅됩니다. 진입 신호에는 쓰이지 않고 알림과
/// 보조 판단에만 사용됩니다.
#[derive(Debug, Clone, Default)]
pub struct SuperTrend {
    prev_line: Option<Decimal>,
}

impl SuperTrend {
    /// 새 계산기 생성.
    pub fn new() -> Self {
        Self { prev_line: None }
    }

    /// 현재 라인 값. 첫 갱신 전에는 `None`.
    pub fn line(&self) -> Option<Decimal> {
        self.prev_line
    }

    /// 새 봉의 hl2/밴드/종가를 반영.
    pub fn update(&mut self, hl2: Decimal, band: Decimal, close: Decimal) -> Decimal {
        let trend_up = hl2 - band;
        let trend_down = hl2 + band;

        let line = match self.prev_line {
            None => trend_down,
            Some(prev_line) => {
                let candidate = if close > prev_line {
                    trend_up.max(prev_line)
                } else {
                    trend_down.min(prev_line)
                };
                if close <= candidate {
                    trend_down
                } else {
                    trend_up
                }
            }
        };

        self.prev_line = Some(line);
        line
    }
}
