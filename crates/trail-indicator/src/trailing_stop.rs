//! ATR 트레일링 스탑 (4분기 규칙).

use rust_decimal::Decimal;

/// 트레일링 스탑 기준 추세 방향.
///
/// 가격(src)이 스탑을 상향 돌파한 뒤에는 `Up`, 하향 돌파한 뒤에는 `Down`,
/// 첫 돌파 전에는 `Flat`입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    /// 부호 표현 (+1 / −1 / 0).
    pub fn as_i8(&self) -> i8 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
            Direction::Flat => 0,
        }
    }
}

/// 봉 하나를 반영한 트레일링 스탑 갱신 결과.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStopUpdate {
    /// 갱신된 스탑 가격
    pub stop: Decimal,
    /// 갱신된 추세 방향
    pub direction: Direction,
    /// 이번 봉에서 src가 스탑을 상향 돌파했는지
    pub crossed_above: bool,
    /// 이번 봉에서 src가 스탑을 하향 돌파했는지
    pub crossed_below: bool,
}

/// ATR 트레일링 스탑 증분 계산기.
///
/// `nLoss = keyValue × ATR`를 입력으로 받아 4분기 규칙으로 스탑을 갱신합니다:
///
/// ```text
/// src > prevStop && prevSrc > prevStop  →  stop = max(prevStop, src − nLoss)
/// src < prevStop && prevSrc < prevStop  →  stop = min(prevStop, src + nLoss)
/// src > prevStop                        →  stop = src − nLoss
/// 그 외                                 →  stop = src + nLoss
/// ```
///
/// 첫 호출은 `stop = src − nLoss` (nLoss ≤ 0이면 `src`)로 초기화합니다.
/// 돌파 판정은 신호용 가격(= `EMA(src, 1)`, 곧 src 자신)과 스탑의
/// 전봉/현재봉 비교로 이뤄집니다.
#[derive(Debug, Clone)]
pub struct AtrTrailingStop {
    prev_src: Option<Decimal>,
    stop: Option<Decimal>,
    direction: Direction,
}

impl Default for AtrTrailingStop {
    fn default() -> Self {
        Self::new()
    }
}

impl AtrTrailingStop {
    /// 새 계산기 생성.
    pub fn new() -> Self {
        Self {
            prev_src: None,
            stop: None,
            direction: Direction::Flat,
        }
    }

    /// 현재 스탑 가격. 첫 갱신 전에는 `None`.
    pub fn stop(&self) -> Option<Decimal> {
        self.stop
    }

    /// 현재 추세 방향.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 새 봉의 src와 nLoss를 반영.
    ///
    /// ATR 워밍업이 끝난 뒤부터 호출해야 합니다 (엔진이 보장).
    pub fn update(&mut self, src: Decimal, n_loss: Decimal) -> TrailingStopUpdate {
        let n_loss = n_loss.max(Decimal::ZERO);

        let (prev_src, prev_stop) = match (self.prev_src, self.stop) {
            (Some(ps), Some(pt)) => (ps, pt),
            _ => {
                // 첫 봉 초기화
                let stop = if n_loss > Decimal::ZERO {
                    src - n_loss
                } else {
                    src
                };
                self.prev_src = Some(src);
                self.stop = Some(stop);
                self.direction = Direction::Flat;
                return TrailingStopUpdate {
                    stop,
                    direction: Direction::Flat,
                    crossed_above: false,
                    crossed_below: false,
                };
            }
        };

        let stop = if src > prev_stop && prev_src > prev_stop {
            prev_stop.max(src - n_loss)
        } else if src < prev_stop && prev_src < prev_stop {
            prev_stop.min(src + n_loss)
        } else if src > prev_stop {
            src - n_loss
        } else {
            src + n_loss
        };

        // 방향 전환은 전봉 스탑 기준
        if prev_src < prev_stop && src > prev_stop {
            self.direction = Direction::Up;
        } else if prev_src > prev_stop && src < prev_stop {
            self.direction = Direction::Down;
        }

        let crossed_above = src > stop && prev_src <= prev_stop;
        let crossed_below = stop > src && prev_stop <= prev_src;

        self.prev_src = Some(src);
        self.stop = Some(stop);

        TrailingStopUpdate {
            stop,
            direction: self.direction,
            crossed_above,
            crossed_below,
        }
    }
}
