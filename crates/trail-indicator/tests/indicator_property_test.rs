//! 지표 불변식 프로퍼티 테스트.
//!
//! 1. 증분 ATR == 배치 재계산
//! 2. 추세 유지 구간에서 트레일링 스탑은 느슨해지지 않음
//! 3. Heikin-Ashi 캔들의 고저가 몸통을 감쌈

use chrono::{Duration, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use trail_core::Bar;
use trail_indicator::{Atr, AtrTrailingStop, HeikinAshi};

// ==================== 전략 ====================

/// 센트 단위 가격 (10.00 ~ 5000.00)
fn arb_price_cents() -> impl Strategy<Value = i64> {
    1_000i64..500_000
}

/// (시가, 고가, 저가, 종가) 봉 하나
fn arb_ohlc() -> impl Strategy<Value = (Decimal, Decimal, Decimal, Decimal)> {
    (arb_price_cents(), arb_price_cents(), 0i64..5_000, 0i64..900).prop_map(
        |(o, c, up, down)| {
            let open = Decimal::new(o, 2);
            let close = Decimal::new(c, 2);
            let high = open.max(close) + Decimal::new(up, 2);
            let low = open.min(close) - Decimal::new(down, 2);
            (open, high, low, close)
        },
    )
}

// ==================== 배치 참조 구현 ====================

/// 시계열 전체를 한 번에 계산하는 ATR 참조 구현.
fn reference_atr(bars: &[(Decimal, Decimal, Decimal, Decimal)], period: u32) -> Vec<Option<Decimal>> {
    let p = period.max(1);
    let pd = Decimal::from(p);

    let mut prev_close: Option<Decimal> = None;
    let mut trs: Vec<Decimal> = Vec::with_capacity(bars.len());
    for (_, high, low, close) in bars {
        let tr = match prev_close {
            Some(pc) => (*high - *low).max((*high - pc).abs()).max((*low - pc).abs()),
            None => *high - *low,
        };
        trs.push(tr);
        prev_close = Some(*close);
    }

    let mut out = Vec::with_capacity(trs.len());
    let mut atr: Option<Decimal> = None;
    for (i, tr) in trs.iter().enumerate() {
        atr = match atr {
            Some(prev) => Some((prev * (pd - Decimal::ONE) + *tr) / pd),
            None if (i as u32) + 1 >= p => {
                Some(trs[..p as usize].iter().copied().sum::<Decimal>() / pd)
            }
            None => None,
        };
        out.push(atr);
    }
    out
}

// ==================== 1. ATR ====================

proptest! {
    /// 증분 계산기는 배치 재계산과 봉마다 정확히 일치한다.
    #[test]
    fn test_incremental_atr_matches_batch_reference(
        bars in prop::collection::vec(arb_ohlc(), 1..60),
        period in 1u32..20,
    ) {
        let reference = reference_atr(&bars, period);
        let mut atr = Atr::new(period);
        for (i, (_, high, low, close)) in bars.iter().enumerate() {
            let got = atr.update(*high, *low, *close);
            prop_assert_eq!(got, reference[i], "bar {}", i);
        }
    }
}

// ==================== 2. 트레일링 스탑 ====================

proptest! {
    /// 전봉/현재봉 src가 모두 스탑 위(아래)면 스탑은 내려가지(올라가지) 않는다.
    #[test]
    fn test_trailing_stop_never_loosens_inside_trend(
        srcs in prop::collection::vec(arb_price_cents(), 2..60),
        n_loss_cents in 1i64..20_000,
    ) {
        let n_loss = Decimal::new(n_loss_cents, 2);
        let mut ts = AtrTrailingStop::new();
        let mut prev: Option<(Decimal, Decimal)> = None;

        for cents in srcs {
            let src = Decimal::new(cents, 2);
            let update = ts.update(src, n_loss);
            if let Some((prev_src, prev_stop)) = prev {
                if src > prev_stop && prev_src > prev_stop {
                    prop_assert!(
                        update.stop >= prev_stop,
                        "상승 유지 구간에서 스탑 하락: {} < {}",
                        update.stop,
                        prev_stop
                    );
                } else if src < prev_stop && prev_src < prev_stop {
                    prop_assert!(
                        update.stop <= prev_stop,
                        "하락 유지 구간에서 스탑 상승: {} > {}",
                        update.stop,
                        prev_stop
                    );
                }
            }
            prev = Some((src, update.stop));
        }
    }
}

// ==================== 3. Heikin-Ashi ====================

proptest! {
    /// haLow ≤ min(haOpen, haClose) 이고 haHigh ≥ max(haOpen, haClose).
    #[test]
    fn test_heikin_ashi_wraps_body(bars in prop::collection::vec(arb_ohlc(), 1..40)) {
        let mut ha = HeikinAshi::new();
        let t0 = Utc::now();
        for (i, (open, high, low, close)) in bars.iter().enumerate() {
            let bar = Bar::new(
                "BTCUSDT",
                t0 + Duration::minutes(i as i64),
                *open,
                *high,
                *low,
                *close,
                Decimal::from(100),
            );
            let candle = ha.update(&bar);
            prop_assert!(candle.low <= candle.open.min(candle.close));
            prop_assert!(candle.high >= candle.open.max(candle.close));
            prop_assert!(candle.low <= candle.high);
        }
    }
}
