//! 연속 손실 서킷 브레이커.
//!
//! 최근 청산 기록에서 매 호출 시 유도되는 판정이며 따로 저장되지 않습니다.
//! 연속 손실이 기준 횟수에 도달하면 신규 진입이 차단되고, 쿨다운이
//! 지나도 승리 거래(또는 수동 이력 정리)로 연속이 끊기기 전까지는
//! 무기한 차단으로 남습니다.

use chrono::{DateTime, Duration, Utc};
use trail_core::domain::TradeRecord;

/// 차단 판정 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeBlockState {
    /// 신규 진입 차단 여부
    pub blocked: bool,
    /// 사용자에게 보여줄 사유. 차단이 아니면 빈 문자열.
    pub reason: String,
    /// 남은 쿨다운 (분). 쿨다운이 끝난 무기한 차단은 `None`.
    pub cooldown_remaining: Option<f64>,
}

impl TradeBlockState {
    fn clear() -> Self {
        Self {
            blocked: false,
            reason: String::new(),
            cooldown_remaining: None,
        }
    }
}

/// 최근 `max_consecutive_losses`건이 전부 손실이면 진입을 차단합니다.
///
/// 마지막 손실이 `cooldown_minutes` 안이면 남은 쿨다운을 함께 보고하고,
/// 쿨다운이 지났으면 무기한 차단으로 보고합니다. 기록이 기준 횟수보다
/// 적거나 그 사이에 승리가 하나라도 있으면 차단하지 않습니다.
pub fn should_block_trades(
    history: &[TradeRecord],
    max_consecutive_losses: usize,
    cooldown_minutes: i64,
    now: DateTime<Utc>,
) -> TradeBlockState {
    if max_consecutive_losses == 0 || history.len() < max_consecutive_losses {
        return TradeBlockState::clear();
    }

    let recent = &history[history.len() - max_consecutive_losses..];
    if !recent.iter().all(TradeRecord::is_loss) {
        return TradeBlockState::clear();
    }

    // recent는 위 가드로 비어 있지 않음
    let Some(last) = recent.last() else {
        return TradeBlockState::clear();
    };
    let elapsed = now - last.exit_time;
    let cooldown = Duration::minutes(cooldown_minutes);

    if elapsed < cooldown {
        let remaining = (cooldown - elapsed).num_milliseconds() as f64 / 60_000.0;
        TradeBlockState {
            blocked: true,
            reason: format!(
                "연속 손실 {}회. 쿨다운 {:.1}분 남음",
                max_consecutive_losses, remaining
            ),
            cooldown_remaining: Some(remaining),
        }
    } else {
        TradeBlockState {
            blocked: true,
            reason: format!(
                "연속 손실 {}회. 신규 진입 차단 (승리 거래 전까지 유지)",
                max_consecutive_losses
            ),
            cooldown_remaining: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use trail_core::domain::{ExitReason, Side};

    /// `minutes_ago`분 전에 청산된 거래 기록.
    fn record(pnl_pct: Decimal, minutes_ago: i64, now: DateTime<Utc>) -> TradeRecord {
        let exit_time = now - Duration::minutes(minutes_ago);
        TradeRecord {
            symbol: "ETHUSDT".to_string(),
            side: Side::Long,
            entry_price: dec!(2000),
            exit_price: dec!(2000) * (Decimal::ONE + pnl_pct / Decimal::ONE_HUNDRED),
            pnl_pct,
            entry_time: exit_time - Duration::hours(2),
            exit_time,
            reason: ExitReason::TrailingStop,
        }
    }

    fn losses(count: usize, last_minutes_ago: i64, now: DateTime<Utc>) -> Vec<TradeRecord> {
        (0..count)
            .map(|i| {
                let age = last_minutes_ago + ((count - 1 - i) as i64) * 30;
                record(dec!(-1), age, now)
            })
            .collect()
    }

    #[test]
    fn test_not_blocked_with_fewer_records_than_limit() {
        let now = Utc::now();
        let history = losses(4, 10, now);
        let state = should_block_trades(&history, 5, 60, now);
        assert!(!state.blocked);
        assert!(state.reason.is_empty());
        assert!(state.cooldown_remaining.is_none());
    }

    #[test]
    fn test_all_losses_within_cooldown_reports_remaining() {
        let now = Utc::now();
        // 마지막 손실이 20분 전, 쿨다운 60분 → 약 40분 남음
        let history = losses(5, 20, now);
        let state = should_block_trades(&history, 5, 60, now);
        assert!(state.blocked);
        let remaining = state.cooldown_remaining.expect("쿨다운이 남아 있어야 함");
        assert!((remaining - 40.0).abs() < 0.1, "remaining={remaining}");
        assert!(state.reason.contains("쿨다운"));
    }

    #[test]
    fn test_all_losses_after_cooldown_blocks_indefinitely() {
        let now = Utc::now();
        // 마지막 손실이 90분 전, 쿨다운 60분 → 무기한 차단
        let history = losses(5, 90, now);
        let state = should_block_trades(&history, 5, 60, now);
        assert!(state.blocked);
        assert!(state.cooldown_remaining.is_none());
        assert!(state.reason.contains("진입 차단"));
    }

    #[test]
    fn test_single_win_in_window_clears_block() {
        let now = Utc::now();
        let mut history = losses(5, 10, now);
        // 최근 5건 중 하나를 승리로 교체
        history[2] = record(dec!(0.8), 70, now);
        let state = should_block_trades(&history, 5, 60, now);
        assert!(!state.blocked);
        assert!(state.reason.is_empty());
    }

    #[test]
    fn test_breakeven_trade_is_not_a_loss() {
        let now = Utc::now();
        let mut history = losses(5, 10, now);
        history[4] = record(dec!(0), 10, now);
        let state = should_block_trades(&history, 5, 60, now);
        assert!(!state.blocked);
    }

    #[test]
    fn test_only_trailing_window_is_inspected() {
        let now = Utc::now();
        // 오래된 승리 + 최근 5연속 손실 → 차단
        let mut history = vec![record(dec!(2), 600, now)];
        history.extend(losses(5, 15, now));
        let state = should_block_trades(&history, 5, 60, now);
        assert!(state.blocked);
    }
}
