//! 가격/수량 양자화.
//!
//! 거래소는 틱사이즈(가격 격자)와 스텝사이즈(수량 격자)를 벗어난 주문을
//! 검증 오류로 거절하므로, 주문 전에 항상 격자에 내림 정렬합니다.

use rust_decimal::Decimal;

use crate::ExchangeError;

/// 가격을 틱사이즈 격자로 내림.
///
/// # Errors
///
/// 틱사이즈가 0 이하면 `ExchangeError::InvalidOrder`.
pub fn quantize_price(price: Decimal, tick_size: Decimal) -> Result<Decimal, ExchangeError> {
    floor_to_step(price, tick_size)
        .ok_or_else(|| ExchangeError::InvalidOrder(format!("잘못된 틱사이즈: {}", tick_size)))
}

/// 수량을 스텝사이즈 격자로 내림.
///
/// # Errors
///
/// 스텝사이즈가 0 이하거나, 내림 결과가 0 이하(최소 주문 수량 미만)면
/// `ExchangeError::InvalidOrder`.
pub fn quantize_qty(qty: Decimal, step_size: Decimal) -> Result<Decimal, ExchangeError> {
    let quantized = floor_to_step(qty, step_size)
        .ok_or_else(|| ExchangeError::InvalidOrder(format!("잘못된 스텝사이즈: {}", step_size)))?;
    if quantized <= Decimal::ZERO {
        return Err(ExchangeError::InvalidOrder(format!(
            "수량 {}이 스텝사이즈 {} 미만",
            qty, step_size
        )));
    }
    Ok(quantized)
}

fn floor_to_step(value: Decimal, step: Decimal) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return None;
    }
    Some((value / step).floor() * step)
}
