//! 거래소 API 오류 타입.
//!
//! 재시도 계층과 OrderGateway가 오류를 분류할 수 있도록
//! `is_retryable` / `is_fatal` / `retry_delay_ms` 판정을 함께 제공합니다.

use thiserror::Error;

// Binance 검증 계열 오류 코드.
// -1013(필터 위반), -1111(정밀도 초과), -2010(주문 거부), -4014(틱사이즈 위반)
const VALIDATION_CODES: [i64; 4] = [-1013, -1111, -2010, -4014];

// 주문 미존재 코드. -2011(취소 대상 없음), -2013(조회 대상 없음)
const NOT_FOUND_CODES: [i64; 2] = [-2011, -2013];

/// 중복 클라이언트 주문 id 오류 코드.
const DUPLICATE_CLIENT_ORDER_ID_CODE: i64 = -4116;

/// 거래소 호출 오류.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 네트워크 연결 실패 (재시도 가능)
    #[error("네트워크 오류: {0}")]
    NetworkError(String),

    /// 요청 시간 초과. 주문 요청이라면 서버측 결과를 알 수 없는 상태.
    #[error("요청 시간 초과: {0}")]
    Timeout(String),

    /// Rate Limit 초과 (HTTP 429)
    #[error("Rate Limit 초과 (재시도 대기: {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// 거래소 서버 오류 (HTTP 5xx, 재시도 가능)
    #[error("서버 오류 (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// 거래소 비즈니스 오류 응답 (`{code, msg}` 봉투)
    #[error("API 오류 (코드 {code}): {message}")]
    ApiError { code: i64, message: String },

    /// 가격/수량 검증 실패. 같은 요청을 반복해도 동일하게 실패합니다.
    #[error("주문 검증 실패: {0}")]
    InvalidOrder(String),

    /// API 키 인증 실패
    #[error("인증 실패: {0}")]
    Unauthorized(String),

    /// 응답 본문 파싱 실패
    #[error("응답 파싱 실패: {0}")]
    ParseError(String),

    /// 조회/취소 대상 주문 없음
    #[error("주문 없음: {0}")]
    OrderNotFound(String),
}

impl ExchangeError {
    /// 재시도로 해결될 가능성이 있는 오류인지.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::NetworkError(_)
                | ExchangeError::Timeout(_)
                | ExchangeError::RateLimited { .. }
                | ExchangeError::ServerError { .. }
        )
    }

    /// 재시도 자체가 무의미한 치명적 오류인지.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExchangeError::Unauthorized(_))
    }

    /// 오류에 지정된 재시도 대기 시간 (Rate Limit의 Retry-After).
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            ExchangeError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// 중복 클라이언트 주문 id 거절인지.
    ///
    /// 거래소가 같은 clientOrderId를 이미 접수한 경우로,
    /// 게이트웨이는 조회로 기존 주문을 찾아 성공으로 처리합니다.
    pub fn is_duplicate_client_order_id(&self) -> bool {
        match self {
            ExchangeError::ApiError { code, message } => {
                *code == DUPLICATE_CLIENT_ORDER_ID_CODE
                    || message.to_lowercase().contains("duplicate")
            }
            _ => false,
        }
    }

    /// Binance `{code, msg}` 오류 봉투를 분류합니다.
    pub fn from_api_code(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if VALIDATION_CODES.contains(&code) {
            ExchangeError::InvalidOrder(format!("코드 {}: {}", code, message))
        } else if NOT_FOUND_CODES.contains(&code) {
            ExchangeError::OrderNotFound(message)
        } else {
            ExchangeError::ApiError { code, message }
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExchangeError::Timeout(e.to_string())
        } else {
            ExchangeError::NetworkError(e.to_string())
        }
    }
}
