//! 거래소 연동 계층.
//!
//! 이 crate는 다음을 제공합니다:
//! - [`FuturesApi`] - 선물 거래소 REST 추상화 trait
//! - [`BinanceFuturesClient`] - Binance USDT-M 선물 커넥터 (HMAC 서명)
//! - [`OrderGateway`] - 멱등 주문 게이트웨이 (키당 주문 최대 1건 보장)
//! - [`with_retry`] - 지수 백오프 재시도 유틸리티
//! - [`MockFuturesApi`] - 테스트용 인메모리 거래소
//!
//! 주문 발행은 반드시 [`OrderGateway`]를 거쳐야 합니다. 커넥터를 직접
//! 호출하면 재시도 중 중복 주문이 생길 수 있습니다.

pub mod api;
pub mod connector;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod quantize;
pub mod retry;

// 주요 타입 재내보내기
pub use api::{ExchangeOrder, FuturesApi, Kline, PositionInfo};
pub use connector::{BinanceFuturesClient, BinanceFuturesConfig};
pub use error::ExchangeError;
pub use gateway::{idempotency_key, GatewayError, OrderGateway};
pub use provider::{MockFailure, MockFuturesApi};
pub use quantize::{quantize_price, quantize_qty};
pub use retry::{with_retry, RetryConfig};
