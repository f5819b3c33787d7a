//! Binance USDT-M 선물 REST 커넥터.
//!
//! 서명이 필요한 엔드포인트는 쿼리 문자열에 HMAC-SHA256 서명을 붙이고
//! `X-MBX-APIKEY` 헤더로 키를 전달합니다. 진입은 MARKET, 익절/손절은
//! closePosition 트리거 주문(TAKE_PROFIT_MARKET / STOP_MARKET,
//! MARK_PRICE 기준, 가격 보호 켜짐)으로 제출합니다.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;
use trail_core::domain::{IntentTag, OrderIntent};

use crate::api::{ExchangeOrder, FuturesApi, Kline, PositionInfo};
use crate::ExchangeError;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";
const DEFAULT_RECV_WINDOW_MS: u64 = 5_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// ==================== 설정 ====================

/// Binance 선물 커넥터 설정.
#[derive(Clone)]
pub struct BinanceFuturesConfig {
    /// API 키 (X-MBX-APIKEY 헤더)
    pub api_key: String,
    /// 서명용 시크릿 키
    pub secret_key: SecretString,
    /// REST base URL. 테스트넷이나 목 서버로 교체 가능.
    pub base_url: String,
    /// 서명 요청의 recvWindow (ms)
    pub recv_window_ms: u64,
    /// HTTP 요청 타임아웃
    pub timeout: Duration,
}

impl std::fmt::Debug for BinanceFuturesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceFuturesConfig")
            .field("api_key", &"***")
            .field("secret_key", &"***")
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}

impl BinanceFuturesConfig {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: SecretString::from(secret_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            recv_window_ms: DEFAULT_RECV_WINDOW_MS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// 환경 변수 `BINANCE_API_KEY` / `BINANCE_SECRET_KEY`에서 로드.
    ///
    /// # Errors
    ///
    /// 변수가 없으면 `ExchangeError::Unauthorized`.
    pub fn from_env() -> Result<Self, ExchangeError> {
        let api_key = std::env::var("BINANCE_API_KEY")
            .map_err(|_| ExchangeError::Unauthorized("환경 변수 BINANCE_API_KEY 없음".to_string()))?;
        let secret_key = std::env::var("BINANCE_SECRET_KEY").map_err(|_| {
            ExchangeError::Unauthorized("환경 변수 BINANCE_SECRET_KEY 없음".to_string())
        })?;
        Ok(Self::new(api_key, secret_key))
    }

    /// base URL 교체 (테스트넷/목 서버용).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

// ==================== 응답 타입 ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    order_id: u64,
    client_order_id: String,
    symbol: String,
    status: String,
    #[serde(default)]
    avg_price: Option<Decimal>,
    #[serde(default)]
    executed_qty: Option<Decimal>,
    #[serde(default)]
    update_time: Option<i64>,
}

impl RawOrder {
    fn into_order(self) -> ExchangeOrder {
        ExchangeOrder {
            exchange_order_id: self.order_id.to_string(),
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            status: self.status,
            // 미체결 주문은 avgPrice/executedQty가 "0"으로 내려옴
            avg_price: self.avg_price.filter(|p| !p.is_zero()),
            executed_qty: self.executed_qty.filter(|q| !q.is_zero()),
            updated_at: self
                .update_time
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    symbol: String,
    position_amt: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    unrealized_pnl: Decimal,
}

impl RawPosition {
    fn into_position(self) -> PositionInfo {
        PositionInfo {
            symbol: self.symbol,
            position_amt: self.position_amt,
            entry_price: self.entry_price,
            mark_price: self.mark_price,
            unrealized_pnl: self.unrealized_pnl,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    code: i64,
    msg: String,
}

// ==================== 클라이언트 ====================

/// Binance USDT-M 선물 REST 클라이언트.
pub struct BinanceFuturesClient {
    client: reqwest::Client,
    config: BinanceFuturesConfig,
}

impl BinanceFuturesClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    ///
    /// HTTP 클라이언트 초기화 실패 시 `ExchangeError::NetworkError`.
    pub fn new(config: BinanceFuturesConfig) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.secret_key.expose_secret().as_bytes())
            .expect("HMAC은 임의 길이 키를 허용");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// recvWindow/timestamp를 붙인 뒤 전체 쿼리에 서명합니다.
    fn signed_query(&self, mut params: Vec<(&'static str, String)>) -> Result<String, ExchangeError> {
        params.push(("recvWindow", self.config.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| ExchangeError::ParseError(format!("쿼리 직렬화 실패: {}", e)))?;
        let signature = self.sign(&query);
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        path: &str,
        query: &str,
        with_key: bool,
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}?{}", self.config.base_url, path, query);
        let mut builder = self.client.request(method, &url);
        if with_key {
            builder = builder.header("X-MBX-APIKEY", &self.config.api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let retry_after_ms = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str::<T>(&text).map_err(|e| {
                ExchangeError::ParseError(format!("응답 파싱 실패: {}. 본문: {}", e, text))
            });
        }

        Err(classify_http_error(status.as_u16(), retry_after_ms, &text))
    }
}

/// HTTP 오류 응답을 ExchangeError로 분류합니다.
fn classify_http_error(status: u16, retry_after_ms: Option<u64>, body: &str) -> ExchangeError {
    match status {
        401 | 403 => ExchangeError::Unauthorized(body.to_string()),
        // 418은 Binance의 반복 위반 IP 차단 응답
        429 | 418 => ExchangeError::RateLimited { retry_after_ms },
        500..=599 => ExchangeError::ServerError {
            status,
            message: body.to_string(),
        },
        _ => match serde_json::from_str::<ApiErrorEnvelope>(body) {
            Ok(envelope) => ExchangeError::from_api_code(envelope.code, envelope.msg),
            Err(_) => ExchangeError::ApiError {
                code: 0,
                message: format!("HTTP {}: {}", status, body),
            },
        },
    }
}

fn parse_decimal(value: &serde_json::Value, field: &str) -> Result<Decimal, ExchangeError> {
    value
        .as_str()
        .and_then(|s| Decimal::from_str(s).ok())
        .ok_or_else(|| ExchangeError::ParseError(format!("{} 필드 파싱 실패: {}", field, value)))
}

/// 봉 응답 배열 한 행을 Kline으로 변환합니다.
/// 형식: [openTime, open, high, low, close, volume, closeTime, ...]
fn parse_kline_row(row: &[serde_json::Value]) -> Result<Kline, ExchangeError> {
    if row.len() < 7 {
        return Err(ExchangeError::ParseError(format!(
            "봉 응답 필드 부족: {}개",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| ExchangeError::ParseError(format!("openTime 파싱 실패: {}", row[0])))?;
    let close_time = row[6]
        .as_i64()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| ExchangeError::ParseError(format!("closeTime 파싱 실패: {}", row[6])))?;

    Ok(Kline {
        open_time,
        open: parse_decimal(&row[1], "open")?,
        high: parse_decimal(&row[2], "high")?,
        low: parse_decimal(&row[3], "low")?,
        close: parse_decimal(&row[4], "close")?,
        volume: parse_decimal(&row[5], "volume")?,
        close_time,
    })
}

// ==================== FuturesApi 구현 ====================

#[async_trait]
impl FuturesApi for BinanceFuturesClient {
    async fn place_order(&self, intent: &OrderIntent) -> Result<ExchangeOrder, ExchangeError> {
        let order_type = match intent.tag {
            IntentTag::Entry | IntentTag::PartialClose | IntentTag::FullClose => "MARKET",
            IntentTag::TakeProfitClose => "TAKE_PROFIT_MARKET",
            IntentTag::StopClose => "STOP_MARKET",
        };

        let mut params: Vec<(&'static str, String)> = vec![
            ("symbol", intent.symbol.clone()),
            ("side", intent.order_side.to_string()),
            ("type", order_type.to_string()),
            ("newClientOrderId", intent.client_order_id.clone()),
            ("newOrderRespType", "RESULT".to_string()),
        ];

        match intent.tag {
            IntentTag::Entry | IntentTag::PartialClose | IntentTag::FullClose => {
                let qty = intent.qty.ok_or_else(|| {
                    ExchangeError::InvalidOrder("시장가 주문에 수량 없음".to_string())
                })?;
                params.push(("quantity", qty.to_string()));
                if intent.reduce_only {
                    params.push(("reduceOnly", "true".to_string()));
                }
            }
            IntentTag::TakeProfitClose | IntentTag::StopClose => {
                let trigger = intent.trigger_price.ok_or_else(|| {
                    ExchangeError::InvalidOrder("트리거 주문에 트리거 가격 없음".to_string())
                })?;
                params.push(("stopPrice", trigger.to_string()));
                params.push(("closePosition", "true".to_string()));
                params.push(("workingType", "MARK_PRICE".to_string()));
                params.push(("priceProtect", "TRUE".to_string()));
            }
        }

        debug!(
            symbol = %intent.symbol,
            tag = %intent.tag,
            client_order_id = %intent.client_order_id,
            "주문 제출"
        );

        let query = self.signed_query(params)?;
        let raw: RawOrder = self
            .request(Method::POST, "/fapi/v1/order", &query, true)
            .await?;
        Ok(raw.into_order())
    }

    async fn fetch_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<ExchangeOrder>, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        let query = self.signed_query(params)?;

        match self
            .request::<RawOrder>(Method::GET, "/fapi/v1/order", &query, true)
            .await
        {
            Ok(raw) => Ok(Some(raw.into_order())),
            Err(ExchangeError::OrderNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ExchangeError> {
        let params = vec![("symbol", symbol.to_string())];
        let query = self.signed_query(params)?;
        let raw: Vec<RawOrder> = self
            .request(Method::GET, "/fapi/v1/openOrders", &query, true)
            .await?;
        Ok(raw.into_iter().map(RawOrder::into_order).collect())
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<(), ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", client_order_id.to_string()),
        ];
        let query = self.signed_query(params)?;
        let _: RawOrder = self
            .request(Method::DELETE, "/fapi/v1/order", &query, true)
            .await?;
        Ok(())
    }

    async fn fetch_positions(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<PositionInfo>, ExchangeError> {
        let mut params: Vec<(&'static str, String)> = Vec::new();
        if let Some(s) = symbol {
            params.push(("symbol", s.to_string()));
        }
        let query = self.signed_query(params)?;
        let raw: Vec<RawPosition> = self
            .request(Method::GET, "/fapi/v2/positionRisk", &query, true)
            .await?;
        Ok(raw.into_iter().map(RawPosition::into_position).collect())
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| ExchangeError::ParseError(format!("쿼리 직렬화 실패: {}", e)))?;

        // 봉 조회는 공개 엔드포인트라 서명이 필요 없음
        let rows: Vec<Vec<serde_json::Value>> = self
            .request(Method::GET, "/fapi/v1/klines", &query, false)
            .await?;
        rows.iter().map(|row| parse_kline_row(row)).collect()
    }

    fn exchange_name(&self) -> &str {
        "BinanceFutures"
    }
}
