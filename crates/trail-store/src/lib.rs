//! 영속 상태 저장소.
//!
//! 포지션, 거래 이력, 주문 멱등성 키 맵을 키 단위 JSON 문서로 보관합니다.
//! 키마다 독립된 문서이므로 서로 다른 심볼의 워커가 동시에 flush해도
//! 갱신이 유실되지 않습니다.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// 저장소 에러.
#[derive(Error, Debug)]
pub enum StoreError {
    /// 파일 입출력 실패
    #[error("입출력 오류: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 직렬화/역직렬화 실패
    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 파일명으로 쓸 수 없는 키
    #[error("허용되지 않는 키: {0}")]
    InvalidKey(String),

    /// 테스트용 주입 실패
    #[error("저장 실패 (주입됨)")]
    Injected,
}

/// 키-값 상태 저장소.
///
/// 값은 JSON 문서입니다. 구현체는 `save`가 반환되기 전에 내용이
/// 디스크(또는 대체 매체)에 원자적으로 반영되는 것을 보장해야 합니다.
/// 부분 쓰기가 기존 문서를 깨뜨리면 안 됩니다.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// 키의 문서를 읽는다. 없으면 `Ok(None)`.
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// 키의 문서를 통째로 교체한다.
    async fn save(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// 키의 문서를 삭제한다. 없어도 성공.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// 존재하는 모든 키.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// 키가 파일명으로 안전한지 검사.
///
/// 영숫자와 `.`, `_`, `-`만 허용합니다. 경로 구분자가 섞인 키로
/// 저장 디렉터리를 벗어나는 것을 막습니다.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("positions-ETHUSDT").is_ok());
        assert!(validate_key("orders-BTC_USDT.v2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("키").is_err());
    }
}
