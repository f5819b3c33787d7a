//! 인메모리 저장소 (테스트/페이퍼 모드용).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{validate_key, StateStore, StoreError};

/// HashMap 기반 저장소.
///
/// 프로세스가 죽으면 내용이 사라지므로 실거래에는 쓰지 않습니다.
/// `set_fail_saves`로 저장 실패를 주입해 영속화 실패 경로를 테스트할 수
/// 있습니다.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이후의 `save` 호출이 실패하도록 설정.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Injected);
        }
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_roundtrip_and_remove() {
        let store = MemoryStore::new();
        store.save("k", json!({ "v": 1 })).await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), Some(json!({ "v": 1 })));

        store.remove("k").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_injected_save_failure() {
        let store = MemoryStore::new();
        store.set_fail_saves(true);
        assert!(store.save("k", json!(1)).await.is_err());

        store.set_fail_saves(false);
        assert!(store.save("k", json!(1)).await.is_ok());
    }
}
