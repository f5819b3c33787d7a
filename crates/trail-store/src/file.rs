//! JSON 파일 기반 저장소.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{validate_key, StateStore, StoreError};

/// 키마다 `<dir>/<key>.json` 파일 하나를 쓰는 저장소.
///
/// 쓰기는 임시 파일에 완성한 뒤 rename으로 교체합니다. rename은 같은
/// 파일시스템 안에서 원자적이므로 중간에 죽어도 기존 문서는 온전합니다.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    /// 임시 파일 경로 충돌 방지용 쓰기 직렬화
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// 지정한 디렉터리를 쓰는 저장소 생성. 디렉터리는 첫 저장 때 만들어집니다.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// 저장 디렉터리.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        let content = serde_json::to_vec_pretty(&value)?;

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, &content).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key, bytes = content.len(), "상태 저장 완료");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());

        let doc = json!({ "side": "LONG", "entry_price": "100.5" });
        store.save("positions-ETHUSDT", doc.clone()).await.unwrap();

        let loaded = store.load("positions-ETHUSDT").await.unwrap();
        assert_eq!(loaded, Some(doc));
    }

    #[tokio::test]
    async fn test_load_missing_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());
        assert_eq!(store.load("positions-XRPUSDT").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_replaces_whole_document() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());

        store.save("k", json!({ "a": 1, "b": 2 })).await.unwrap();
        store.save("k", json!({ "a": 3 })).await.unwrap();

        assert_eq!(store.load("k").await.unwrap(), Some(json!({ "a": 3 })));
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());
        store.save("k", json!(1)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_and_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());

        store.save("orders-A", json!(1)).await.unwrap();
        store.save("orders-B", json!(2)).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["orders-A", "orders-B"]);

        store.remove("orders-A").await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["orders-B"]);

        // 없는 키 삭제는 성공
        store.remove("orders-A").await.unwrap();
    }

    #[tokio::test]
    async fn test_path_traversal_key_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path());
        let err = store.save("../evil", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_keys_on_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(tmp.path().join("not-created-yet"));
        assert!(store.keys().await.unwrap().is_empty());
    }
}
