// ============================================================================
// SProx - 属性缓存存储
// ============================================================================
//
// 文件: src/plugins/cache.rs
// 职责: 按目标缓存 grains / pillar 的存储接口与实现
// 边界:
//   - ✅ CacheStore 接口（fetch / store）
//   - ✅ JSON 文件存储（<cache_dir>/<bank>/<key>.json）
//   - ✅ 内存存储
//   - ❌ 不应包含缓存合并策略（由 inventory 门面和 worker 决定）
//
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// 目标属性缓存所用的键
pub const CACHE_DATA_KEY: &str = "data";

/// 目标属性缓存所在的命名空间
pub fn cache_bank(target_id: &str) -> String {
    format!("minions/{}", target_id)
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache entry '{path}': {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 缓存存储接口
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn fetch(&self, bank: &str, key: &str) -> Result<Option<Value>, CacheError>;

    async fn store(&self, bank: &str, key: &str, value: &Value) -> Result<(), CacheError>;
}

/// JSON 文件缓存
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    root: PathBuf,
}

impl JsonFileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, bank: &str, key: &str) -> PathBuf {
        self.root.join(bank).join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStore for JsonFileCache {
    async fn fetch(&self, bank: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(bank, key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: path.display().to_string(),
                source,
            })
    }

    async fn store(&self, bank: &str, key: &str, value: &Value) -> Result<(), CacheError> {
        let path = self.entry_path(bank, key);
        let io_err = |source| CacheError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let content = serde_json::to_string_pretty(value).map_err(|source| CacheError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        tokio::fs::write(&path, content).await.map_err(io_err)?;
        Ok(())
    }
}

/// 进程内缓存
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(String, String), Value>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn fetch(&self, bank: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(bank.to_string(), key.to_string())).cloned())
    }

    async fn store(&self, bank: &str, key: &str, value: &Value) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert((bank.to_string(), key.to_string()), value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_json_file_cache_store_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path());

        assert_eq!(cache.fetch(&cache_bank("r1"), CACHE_DATA_KEY).await.unwrap(), None);

        let data = json!({"grains": {"os": "junos"}});
        cache.store(&cache_bank("r1"), CACHE_DATA_KEY, &data).await.unwrap();

        assert!(dir.path().join("minions/r1/data.json").exists());
        assert_eq!(
            cache.fetch(&cache_bank("r1"), CACHE_DATA_KEY).await.unwrap(),
            Some(data)
        );
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("minions/r1");
        std::fs::create_dir_all(&entry).unwrap();
        std::fs::write(entry.join("data.json"), "{not json").unwrap();

        let cache = JsonFileCache::new(dir.path());
        assert!(matches!(
            cache.fetch(&cache_bank("r1"), CACHE_DATA_KEY).await,
            Err(CacheError::Corrupt { .. })
        ));
    }
}
