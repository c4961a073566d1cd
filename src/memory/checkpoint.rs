//! 记忆 checkpoint：带 TTL 的键值缓存 + 快照序列化
//!
//! CacheStore 抽象外部缓存（Redis 等）；默认提供内存实现，过期在读取时惰性判定。
//! MemoryCheckpointer 把账本快照序列化后写入缓存，恢复时反序列化整体覆盖。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::store::{MemorySnapshot, MemoryStore};

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// 键值缓存抽象；publish 用于通知订阅方 checkpoint 已更新
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CheckpointError>;

    async fn publish(&self, channel: &str, message: String) -> Result<(), CheckpointError>;
}

/// 进程内缓存实现（测试与单机运行）
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CheckpointError> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => {
                Ok(Some(value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CheckpointError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn publish(&self, _channel: &str, _message: String) -> Result<(), CheckpointError> {
        Ok(())
    }
}

/// 默认 checkpoint TTL（24 小时）
pub const DEFAULT_CHECKPOINT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 把记忆账本快照写入 / 读出缓存
pub struct MemoryCheckpointer<C: CacheStore> {
    cache: C,
    ttl: Duration,
}

impl<C: CacheStore> MemoryCheckpointer<C> {
    pub fn new(cache: C) -> Self {
        Self { cache, ttl: DEFAULT_CHECKPOINT_TTL }
    }

    pub fn with_ttl(cache: C, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    fn key(investigation_id: &str) -> String {
        format!("argus:memory:{investigation_id}")
    }

    /// 保存账本快照并通知订阅方
    pub async fn checkpoint(
        &self,
        investigation_id: &str,
        store: &MemoryStore,
    ) -> Result<(), CheckpointError> {
        let snapshot = store.snapshot();
        let payload = serde_json::to_string(&snapshot)?;
        let key = Self::key(investigation_id);
        self.cache.set(&key, payload, self.ttl).await?;
        self.cache
            .publish("argus:checkpoints", investigation_id.to_string())
            .await?;
        tracing::debug!(investigation_id, "memory checkpoint saved");
        Ok(())
    }

    /// 恢复快照；缓存中无记录时返回 false，账本保持不变
    pub async fn restore(
        &self,
        investigation_id: &str,
        store: &MemoryStore,
    ) -> Result<bool, CheckpointError> {
        let key = Self::key(investigation_id);
        match self.cache.get(&key).await? {
            Some(payload) => {
                let snapshot: MemorySnapshot = serde_json::from_str(&payload)?;
                store.restore(snapshot);
                tracing::debug!(investigation_id, "memory checkpoint restored");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{Entity, EntityType};

    #[tokio::test]
    async fn test_checkpoint_restore_round_trip() {
        let checkpointer = MemoryCheckpointer::new(InMemoryCache::new());
        let store = MemoryStore::new();
        store.remember_entity(Entity::new("Jane Doe", EntityType::Person, 0.9));
        store.remember_finding("observed affiliation");

        checkpointer.checkpoint("inv-1", &store).await.unwrap();

        let restored = MemoryStore::new();
        assert!(checkpointer.restore("inv-1", &restored).await.unwrap());
        assert_eq!(restored.entities().len(), 1);
        assert_eq!(restored.findings().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_missing_checkpoint_is_noop() {
        let checkpointer = MemoryCheckpointer::new(InMemoryCache::new());
        let store = MemoryStore::new();
        assert!(!checkpointer.restore("missing", &store).await.unwrap());
        assert!(store.entities().is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
