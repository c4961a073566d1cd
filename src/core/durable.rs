//! 持久化后端：每个超步合并后的全量状态快照
//!
//! InvestigationState 全量可序列化，持久化粒度是「整个状态」而非增量日志，
//! 恢复时 load 即得最近一次成功合并后的状态。内存实现用于单机运行与测试，
//! 序列化/反序列化走完整 JSON 编解码，保证快照确实可重放。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::error::InvestigationError;
use crate::core::state::InvestigationState;

/// 状态持久化抽象
#[async_trait]
pub trait DurableBackend: Send + Sync {
    async fn load(
        &self,
        investigation_id: &str,
    ) -> Result<Option<InvestigationState>, InvestigationError>;

    async fn persist(&self, state: &InvestigationState) -> Result<(), InvestigationError>;
}

/// 进程内持久化实现
#[derive(Default)]
pub struct InMemoryDurable {
    snapshots: Mutex<HashMap<String, String>>,
}

impl InMemoryDurable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableBackend for InMemoryDurable {
    async fn load(
        &self,
        investigation_id: &str,
    ) -> Result<Option<InvestigationState>, InvestigationError> {
        let snapshots = self.snapshots.lock().unwrap();
        match snapshots.get(investigation_id) {
            Some(payload) => {
                let state = serde_json::from_str(payload).map_err(|e| {
                    InvestigationError::Critical(format!("corrupt state snapshot: {e}"))
                })?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, state: &InvestigationState) -> Result<(), InvestigationError> {
        let payload = serde_json::to_string(state)
            .map_err(|e| InvestigationError::Critical(format!("serialize state: {e}")))?;
        self.snapshots
            .lock()
            .unwrap()
            .insert(state.investigation_id.clone(), payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::Phase;

    #[tokio::test]
    async fn test_persist_load_round_trip() {
        let backend = InMemoryDurable::new();
        let mut state = InvestigationState::new("Jane Doe", 5);
        state.phase = Phase::Planning;
        state.step = 2;
        state.notes.push("note".to_string());

        backend.persist(&state).await.unwrap();
        let loaded = backend
            .load(&state.investigation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.phase, Phase::Planning);
        assert_eq!(loaded.step, 2);
        assert_eq!(loaded.notes, state.notes);
    }

    #[tokio::test]
    async fn test_load_unknown_id_is_none() {
        let backend = InMemoryDurable::new();
        assert!(backend.load("missing").await.unwrap().is_none());
    }
}
