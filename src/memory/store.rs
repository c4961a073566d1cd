//! 调查记忆账本：实体 / 关系 / 来源 / 发现
//!
//! 所有写入按身份键合并，重复写入是幂等的（超步重试会重放记忆写入，合并语义保证
//! 重放安全）。实体键为小写名称；关系键为 (entity1, entity2, 类型)；来源键为
//! (url, 类别)。内部用 Mutex 保护，各阶段可通过共享引用写入。

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::core::state::{Entity, InvestigationState, Source, SourceType};

/// 实体间关系；(entity1, entity2, relationship_type) 为合并键
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relationship {
    pub entity1: String,
    pub entity2: String,
    pub relationship_type: String,
    pub confidence: f64,
}

/// 账本的可序列化快照，也是 checkpoint 的载体
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub entities: BTreeMap<String, Entity>,
    pub relationships: Vec<Relationship>,
    pub sources: Vec<Source>,
    pub findings: Vec<String>,
}

/// 记忆摘要：拼入反思 / 综合阶段 Prompt 的压缩视图
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemorySummary {
    pub entity_count: usize,
    pub source_count: usize,
    pub relationship_count: usize,
    /// confidence 降序的前 10 个实体名
    pub top_entities: Vec<String>,
    pub key_findings: Vec<String>,
}

/// 调查记忆存储
pub struct MemoryStore {
    inner: Mutex<MemorySnapshot>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemorySnapshot::default()),
        }
    }

    /// 记住一个实体：同键（小写名称）合并——attributes 取并集（新值覆盖同名键）、
    /// confidence 取较大者、aliases 并集；不同键直接插入
    pub fn remember_entity(&self, entity: Entity) {
        let key = entity.key();
        let mut inner = self.inner.lock().unwrap();
        match inner.entities.get_mut(&key) {
            Some(existing) => {
                existing.confidence = existing.confidence.max(entity.confidence);
                for (k, v) in entity.attributes {
                    existing.attributes.insert(k, v);
                }
                for alias in entity.aliases {
                    if !existing.aliases.contains(&alias) {
                        existing.aliases.push(alias);
                    }
                }
            }
            None => {
                inner.entities.insert(key, entity);
            }
        }
    }

    /// 记住一条关系；任一端实体未知则丢弃（no-op），同键重复写入幂等
    pub fn remember_relationship(&self, rel: Relationship) {
        let mut inner = self.inner.lock().unwrap();
        let k1 = rel.entity1.to_lowercase();
        let k2 = rel.entity2.to_lowercase();
        if !inner.entities.contains_key(&k1) || !inner.entities.contains_key(&k2) {
            tracing::debug!(
                entity1 = %rel.entity1,
                entity2 = %rel.entity2,
                "relationship references unknown entity, dropped"
            );
            return;
        }
        let exists = inner.relationships.iter().any(|r| {
            r.entity1.to_lowercase() == k1
                && r.entity2.to_lowercase() == k2
                && r.relationship_type == rel.relationship_type
        });
        if !exists {
            inner.relationships.push(rel);
        }
    }

    /// 记住一个来源；(url, 类别) 重复时保留已有条目
    pub fn remember_source(&self, source: Source) {
        let mut inner = self.inner.lock().unwrap();
        let key = source.dedup_key();
        let exists = inner.sources.iter().any(|s| s.dedup_key() == key);
        if !exists {
            inner.sources.push(source);
        }
    }

    /// 追加一条关键发现（去重：完全相同的文本只记一次）
    pub fn remember_finding(&self, finding: impl Into<String>) {
        let finding = finding.into();
        if finding.trim().is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if !inner.findings.contains(&finding) {
            inner.findings.push(finding);
        }
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.inner.lock().unwrap().entities.values().cloned().collect()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.inner.lock().unwrap().relationships.clone()
    }

    pub fn sources(&self) -> Vec<Source> {
        self.inner.lock().unwrap().sources.clone()
    }

    pub fn findings(&self) -> Vec<String> {
        self.inner.lock().unwrap().findings.clone()
    }

    /// 某类别是否已有来源（反思阶段的覆盖度检查用）
    pub fn has_source_type(&self, source_type: SourceType) -> bool {
        self.inner
            .lock()
            .unwrap()
            .sources
            .iter()
            .any(|s| s.source_type == source_type)
    }

    /// 生成压缩摘要：top_entities 按 confidence 降序取前 10
    pub fn summary(&self) -> MemorySummary {
        let inner = self.inner.lock().unwrap();
        let mut by_confidence: Vec<&Entity> = inner.entities.values().collect();
        by_confidence.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        MemorySummary {
            entity_count: inner.entities.len(),
            source_count: inner.sources.len(),
            relationship_count: inner.relationships.len(),
            top_entities: by_confidence
                .iter()
                .take(10)
                .map(|e| e.name.clone())
                .collect(),
            key_findings: inner.findings.clone(),
        }
    }

    /// 从持久化的调查状态重建账本。崩溃恢复时账本是空的，而反思 / 综合
    /// 阶段的 Prompt 依赖账本摘要；实体与来源在状态里都有副本，重放进来
    /// 即可（写入幂等，账本非空时调用也安全）。
    pub fn rebuild_from_state(&self, state: &InvestigationState) {
        for entity in &state.entities {
            self.remember_entity(entity.clone());
        }
        for source in &state.sources {
            self.remember_source(source.clone());
        }
    }

    /// 导出快照（checkpoint 用）
    pub fn snapshot(&self) -> MemorySnapshot {
        self.inner.lock().unwrap().clone()
    }

    /// 从快照整体恢复，覆盖当前内容
    pub fn restore(&self, snapshot: MemorySnapshot) {
        *self.inner.lock().unwrap() = snapshot;
    }
}
