//! PivotAnalysis 阶段：反思进展，决定转向、继续或收束
//!
//! 证据充分则进入 Synthesis；不充分且预算允许则带着缺口与转向策略回到 Planning；
//! 预算只够收尾时强制进入 Synthesis，避免有证据却无报告地终止。

use serde::Deserialize;

use crate::core::error::InvestigationError;
use crate::core::state::{InvestigationState, Phase, SourceType, StateDiff};
use crate::llm::ChatMessage;
use crate::memory::Relationship;
use crate::phases::{parse_json, prompts, PhaseExecutor};

#[derive(Deserialize)]
struct ReflectionOutput {
    sufficient: bool,
    #[serde(default)]
    information_gaps: Vec<String>,
    #[serde(default)]
    pivot_strategies: Vec<String>,
    #[serde(default)]
    relationships: Vec<RelationshipOutput>,
    #[serde(default)]
    key_findings: Vec<String>,
}

#[derive(Deserialize)]
struct RelationshipOutput {
    entity1: String,
    entity2: String,
    relationship_type: String,
    #[serde(default = "default_rel_confidence")]
    confidence: f64,
}

fn default_rel_confidence() -> f64 {
    0.5
}

impl PhaseExecutor {
    pub(super) async fn pivot(
        &self,
        state: &InvestigationState,
    ) -> Result<StateDiff, InvestigationError> {
        let summary = self.memory.summary();
        // 尚无来源的类别作为覆盖度信号交给反思，缺口常出在没查过的类别里
        let uncovered: Vec<SourceType> = SourceType::ALL
            .iter()
            .copied()
            .filter(|category| !self.memory.has_source_type(*category))
            .collect();
        let messages = [
            ChatMessage::system(prompts::REFLECTION_SYSTEM),
            ChatMessage::user(prompts::reflection_user(state, &summary, &uncovered)),
        ];
        let output = self.llm.complete(&messages).await?;
        let reflection: ReflectionOutput = parse_json(&output)?;

        for rel in reflection.relationships {
            self.memory.remember_relationship(Relationship {
                entity1: rel.entity1,
                entity2: rel.entity2,
                relationship_type: rel.relationship_type,
                confidence: rel.confidence.clamp(0.0, 1.0),
            });
        }
        for finding in &reflection.key_findings {
            self.memory.remember_finding(finding.clone());
        }

        let mut diff = StateDiff::next_step(state);
        diff.reflection_sufficient = Some(reflection.sufficient);
        diff.information_gaps = reflection.information_gaps;
        diff.pivot_strategies = reflection.pivot_strategies;

        // 本步消耗后剩 1 步时必须直接综合
        let budget_forces_synthesis = state.remaining_budget() <= 2;
        let next = if reflection.sufficient || budget_forces_synthesis {
            Phase::Synthesis
        } else {
            Phase::Planning
        };
        if !reflection.sufficient && budget_forces_synthesis {
            diff.notes.push(format!(
                "step {}: evidence judged insufficient but step budget exhausted, forcing synthesis",
                diff.step
            ));
        }
        diff.phase = Some(next);
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::llm::{ChatMessage, LlmClient, LlmError, MockLlmClient};
    use crate::memory::MemoryStore;
    use crate::retrieval::{RateLimitConfig, RateLimiter, RetrievalConfig, RetrievalManager};

    /// 返回固定反思结果的脚本客户端
    struct ScriptedReflection(&'static str);

    #[async_trait]
    impl LlmClient for ScriptedReflection {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    fn executor_with(llm: Arc<dyn LlmClient>) -> PhaseExecutor {
        let limiter = Arc::new(RateLimiter::new(HashMap::new(), RateLimitConfig::default()));
        PhaseExecutor::new(
            llm,
            Arc::new(RetrievalManager::offline(limiter, RetrievalConfig::default())),
            Arc::new(MemoryStore::new()),
        )
    }

    /// 记录收到的 user prompt 再返回固定反思结果
    struct CapturingReflection {
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for CapturingReflection {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
            if let Some(user) = messages.last() {
                self.seen.lock().unwrap().push(user.content.clone());
            }
            Ok(r#"{"sufficient": true, "information_gaps": [], "pivot_strategies": [], "relationships": [], "key_findings": []}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_reflection_prompt_reports_uncovered_source_categories() {
        let llm = Arc::new(CapturingReflection {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let executor = executor_with(llm.clone());
        executor.memory().remember_source(crate::core::state::Source {
            url: "https://example.com/a".to_string(),
            source_type: crate::core::state::SourceType::Web,
            title: "profile".to_string(),
            content: String::new(),
            credibility: 0.6,
            retrieved_at: chrono::Utc::now(),
        });

        let mut state = InvestigationState::new("Jane Doe", 10);
        state.phase = Phase::PivotAnalysis;
        state.step = 3;
        executor.pivot(&state).await.unwrap();

        let seen = llm.seen.lock().unwrap();
        assert!(seen[0].contains("no coverage yet"));
        assert!(seen[0].contains("News"));
        // 已覆盖的类别不在缺口列表里
        assert!(!seen[0].contains("no coverage yet: Web"));
    }

    #[tokio::test]
    async fn test_sufficient_evidence_advances_to_synthesis() {
        let mut state = InvestigationState::new("Jane Doe", 10);
        state.phase = Phase::PivotAnalysis;
        state.step = 3;

        let diff = executor_with(Arc::new(MockLlmClient))
            .pivot(&state)
            .await
            .unwrap();
        assert_eq!(diff.phase, Some(Phase::Synthesis));
        assert_eq!(diff.reflection_sufficient, Some(true));
    }

    #[tokio::test]
    async fn test_insufficient_evidence_pivots_back_to_planning() {
        let llm = ScriptedReflection(
            r#"{"sufficient": false, "information_gaps": ["employment history"], "pivot_strategies": ["search business registries"], "relationships": [], "key_findings": []}"#,
        );
        let mut state = InvestigationState::new("Jane Doe", 12);
        state.phase = Phase::PivotAnalysis;
        state.step = 4;

        let diff = executor_with(Arc::new(llm)).pivot(&state).await.unwrap();
        assert_eq!(diff.phase, Some(Phase::Planning));
        assert_eq!(diff.information_gaps, vec!["employment history".to_string()]);
        assert_eq!(
            diff.pivot_strategies,
            vec!["search business registries".to_string()]
        );
    }

    #[tokio::test]
    async fn test_exhausted_budget_forces_synthesis_with_note() {
        let llm = ScriptedReflection(
            r#"{"sufficient": false, "information_gaps": [], "pivot_strategies": [], "relationships": [], "key_findings": []}"#,
        );
        let mut state = InvestigationState::new("Jane Doe", 5);
        state.phase = Phase::PivotAnalysis;
        state.step = 3;

        let diff = executor_with(Arc::new(llm)).pivot(&state).await.unwrap();
        assert_eq!(diff.phase, Some(Phase::Synthesis));
        assert_eq!(diff.notes.len(), 1);
    }
}
