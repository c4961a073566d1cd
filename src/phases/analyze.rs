//! QueryAnalysis 阶段：扩展查询上下文、抽取种子实体

use serde::Deserialize;

use crate::core::error::InvestigationError;
use crate::core::state::{Entity, EntityType, InvestigationState, Phase, StateDiff};
use crate::llm::ChatMessage;
use crate::phases::{parse_json, prompts, PhaseExecutor};

#[derive(Deserialize)]
struct AnalysisOutput {
    expanded_context: String,
    #[serde(default)]
    entities: Vec<EntityOutput>,
}

#[derive(Deserialize)]
struct EntityOutput {
    name: String,
    #[serde(default)]
    entity_type: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    aliases: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

/// 模型输出的实体类型字符串映射；未知类型归入 Identifier
fn parse_entity_type(s: &str) -> EntityType {
    match s.to_lowercase().as_str() {
        "person" => EntityType::Person,
        "organization" | "org" | "company" => EntityType::Organization,
        "location" | "place" => EntityType::Location,
        "event" => EntityType::Event,
        _ => EntityType::Identifier,
    }
}

impl PhaseExecutor {
    pub(super) async fn analyze(
        &self,
        state: &InvestigationState,
    ) -> Result<StateDiff, InvestigationError> {
        if state.query.trim().is_empty() {
            return Err(InvestigationError::Validation(
                "investigation query is empty".to_string(),
            ));
        }

        let messages = [
            ChatMessage::system(prompts::ANALYSIS_SYSTEM),
            ChatMessage::user(prompts::analysis_user(&state.query)),
        ];
        let output = self.llm.complete(&messages).await?;
        let analysis: AnalysisOutput = parse_json(&output)?;

        if analysis.expanded_context.trim().is_empty() {
            return Err(InvestigationError::Provider(
                "analysis produced empty context".to_string(),
            ));
        }

        for e in analysis.entities {
            if e.name.trim().is_empty() {
                continue;
            }
            let mut entity = Entity::new(e.name, parse_entity_type(&e.entity_type), e.confidence);
            entity.aliases = e.aliases;
            self.memory.remember_entity(entity);
        }

        let mut diff = StateDiff::next_step(state);
        diff.phase = Some(Phase::Planning);
        diff.investigation_context = Some(analysis.expanded_context);
        diff.entities = Some(self.memory.entities());
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::llm::MockLlmClient;
    use crate::memory::MemoryStore;
    use crate::retrieval::{RateLimitConfig, RateLimiter, RetrievalConfig, RetrievalManager};

    fn executor() -> PhaseExecutor {
        let limiter = Arc::new(RateLimiter::new(HashMap::new(), RateLimitConfig::default()));
        PhaseExecutor::new(
            Arc::new(MockLlmClient),
            Arc::new(RetrievalManager::offline(limiter, RetrievalConfig::default())),
            Arc::new(MemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn test_analyze_extracts_entities_and_advances_phase() {
        let state = InvestigationState::new("Jane Doe", 10);
        let diff = executor().analyze(&state).await.unwrap();

        assert_eq!(diff.step, 1);
        assert_eq!(diff.phase, Some(Phase::Planning));
        assert!(diff.investigation_context.unwrap().contains("Jane Doe"));
        let entities = diff.entities.unwrap();
        assert_eq!(entities.len(), 1);
        assert!((0.0..=1.0).contains(&entities[0].confidence));
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_query() {
        let state = InvestigationState::new("   ", 10);
        let err = executor().analyze(&state).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_entity_type_falls_back_to_identifier() {
        assert_eq!(parse_entity_type("Vessel"), EntityType::Identifier);
        assert_eq!(parse_entity_type("ORG"), EntityType::Organization);
    }
}
