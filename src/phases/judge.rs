//! Judge 阶段：对最终报告做结构化质量评审

use serde::Deserialize;

use crate::core::error::InvestigationError;
use crate::core::state::{InvestigationState, Phase, QualityReview, StateDiff};
use crate::llm::ChatMessage;
use crate::phases::{parse_json, prompts, PhaseExecutor};

#[derive(Deserialize)]
struct JudgeOutput {
    overall_score: f64,
    completeness_score: f64,
    accuracy_score: f64,
    source_diversity_score: f64,
    #[serde(default)]
    approval_status: String,
    #[serde(default)]
    improvements: Vec<String>,
}

impl PhaseExecutor {
    /// 评审报告；Synthesis 在折叠模式下也复用此方法
    pub(super) async fn quality_review(
        &self,
        state: &InvestigationState,
    ) -> Result<QualityReview, InvestigationError> {
        if state.final_report.trim().is_empty() {
            return Err(InvestigationError::Validation(
                "no report available for review".to_string(),
            ));
        }
        let messages = [
            ChatMessage::system(prompts::JUDGE_SYSTEM),
            ChatMessage::user(prompts::judge_user(state)),
        ];
        let output = self.llm.complete(&messages).await?;
        let judged: JudgeOutput = parse_json(&output)?;

        Ok(QualityReview {
            overall_score: judged.overall_score.clamp(0.0, 1.0),
            completeness_score: judged.completeness_score.clamp(0.0, 1.0),
            accuracy_score: judged.accuracy_score.clamp(0.0, 1.0),
            source_diversity_score: judged.source_diversity_score.clamp(0.0, 1.0),
            approval_status: if judged.approval_status.is_empty() {
                "needs_improvement".to_string()
            } else {
                judged.approval_status
            },
            improvements: judged.improvements,
        })
    }

    pub(super) async fn judge(
        &self,
        state: &InvestigationState,
    ) -> Result<StateDiff, InvestigationError> {
        let quality = self.quality_review(state).await?;
        tracing::info!(
            investigation_id = %state.investigation_id,
            overall = quality.overall_score,
            status = %quality.approval_status,
            "report reviewed"
        );

        let mut diff = StateDiff::next_step(state);
        if !quality.improvements.is_empty() {
            diff.notes.push(format!(
                "step {}: reviewer suggested {} improvement(s)",
                diff.step,
                quality.improvements.len()
            ));
        }
        diff.quality = Some(quality);
        diff.phase = Some(Phase::Complete);
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
    async fn test_judge_scores_report_and_completes() {
        let mut state = InvestigationState::new("Jane Doe", 10);
        state.phase = Phase::Judge;
        state.step = 7;
        state.final_report = "# Investigation Report\n\nFindings...".to_string();

        let diff = executor().judge(&state).await.unwrap();
        assert_eq!(diff.phase, Some(Phase::Complete));
        let quality = diff.quality.unwrap();
        assert!((0.0..=1.0).contains(&quality.overall_score));
        assert!((0.0..=1.0).contains(&quality.source_diversity_score));
    }

    #[tokio::test]
    async fn test_judge_without_report_is_validation_error() {
        let mut state = InvestigationState::new("Jane Doe", 10);
        state.phase = Phase::Judge;
        state.step = 7;

        let err = executor().judge(&state).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
