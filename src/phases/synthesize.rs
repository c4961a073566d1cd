//! Synthesis 阶段：汇总全部证据生成最终报告
//!
//! 这是最后一个预算步时，把质量评审折叠进同一个超步（报告 + 评审一步完成，
//! 直接进入 Complete）；否则交给独立的 Judge 超步。

use crate::core::error::InvestigationError;
use crate::core::state::{InvestigationState, Phase, StateDiff};
use crate::llm::ChatMessage;
use crate::phases::{prompts, PhaseExecutor};

impl PhaseExecutor {
    pub(super) async fn synthesize(
        &self,
        state: &InvestigationState,
    ) -> Result<StateDiff, InvestigationError> {
        let summary = self.memory.summary();
        let messages = [
            ChatMessage::system(prompts::REPORT_SYSTEM),
            ChatMessage::user(prompts::report_user(state, &summary)),
        ];
        let report = self.llm.complete(&messages).await?;
        if report.trim().is_empty() {
            return Err(InvestigationError::Provider(
                "synthesis produced empty report".to_string(),
            ));
        }

        let mut diff = StateDiff::next_step(state);
        diff.final_report = Some(report.clone());

        if state.remaining_budget() <= 1 {
            // 折叠评审：对带报告的临时视图跑 Judge prompt
            let mut reviewed = state.clone();
            reviewed.final_report = report;
            match self.quality_review(&reviewed).await {
                Ok(quality) => diff.quality = Some(quality),
                Err(e) => {
                    tracing::warn!(error = %e, "folded quality review failed, completing without review");
                    diff.notes.push(format!(
                        "step {}: quality review skipped ({e})",
                        diff.step
                    ));
                }
            }
            diff.phase = Some(Phase::Complete);
        } else {
            diff.phase = Some(Phase::Judge);
        }
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
    async fn test_synthesis_with_budget_defers_to_judge() {
        let mut state = InvestigationState::new("Jane Doe", 10);
        state.phase = Phase::Synthesis;
        state.step = 6;

        let diff = executor().synthesize(&state).await.unwrap();
        assert_eq!(diff.phase, Some(Phase::Judge));
        assert!(diff.final_report.unwrap().contains("Jane Doe"));
        assert!(diff.quality.is_none());
    }

    #[tokio::test]
    async fn test_last_step_folds_quality_review() {
        let mut state = InvestigationState::new("Jane Doe", 5);
        state.phase = Phase::Synthesis;
        state.step = 4;

        let diff = executor().synthesize(&state).await.unwrap();
        assert_eq!(diff.phase, Some(Phase::Complete));
        assert!(diff.final_report.is_some());
        let quality = diff.quality.unwrap();
        assert!((0.0..=1.0).contains(&quality.overall_score));
    }
}
