//! Retrieval 阶段：检索来源并回答研究问题
//!
//! 常规情况下一个超步推进一个问题（失败影响面小、心跳间隔短）；剩余步数预算
//! 不足以逐题推进时，压缩为一个超步回答全部待办问题，为反思与综合保留步数。

use std::collections::HashSet;

use crate::core::error::InvestigationError;
use crate::core::state::{
    InvestigationState, Phase, QuestionStatus, SourceType, StateDiff,
};
use crate::core::Heartbeat;
use crate::llm::ChatMessage;
use crate::phases::{prompts, PhaseExecutor};

/// 检索与回答所围绕的主实体：取 confidence 最高的实体名，无实体时退回原始查询
fn primary_entity(state: &InvestigationState) -> String {
    state
        .entities
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|e| e.name.clone())
        .unwrap_or_else(|| state.query.clone())
}

impl PhaseExecutor {
    pub(super) async fn retrieve(
        &self,
        state: &InvestigationState,
        heartbeat: &Heartbeat,
    ) -> Result<StateDiff, InvestigationError> {
        // InProgress 也算待办：快照里可能留有上次中断时正在回答的问题
        let pending: Vec<usize> = state
            .research_questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !q.status.is_terminal())
            .map(|(i, _)| i)
            .collect();

        let mut diff = StateDiff::next_step(state);
        if pending.is_empty() {
            diff.phase = Some(Phase::PivotAnalysis);
            return Ok(diff);
        }

        // 逐题推进需要 pending + 2 步（反思 1 步 + 综合 1 步）；不够就全量压缩
        let one_per_step_cost = pending.len() as u32 + 2;
        let batch = if state.remaining_budget() >= one_per_step_cost {
            1
        } else {
            pending.len()
        };

        let entity = primary_entity(state);
        let mut questions = state.research_questions.clone();
        let mut merged_sources = state.sources.clone();
        let mut seen: HashSet<(String, SourceType)> =
            merged_sources.iter().map(|s| s.dedup_key()).collect();
        let mut next_index = state.current_question_index;

        for &idx in pending.iter().take(batch) {
            heartbeat.beat();
            questions[idx].status = QuestionStatus::InProgress;
            let question = questions[idx].clone();
            let sources = self
                .retrieval
                .retrieve(&question.text, &entity, self.max_sources_per_question)
                .await;
            for s in &sources {
                self.memory.remember_source(s.clone());
            }

            let messages = [
                ChatMessage::system(prompts::ANSWER_SYSTEM),
                ChatMessage::user(prompts::answer_user(state, &question, &sources)),
            ];
            let answer = self.llm.complete(&messages).await?;

            let q = &mut questions[idx];
            q.status = QuestionStatus::Completed;
            q.answer = answer;
            q.sources = sources.iter().map(|s| s.url.clone()).collect();

            for s in sources {
                if seen.insert(s.dedup_key()) {
                    merged_sources.push(s);
                }
            }
            next_index = idx + 1;
        }

        let still_pending = questions.iter().any(|q| !q.status.is_terminal());
        diff.phase = Some(if still_pending {
            Phase::Retrieval
        } else {
            Phase::PivotAnalysis
        });
        diff.research_questions = Some(questions);
        diff.sources = Some(merged_sources);
        diff.current_question_index = Some(next_index);
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::core::state::{Priority, ResearchQuestion};
    use crate::llm::MockLlmClient;
    use crate::memory::MemoryStore;
    use crate::retrieval::{RateLimitConfig, RateLimiter, RetrievalConfig, RetrievalManager};

    fn executor() -> PhaseExecutor {
        let mut config = RateLimitConfig::default();
        config.min_delay_ms = 0;
        let limiter = Arc::new(RateLimiter::new(HashMap::new(), config));
        PhaseExecutor::new(
            Arc::new(MockLlmClient),
            Arc::new(RetrievalManager::offline(limiter, RetrievalConfig::default())),
            Arc::new(MemoryStore::new()),
        )
    }

    fn state_with_questions(max_steps: u32, step: u32, count: usize) -> InvestigationState {
        let mut state = InvestigationState::new("Jane Doe", max_steps);
        state.phase = Phase::Retrieval;
        state.step = step;
        state.research_questions = (0..count)
            .map(|i| ResearchQuestion::new(format!("Question {i} about Jane Doe?"), Priority::High, 1))
            .collect();
        state
    }

    #[tokio::test]
    async fn test_generous_budget_answers_one_question_per_step() {
        let state = state_with_questions(12, 2, 3);
        let diff = executor().retrieve(&state, &Heartbeat::new()).await.unwrap();

        let questions = diff.research_questions.unwrap();
        let answered = questions
            .iter()
            .filter(|q| q.status == QuestionStatus::Completed)
            .count();
        assert_eq!(answered, 1);
        assert_eq!(diff.phase, Some(Phase::Retrieval));
        assert_eq!(diff.current_question_index, Some(1));
    }

    #[tokio::test]
    async fn test_tight_budget_compresses_to_single_step() {
        // 剩余 3 步、3 个问题：必须一步答完并转入反思
        let state = state_with_questions(5, 2, 3);
        let diff = executor().retrieve(&state, &Heartbeat::new()).await.unwrap();

        let questions = diff.research_questions.unwrap();
        assert!(questions.iter().all(|q| q.status == QuestionStatus::Completed));
        assert_eq!(diff.phase, Some(Phase::PivotAnalysis));
    }

    #[tokio::test]
    async fn test_sources_are_deduplicated_across_questions() {
        let state = state_with_questions(5, 2, 3);
        let diff = executor().retrieve(&state, &Heartbeat::new()).await.unwrap();

        let sources = diff.sources.unwrap();
        let mut seen = HashSet::new();
        for s in &sources {
            assert!(seen.insert(s.dedup_key()));
        }
        assert!(!sources.is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_in_progress_question_is_answered() {
        // 中断快照里正在回答的问题必须被重新拾起，不能被跳过而永远悬空
        let mut state = state_with_questions(12, 2, 2);
        state.research_questions[0].status = QuestionStatus::InProgress;

        let diff = executor().retrieve(&state, &Heartbeat::new()).await.unwrap();
        let questions = diff.research_questions.unwrap();
        assert_eq!(questions[0].status, QuestionStatus::Completed);
        assert!(!questions[0].answer.is_empty());
        assert_eq!(questions[1].status, QuestionStatus::Pending);
    }

    #[tokio::test]
    async fn test_no_pending_questions_advances_to_pivot() {
        let mut state = state_with_questions(10, 3, 1);
        state.research_questions[0].status = QuestionStatus::Completed;

        let diff = executor().retrieve(&state, &Heartbeat::new()).await.unwrap();
        assert_eq!(diff.phase, Some(Phase::PivotAnalysis));
        assert!(diff.research_questions.is_none());
    }
}
