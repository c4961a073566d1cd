//! Planning 阶段：生成（或在转向后补充）研究问题

use serde::Deserialize;

use crate::core::error::InvestigationError;
use crate::core::state::{InvestigationState, Phase, Priority, ResearchQuestion, StateDiff};
use crate::llm::ChatMessage;
use crate::phases::{parse_json, prompts, PhaseExecutor};

/// 问题总数上限：转向补充不会无限膨胀问题列表
const MAX_QUESTIONS: usize = 6;

#[derive(Deserialize)]
struct PlannedQuestion {
    question: String,
    #[serde(default)]
    priority: String,
}

fn parse_priority(s: &str) -> Priority {
    match s.to_lowercase().as_str() {
        "high" => Priority::High,
        "low" => Priority::Low,
        _ => Priority::Medium,
    }
}

impl PhaseExecutor {
    pub(super) async fn plan(
        &self,
        state: &InvestigationState,
    ) -> Result<StateDiff, InvestigationError> {
        let messages = [
            ChatMessage::system(prompts::PLANNING_SYSTEM),
            ChatMessage::user(prompts::planning_user(state)),
        ];
        let output = self.llm.complete(&messages).await?;
        let planned: Vec<PlannedQuestion> = parse_json(&output)?;

        // 追加合并：保留已有问题（含状态与答案），新问题按文本去重
        let mut questions = state.research_questions.clone();
        for p in planned {
            let text = p.question.trim();
            if text.is_empty() {
                continue;
            }
            let duplicate = questions
                .iter()
                .any(|q| q.text.eq_ignore_ascii_case(text));
            if !duplicate && questions.len() < MAX_QUESTIONS {
                questions.push(ResearchQuestion::new(
                    text,
                    parse_priority(&p.priority),
                    state.step,
                ));
            }
        }

        if questions.is_empty() {
            return Err(InvestigationError::Provider(
                "planner produced no research questions".to_string(),
            ));
        }

        let mut diff = StateDiff::next_step(state);
        diff.phase = Some(Phase::Retrieval);
        diff.research_questions = Some(questions);
        Ok(diff)
    }
}
