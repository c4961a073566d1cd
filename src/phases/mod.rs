//! 阶段执行器：每个超步执行一个调查阶段，产出 StateDiff
//!
//! 执行器从不直接修改 InvestigationState——读状态、做外部调用、返回类型化补丁，
//! 由 DurableCoordinator 合并。记忆写入走 MemoryStore 的幂等合并，超步重试重放安全。

mod analyze;
mod judge;
mod pivot;
mod plan;
pub mod prompts;
mod retrieve;
mod synthesize;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::core::error::InvestigationError;
use crate::core::state::{InvestigationState, Phase, StateDiff};
use crate::core::Heartbeat;
use crate::llm::LlmClient;
use crate::memory::MemoryStore;
use crate::retrieval::RetrievalManager;

/// 每个研究问题最多收集的来源数
const MAX_SOURCES_PER_QUESTION: usize = 5;

/// 阶段执行器：持有 LLM、检索与记忆的共享引用
pub struct PhaseExecutor {
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<RetrievalManager>,
    memory: Arc<MemoryStore>,
    max_sources_per_question: usize,
}

impl PhaseExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<RetrievalManager>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            llm,
            retrieval,
            memory,
            max_sources_per_question: MAX_SOURCES_PER_QUESTION,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// 按当前阶段分派；终态阶段不可执行
    pub async fn execute(
        &self,
        state: &InvestigationState,
        heartbeat: &Heartbeat,
    ) -> Result<StateDiff, InvestigationError> {
        tracing::info!(
            investigation_id = %state.investigation_id,
            phase = ?state.phase,
            step = state.step,
            "executing phase"
        );
        match state.phase {
            Phase::QueryAnalysis => self.analyze(state).await,
            Phase::Planning => self.plan(state).await,
            Phase::Retrieval => self.retrieve(state, heartbeat).await,
            Phase::PivotAnalysis => self.pivot(state).await,
            Phase::Synthesis => self.synthesize(state).await,
            Phase::Judge => self.judge(state).await,
            Phase::Complete | Phase::Failed => Err(InvestigationError::Validation(format!(
                "cannot execute terminal phase {:?}",
                state.phase
            ))),
        }
    }
}

/// 从 LLM 输出中提取 JSON 块（```json 围栏、或首个 { .. 末个 }、或 [ .. ]）
fn extract_json_block(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }
    let obj = trimmed.find('{').zip(trimmed.rfind('}'));
    let arr = trimmed.find('[').zip(trimmed.rfind(']'));
    match (obj, arr) {
        (Some((os, oe)), Some((as_, ae))) if as_ < os && ae > oe => &trimmed[as_..=ae],
        (Some((os, oe)), _) => &trimmed[os..=oe],
        (None, Some((as_, ae))) => &trimmed[as_..=ae],
        (None, None) => trimmed,
    }
}

/// 解析阶段输出的 JSON；形状不符按 Provider 错误处理（可重试，模型重采样可能修复）
fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T, InvestigationError> {
    let block = extract_json_block(output);
    serde_json::from_str(block)
        .map_err(|e| InvestigationError::Provider(format!("malformed phase output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_block() {
        let out = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json_block(out), r#"{"a": 1}"#);
    }

    #[test]
    fn test_extract_json_array_without_fence() {
        let out = "Result: [{\"q\": \"x\"}] trailing";
        assert_eq!(extract_json_block(out), r#"[{"q": "x"}]"#);
    }

    #[test]
    fn test_parse_json_reports_retryable_error() {
        let err = parse_json::<serde_json::Value>("not json at all").unwrap_err();
        assert!(err.is_retryable());
    }
}
