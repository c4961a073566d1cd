//! Mock LLM 客户端（离线/测试用，无需 API）
//!
//! 按 system prompt 的角色标识返回确定性的结构化输出，使各阶段在无凭据时也能
//! 跑通完整调查流程；输出形状与 phases 模块的 JSON 契约一致。

use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmClient, LlmError, Role};

/// Mock 客户端：识别阶段 Prompt 并返回固定形状的回答
#[derive(Debug, Default)]
pub struct MockLlmClient;

/// 从 user 消息中提取 "Target query:" 后的目标串（无则回退为整条消息）
fn extract_target(messages: &[ChatMessage]) -> String {
    let user = messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User))
        .map(|m| m.content.as_str())
        .unwrap_or("");
    for line in user.lines() {
        if let Some(rest) = line.strip_prefix("Target query:") {
            return rest.trim().to_string();
        }
    }
    user.chars().take(60).collect()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::Validation("empty message list".to_string()));
        }
        let system = messages
            .iter()
            .find(|m| matches!(m.role, Role::System))
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let target = extract_target(messages);

        if system.contains("OSINT scoping analyst") {
            return Ok(format!(
                r#"{{"expanded_context": "Open-source background investigation of {target}: public footprint, professional history, affiliations and associated organizations.", "entities": [{{"name": "{target}", "entity_type": "Person", "confidence": 0.85, "aliases": []}}]}}"#
            ));
        }
        if system.contains("OSINT research planner") {
            return Ok(format!(
                r#"[{{"question": "What is the professional background of {target}?", "priority": "High"}},
{{"question": "Which organizations is {target} affiliated with?", "priority": "Medium"}},
{{"question": "What public records or publications mention {target}?", "priority": "Medium"}}]"#
            ));
        }
        if system.contains("answering a research question") {
            return Ok(format!(
                "Based on the gathered sources, {target} shows a consistent public profile across professional and academic channels. The available evidence is mutually corroborating; no contradictions were observed."
            ));
        }
        if system.contains("reflecting on research progress") {
            return Ok(r#"{"sufficient": true, "information_gaps": [], "pivot_strategies": [], "relationships": [], "key_findings": ["Public footprint is consistent across source categories"]}"#.to_string());
        }
        if system.contains("OSINT report writer") {
            return Ok(format!(
                "# Investigation Report\n\n## Executive Summary\nOpen-source investigation of {target} completed. Findings are drawn from multiple independent source categories and cross-checked for consistency.\n\n## Key Findings\n- Professional background corroborated by academic and professional-network sources.\n- No adverse public-record indicators were identified.\n\n## Limitations\nOnly publicly available material was consulted."
            ));
        }
        if system.contains("OSINT quality reviewer") {
            return Ok(r#"{"overall_score": 0.82, "completeness_score": 0.8, "accuracy_score": 0.85, "source_diversity_score": 0.8, "approval_status": "approved", "improvements": []}"#.to_string());
        }

        Ok(format!("Echo from Mock: {target}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_planning_output_is_json_array() {
        let mock = MockLlmClient;
        let messages = vec![
            ChatMessage::system("You are an OSINT research planner. ..."),
            ChatMessage::user("Target query: Jane Doe"),
        ];
        let out = mock.complete(&messages).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(parsed.as_array().map(|a| a.len() >= 3).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_mock_rejects_empty_messages() {
        let mock = MockLlmClient;
        assert!(matches!(
            mock.complete(&[]).await,
            Err(LlmError::Validation(_))
        ));
    }
}
