//! 各阶段的 Prompt 模板
//!
//! system prompt 声明角色与输出契约（JSON 形状在此处固定，解析端与之对应）；
//! user prompt 统一携带 "Target query:" 行，便于离线客户端与日志审计定位目标。

use crate::core::state::{InvestigationState, ResearchQuestion, Source, SourceType};
use crate::memory::MemorySummary;

pub const ANALYSIS_SYSTEM: &str = "You are an OSINT scoping analyst. Given a raw investigation query, expand it into a precise investigation context and extract the seed entities. \
Respond with a single JSON object: {\"expanded_context\": string, \"entities\": [{\"name\": string, \"entity_type\": \"Person\"|\"Organization\"|\"Location\"|\"Event\"|\"Identifier\", \"confidence\": number, \"aliases\": [string]}]}. \
Only include entities explicitly implied by the query. No text outside the JSON.";

pub const PLANNING_SYSTEM: &str = "You are an OSINT research planner. Produce focused, answerable research questions that advance the investigation. \
Respond with a JSON array: [{\"question\": string, \"priority\": \"High\"|\"Medium\"|\"Low\"}]. \
Do not repeat questions that were already asked. No text outside the JSON.";

pub const ANSWER_SYSTEM: &str = "You are an OSINT analyst answering a research question from retrieved open sources. \
Ground every claim in the provided source excerpts, cite nothing beyond them, and state plainly when the sources are insufficient. Respond in plain prose.";

pub const REFLECTION_SYSTEM: &str = "You are an OSINT analyst reflecting on research progress. Judge whether the gathered evidence is sufficient to write the final report, and identify gaps, pivot strategies, entity relationships and key findings. \
Respond with a single JSON object: {\"sufficient\": bool, \"information_gaps\": [string], \"pivot_strategies\": [string], \"relationships\": [{\"entity1\": string, \"entity2\": string, \"relationship_type\": string, \"confidence\": number}], \"key_findings\": [string]}. \
No text outside the JSON.";

pub const REPORT_SYSTEM: &str = "You are an OSINT report writer. Compose a structured markdown investigation report with sections: Executive Summary, Key Findings, Entities and Relationships, Source Assessment, Limitations. \
Attribute findings to their sources and reflect source credibility honestly. Use only the material provided.";

pub const JUDGE_SYSTEM: &str = "You are an OSINT quality reviewer. Score the investigation report on completeness, accuracy and source diversity, each in [0, 1]. \
Respond with a single JSON object: {\"overall_score\": number, \"completeness_score\": number, \"accuracy_score\": number, \"source_diversity_score\": number, \"approval_status\": \"approved\"|\"needs_improvement\"|\"rejected\", \"improvements\": [string]}. \
No text outside the JSON.";

/// 查询分析的 user prompt
pub fn analysis_user(query: &str) -> String {
    format!("Target query: {query}\n\nScope this investigation and extract the seed entities.")
}

/// 规划阶段的 user prompt：带上下文、已有问题与反思产出的缺口/转向策略
pub fn planning_user(state: &InvestigationState) -> String {
    let mut prompt = format!(
        "Target query: {}\n\nInvestigation context:\n{}\n",
        state.query, state.investigation_context
    );
    if !state.research_questions.is_empty() {
        prompt.push_str("\nQuestions already asked (do not repeat):\n");
        for q in &state.research_questions {
            prompt.push_str(&format!("- {}\n", q.text));
        }
    }
    if !state.information_gaps.is_empty() {
        prompt.push_str("\nKnown information gaps:\n");
        for gap in &state.information_gaps {
            prompt.push_str(&format!("- {gap}\n"));
        }
    }
    if !state.pivot_strategies.is_empty() {
        prompt.push_str("\nPivot strategies to pursue:\n");
        for s in &state.pivot_strategies {
            prompt.push_str(&format!("- {s}\n"));
        }
    }
    prompt.push_str("\nPlan the next research questions.");
    prompt
}

/// 回答单个研究问题的 user prompt：问题 + 来源摘录
pub fn answer_user(state: &InvestigationState, question: &ResearchQuestion, sources: &[Source]) -> String {
    let mut prompt = format!(
        "Target query: {}\n\nResearch question: {}\n\nSource excerpts:\n",
        state.query, question.text
    );
    if sources.is_empty() {
        prompt.push_str("(no sources were retrieved for this question)\n");
    }
    for (i, s) in sources.iter().enumerate() {
        let excerpt: String = s.content.chars().take(600).collect();
        prompt.push_str(&format!(
            "[{}] {} ({}, credibility {:.2})\n{}\n\n",
            i + 1,
            s.title,
            s.url,
            s.credibility,
            excerpt
        ));
    }
    prompt.push_str("Answer the research question from these excerpts.");
    prompt
}

/// 反思阶段的 user prompt：记忆摘要 + 来源类别覆盖度 + 已回答问题
pub fn reflection_user(
    state: &InvestigationState,
    summary: &MemorySummary,
    uncovered: &[SourceType],
) -> String {
    let mut prompt = format!(
        "Target query: {}\n\nProgress: step {}/{} ({} entities, {} sources, {} relationships).\n",
        state.query,
        state.step,
        state.max_steps,
        summary.entity_count,
        summary.source_count,
        summary.relationship_count
    );
    if !summary.top_entities.is_empty() {
        prompt.push_str(&format!("Top entities: {}\n", summary.top_entities.join(", ")));
    }
    if !uncovered.is_empty() {
        let names: Vec<String> = uncovered.iter().map(|c| format!("{c:?}")).collect();
        prompt.push_str(&format!(
            "Source categories with no coverage yet: {}\n",
            names.join(", ")
        ));
    }
    prompt.push_str("\nAnswered questions:\n");
    for q in &state.research_questions {
        if !q.answer.is_empty() {
            prompt.push_str(&format!("- Q: {}\n  A: {}\n", q.text, q.answer));
        }
    }
    prompt.push_str("\nReflect on whether the evidence is sufficient for the final report.");
    prompt
}

/// 综合阶段的 user prompt：全部证据的压缩视图
pub fn report_user(state: &InvestigationState, summary: &MemorySummary) -> String {
    let mut prompt = format!(
        "Target query: {}\n\nInvestigation context:\n{}\n\nAnswered questions:\n",
        state.query, state.investigation_context
    );
    for q in &state.research_questions {
        if !q.answer.is_empty() {
            prompt.push_str(&format!("- Q: {}\n  A: {}\n", q.text, q.answer));
        }
    }
    if !summary.key_findings.is_empty() {
        prompt.push_str("\nKey findings:\n");
        for f in &summary.key_findings {
            prompt.push_str(&format!("- {f}\n"));
        }
    }
    prompt.push_str("\nSources (credibility-ranked):\n");
    for s in state.sources.iter().take(10) {
        prompt.push_str(&format!(
            "- {} ({:?}, credibility {:.2}): {}\n",
            s.url, s.source_type, s.credibility, s.title
        ));
    }
    prompt.push_str("\nWrite the investigation report.");
    prompt
}

/// 评审阶段的 user prompt：报告全文 + 来源统计
pub fn judge_user(state: &InvestigationState) -> String {
    let categories: std::collections::HashSet<_> =
        state.sources.iter().map(|s| s.source_type).collect();
    format!(
        "Target query: {}\n\nReport to review:\n{}\n\nEvidence base: {} sources across {} categories, {} research questions.\n\nScore this report.",
        state.query,
        state.final_report,
        state.sources.len(),
        categories.len(),
        state.research_questions.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflection_prompt_lists_uncovered_categories() {
        let state = InvestigationState::new("Jane Doe", 5);
        let summary = MemorySummary {
            entity_count: 1,
            source_count: 2,
            relationship_count: 0,
            top_entities: vec!["Jane Doe".to_string()],
            key_findings: Vec::new(),
        };

        let prompt = reflection_user(&state, &summary, &[SourceType::News, SourceType::Academic]);
        assert!(prompt.contains("no coverage yet"));
        assert!(prompt.contains("News"));
        assert!(prompt.contains("Academic"));

        let full = reflection_user(&state, &summary, &[]);
        assert!(!full.contains("no coverage yet"));
    }
}
