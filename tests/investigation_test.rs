//! 调查全流程集成测试
//!
//! 全部走离线栈（Mock LLM + 合成来源），验证端到端属性：预算内到达终态、
//! 报告与质量评审产出、来源去重与可信度契约、瞬时故障对最终状态不可见。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use argus::core::{
    DurableCoordinator, InMemoryDurable, InvestigationState, Phase, QuestionStatus, RetryPolicy,
};
use argus::llm::{ChatMessage, LlmClient, LlmError, MockLlmClient};
use argus::memory::MemoryStore;
use argus::phases::PhaseExecutor;
use argus::retrieval::{RateLimitConfig, RateLimiter, RetrievalConfig, RetrievalManager};

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_interval: std::time::Duration::from_millis(1),
        backoff_multiplier: 2.0,
        max_interval: std::time::Duration::from_millis(8),
        step_timeout: std::time::Duration::from_secs(60),
    }
}

fn offline_coordinator(llm: Arc<dyn LlmClient>) -> DurableCoordinator {
    let limiter = Arc::new(RateLimiter::new(
        HashMap::new(),
        RateLimitConfig { per_minute: 10_000, min_delay_ms: 0 },
    ));
    let executor = PhaseExecutor::new(
        llm,
        Arc::new(RetrievalManager::offline(limiter, RetrievalConfig::default())),
        Arc::new(MemoryStore::new()),
    );
    DurableCoordinator::new(executor, Arc::new(InMemoryDurable::new())).with_policy(fast_policy())
}

/// 前 N 次调用限流失败，之后转发给 Mock
struct FlakyLlm {
    remaining_failures: AtomicU32,
    inner: MockLlmClient,
}

impl FlakyLlm {
    fn failing(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
            inner: MockLlmClient,
        }
    }
}

#[async_trait]
impl LlmClient for FlakyLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let should_fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(LlmError::RateLimited { retry_after_ms: 1 });
        }
        self.inner.complete(messages).await
    }
}

fn assert_invariants(state: &InvestigationState) {
    assert!(state.step <= state.max_steps, "step exceeds budget");
    for e in &state.entities {
        assert!((0.0..=1.0).contains(&e.confidence), "entity confidence out of range");
    }
    for s in &state.sources {
        assert!((0.1..=1.0).contains(&s.credibility), "credibility out of range");
    }
    let mut seen = HashSet::new();
    for s in &state.sources {
        assert!(seen.insert(s.dedup_key()), "duplicate source {}", s.url);
    }
}

#[tokio::test]
async fn test_default_budget_investigation_completes() {
    let coordinator = offline_coordinator(Arc::new(MockLlmClient));
    let state = coordinator.run("Jane Doe", 5).await.unwrap();

    assert_eq!(state.phase, Phase::Complete);
    assert_invariants(&state);
    assert!(!state.final_report.is_empty());
    assert!(state.final_report.contains("Jane Doe"));
    // 预算压缩：评审折叠进综合步，质量分照常产出
    let quality = state.quality.as_ref().expect("quality review present");
    assert!((0.0..=1.0).contains(&quality.overall_score));
    assert!(!state.sources.is_empty());
    assert!(state.notes.is_empty(), "clean run must leave no notes");
    assert!(state
        .research_questions
        .iter()
        .all(|q| q.status.is_terminal()));
}

#[tokio::test]
async fn test_generous_budget_runs_separate_judge_step() {
    let coordinator = offline_coordinator(Arc::new(MockLlmClient));
    let state = coordinator.run("Jane Doe", 10).await.unwrap();

    assert_eq!(state.phase, Phase::Complete);
    assert_invariants(&state);
    assert!(state.quality.is_some());
    // 逐题推进：问题按序完成，答案带来源引用
    for q in &state.research_questions {
        assert_eq!(q.status, QuestionStatus::Completed);
        assert!(!q.answer.is_empty());
        assert!(!q.sources.is_empty());
    }
}

#[tokio::test]
async fn test_transient_rate_limits_leave_no_trace() {
    let coordinator = offline_coordinator(Arc::new(FlakyLlm::failing(2)));
    let state = coordinator.run("Jane Doe", 8).await.unwrap();

    assert_eq!(state.phase, Phase::Complete);
    assert!(state.notes.is_empty(), "retried failures must not surface in state");
    assert!(!state.final_report.is_empty());
}

#[tokio::test]
async fn test_step_counter_is_monotonic_across_run() {
    // 每次 drive 迭代 step 恰好 +1（活性：失败也推进）
    let coordinator = offline_coordinator(Arc::new(MockLlmClient));
    let state = coordinator.run("Jane Doe", 5).await.unwrap();
    assert_eq!(state.step, state.max_steps);
}

#[tokio::test]
async fn test_entity_merge_is_idempotent_across_phases() {
    // 分析阶段多次重试会重复写入同一实体；账本合并保证状态中不出现重复
    let coordinator = offline_coordinator(Arc::new(FlakyLlm::failing(1)));
    let state = coordinator.run("Jane Doe", 8).await.unwrap();

    let mut names = HashSet::new();
    for e in &state.entities {
        assert!(
            names.insert(e.name.to_lowercase()),
            "duplicate entity {}",
            e.name
        );
    }
}

#[tokio::test]
async fn test_offline_sources_span_multiple_categories() {
    let coordinator = offline_coordinator(Arc::new(MockLlmClient));
    let state = coordinator.run("Jane Doe", 10).await.unwrap();

    let categories: HashSet<_> = state.sources.iter().map(|s| s.source_type).collect();
    assert!(
        categories.len() >= 3,
        "expected diverse source categories, got {categories:?}"
    );
}
