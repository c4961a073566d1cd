//! DurableCoordinator：调查的超步循环
//!
//! 每个超步：对当前阶段调用执行器（带超时与心跳看门狗），按错误类别退避重试；
//! 成功则合并 StateDiff，重试耗尽则记一条失败笔记并强制 step+1（保证活性，
//! 同一阶段失败不会卡死循环）；每次合并后整体持久化。循环出口保证终态。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::durable::DurableBackend;
use crate::core::error::InvestigationError;
use crate::core::state::{InvestigationState, Phase, StateDiff};
use crate::phases::PhaseExecutor;

/// 超步重试策略
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_multiplier: f64,
    pub max_interval: Duration,
    /// 单个超步的总时间预算
    pub step_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            max_interval: Duration::from_secs(120),
            step_timeout: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次失败后的退避间隔（attempt 从 1 起）
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let interval = self.initial_interval.mul_f64(factor);
        interval.min(self.max_interval)
    }
}

/// 阶段执行期间的心跳句柄；长操作（逐来源检索等）期间由执行器调用 beat()
#[derive(Clone)]
pub struct Heartbeat {
    last: Arc<Mutex<Instant>>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn beat(&self) {
        *self.last.lock().unwrap() = Instant::now();
    }

    /// 距上次心跳的时长
    pub fn idle(&self) -> Duration {
        self.last.lock().unwrap().elapsed()
    }
}

/// 协调器对外广播的进度事件
#[derive(Clone, Debug)]
pub enum PhaseEvent {
    StepStarted { step: u32, phase: Phase },
    StepCompleted { step: u32, phase: Phase },
    StepRetrying { step: u32, attempt: u32, error: String },
    StepFailed { step: u32, error: String },
    Finished { step: u32, phase: Phase },
}

/// 心跳看门狗的检查间隔
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(15);
/// 心跳空闲超过此值记告警
const HEARTBEAT_WARN_AFTER: Duration = Duration::from_secs(60);

/// 可恢复的调查协调器
pub struct DurableCoordinator {
    executor: PhaseExecutor,
    backend: Arc<dyn DurableBackend>,
    policy: RetryPolicy,
    events: Option<broadcast::Sender<PhaseEvent>>,
    cancel: CancellationToken,
}

impl DurableCoordinator {
    pub fn new(executor: PhaseExecutor, backend: Arc<dyn DurableBackend>) -> Self {
        Self {
            executor,
            backend,
            policy: RetryPolicy::default(),
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<PhaseEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// 外部取消令牌：取消后在下一个超步边界停下，留下可恢复的快照
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn emit(&self, event: PhaseEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// 启动一次新调查并驱动到终态；空查询立即拒绝
    pub async fn run(
        &self,
        query: impl Into<String>,
        max_steps: u32,
    ) -> Result<InvestigationState, InvestigationError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(InvestigationError::Validation(
                "investigation query is empty".to_string(),
            ));
        }
        let state = InvestigationState::new(query, max_steps);
        self.backend.persist(&state).await?;
        self.drive(state).await
    }

    /// 从持久化快照恢复并继续驱动；无快照时返回 None。
    /// 记忆账本不在快照里，恢复前先用状态里的实体与来源重建，
    /// 否则反思 / 综合阶段拿到的摘要是空的。
    pub async fn resume(
        &self,
        investigation_id: &str,
    ) -> Result<Option<InvestigationState>, InvestigationError> {
        match self.backend.load(investigation_id).await? {
            Some(state) => {
                self.executor.memory().rebuild_from_state(&state);
                Ok(Some(self.drive(state).await?))
            }
            None => Ok(None),
        }
    }

    /// 超步循环：每轮执行、合并、持久化，出口保证终态
    async fn drive(
        &self,
        mut state: InvestigationState,
    ) -> Result<InvestigationState, InvestigationError> {
        while !state.should_terminate() {
            if self.cancel.is_cancelled() {
                // 不强制终态：快照已持久化，后续可 resume
                tracing::info!(
                    investigation_id = %state.investigation_id,
                    step = state.step,
                    "investigation cancelled at step boundary"
                );
                return Ok(state);
            }
            self.emit(PhaseEvent::StepStarted {
                step: state.step,
                phase: state.phase,
            });

            match self.execute_step(&state).await {
                Ok(diff) => {
                    state.apply(diff);
                    self.emit(PhaseEvent::StepCompleted {
                        step: state.step,
                        phase: state.phase,
                    });
                }
                Err(err) => {
                    // 重试耗尽：记一条失败笔记并强制推进 step，保证循环活性
                    tracing::error!(
                        investigation_id = %state.investigation_id,
                        phase = ?state.phase,
                        error = %err,
                        "phase failed after retries"
                    );
                    let mut diff = StateDiff::next_step(&state);
                    diff.notes.push(format!(
                        "step {}: phase {:?} failed: {err}",
                        diff.step, state.phase
                    ));
                    if matches!(err, InvestigationError::Validation(_)) {
                        diff.phase = Some(Phase::Failed);
                    }
                    self.emit(PhaseEvent::StepFailed {
                        step: diff.step,
                        error: err.to_string(),
                    });
                    state.apply(diff);
                }
            }

            self.backend.persist(&state).await?;
        }

        // 收尾：循环可能因预算耗尽退出而阶段仍非终态
        if !state.phase.is_terminal() {
            let mut diff = StateDiff {
                step: state.step,
                ..StateDiff::default()
            };
            if state.final_report.is_empty() {
                diff.phase = Some(Phase::Failed);
                diff.notes.push(format!(
                    "step {}: budget exhausted before a report was produced",
                    state.step
                ));
            } else {
                diff.phase = Some(Phase::Complete);
            }
            state.apply(diff);
            self.backend.persist(&state).await?;
        }

        tracing::info!(
            investigation_id = %state.investigation_id,
            phase = ?state.phase,
            step = state.step,
            sources = state.sources.len(),
            entities = state.entities.len(),
            "investigation finished"
        );
        self.emit(PhaseEvent::Finished {
            step: state.step,
            phase: state.phase,
        });
        Ok(state)
    }

    /// 执行一个超步：超时 + 心跳看门狗 + 按错误类别退避重试
    async fn execute_step(
        &self,
        state: &InvestigationState,
    ) -> Result<StateDiff, InvestigationError> {
        let mut attempt: u32 = 1;
        loop {
            let heartbeat = Heartbeat::new();
            let watchdog = spawn_watchdog(heartbeat.clone(), state.investigation_id.clone());

            let result = timeout(
                self.policy.step_timeout,
                self.executor.execute(state, &heartbeat),
            )
            .await;
            watchdog.abort();

            let err = match result {
                Ok(Ok(diff)) => return Ok(diff),
                Ok(Err(e)) => e,
                Err(_) => InvestigationError::Timeout(self.policy.step_timeout),
            };

            let allowed = err.max_attempts(self.policy.max_attempts);
            if !err.is_retryable() || attempt >= allowed {
                return Err(err);
            }

            let mut delay = self.policy.backoff(attempt);
            if let InvestigationError::RateLimited { retry_after_ms } = &err {
                delay = delay.max(Duration::from_millis(*retry_after_ms));
            }
            tracing::warn!(
                investigation_id = %state.investigation_id,
                phase = ?state.phase,
                attempt,
                allowed,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "phase attempt failed, backing off"
            );
            self.emit(PhaseEvent::StepRetrying {
                step: state.step,
                attempt,
                error: err.to_string(),
            });
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// 看门狗：阶段执行期间周期性检查心跳，空闲过久记告警（不中断执行）
fn spawn_watchdog(heartbeat: Heartbeat, investigation_id: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(WATCHDOG_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let idle = heartbeat.idle();
            if idle > HEARTBEAT_WARN_AFTER {
                tracing::warn!(
                    investigation_id = %investigation_id,
                    idle_secs = idle.as_secs(),
                    "phase heartbeat is stale"
                );
            }
        }
    })
}
