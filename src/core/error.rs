//! 调查错误分类
//!
//! 与 DurableCoordinator 的重试策略配合：Validation 不重试直接上抛；Provider / RateLimited /
//! Timeout 为瞬时外部故障，按退避重试；Critical 保守处理，最多重试一次后强制推进。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 调查运行过程中可能出现的错误（按可重试性分类）
#[derive(Error, Debug)]
pub enum InvestigationError {
    /// 输入/请求形状错误，不可重试，立即上抛
    #[error("Validation error: {0}")]
    Validation(String),

    /// 外部提供方瞬时故障（LLM / 搜索 API）
    #[error("Provider error: {0}")]
    Provider(String),

    /// 被限流，退避后重试
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// 超步超出时间预算
    #[error("Step timed out after {0:?}")]
    Timeout(Duration),

    /// 未分类错误，保守处理
    #[error("Critical error: {0}")]
    Critical(String),
}

impl InvestigationError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, InvestigationError::Validation(_))
    }

    /// 该错误类别允许的最大尝试次数（Critical 只多给一次机会）
    pub fn max_attempts(&self, budget: u32) -> u32 {
        match self {
            InvestigationError::Validation(_) => 1,
            InvestigationError::Critical(_) => budget.min(2),
            _ => budget,
        }
    }
}

impl From<LlmError> for InvestigationError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Validation(msg) => InvestigationError::Validation(msg),
            LlmError::RateLimited { retry_after_ms } => {
                InvestigationError::RateLimited { retry_after_ms }
            }
            LlmError::Timeout => InvestigationError::Timeout(Duration::ZERO),
            LlmError::Provider(msg) => InvestigationError::Provider(msg),
        }
    }
}
