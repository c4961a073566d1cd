//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::complete；错误按可重试性分类，
//! 由 core 层映射为 InvestigationError 并交给协调器的重试策略。

use async_trait::async_trait;
use thiserror::Error;

/// 对话角色
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 一条对话消息（Prompt 由 system + user 消息拼装）
#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// LLM 调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    /// 请求形状错误（如空消息列表），不可重试
    #[error("Validation error: {0}")]
    Validation(String),

    /// 提供方限流
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// 请求超时
    #[error("Request timed out")]
    Timeout,

    /// 其它提供方错误（网络、5xx 等）
    #[error("Provider error: {0}")]
    Provider(String),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
