//! Argus - Rust OSINT 调查编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 调查状态、StateDiff、错误分类、持久化后端、超步协调器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 调查记忆账本（实体 / 关系 / 来源 / 发现）与 checkpoint
//! - **phases**: 六阶段执行器（分析、规划、检索、反思、综合、评审）
//! - **retrieval**: 多来源并行检索、限速、抓取、可信度打分

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod phases;
pub mod retrieval;

pub use crate::core::{DurableCoordinator, InvestigationState, Phase};
pub use crate::phases::PhaseExecutor;
