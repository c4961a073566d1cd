//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARGUS__*` 覆盖（双下划线表示嵌套，
//! 如 `ARGUS__COORDINATOR__MAX_STEPS=8`、`ARGUS__RETRIEVAL__MODE=offline`）。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::coordinator::RetryPolicy;
use crate::retrieval::{RateLimitConfig, RetrievalConfig};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    /// [rate_limits.<provider>] 段：按提供方覆盖默认限速
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitSection>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端与模型选择
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// openai / mock；无 API Key 时自动退回 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [coordinator] 段：超步预算与重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSection {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_interval_secs")]
    pub initial_interval_secs: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

fn default_max_steps() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_interval_secs() -> u64 {
    2
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_interval_secs() -> u64 {
    120
}

fn default_step_timeout_secs() -> u64 {
    600
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_attempts: default_max_attempts(),
            initial_interval_secs: default_initial_interval_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_interval_secs: default_max_interval_secs(),
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

impl CoordinatorSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_interval: Duration::from_secs(self.initial_interval_secs),
            backoff_multiplier: self.backoff_multiplier,
            max_interval: Duration::from_secs(self.max_interval_secs),
            step_timeout: Duration::from_secs(self.step_timeout_secs),
        }
    }
}

/// [retrieval] 段：检索模式与扇出参数
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    /// auto / online / offline；auto 按凭据是否齐全选择
    #[serde(default = "default_retrieval_mode")]
    pub mode: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_results_per_category")]
    pub results_per_category: usize,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
}

fn default_retrieval_mode() -> String {
    "auto".to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_results_per_category() -> usize {
    2
}

fn default_max_content_chars() -> usize {
    2000
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            mode: default_retrieval_mode(),
            concurrency: default_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            results_per_category: default_results_per_category(),
            max_content_chars: default_max_content_chars(),
            google_api_key: None,
            google_cse_id: None,
        }
    }
}

impl RetrievalSection {
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            concurrency: self.concurrency,
            fetch_timeout_secs: self.fetch_timeout_secs,
            results_per_category: self.results_per_category,
            max_content_chars: self.max_content_chars,
        }
    }

    fn credentials(&self) -> Option<(String, String)> {
        let key = self
            .google_api_key
            .clone()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())?;
        let cse = self
            .google_cse_id
            .clone()
            .or_else(|| std::env::var("GOOGLE_CSE_ID").ok())?;
        if key.is_empty() || cse.is_empty() {
            return None;
        }
        Some((key, cse))
    }

    /// 解析最终检索模式；auto 且凭据齐全则 online，否则 offline
    pub fn resolve(&self) -> ResolvedRetrieval {
        match self.mode.as_str() {
            "offline" => ResolvedRetrieval::Offline,
            "online" => match self.credentials() {
                Some((key, cse)) => ResolvedRetrieval::Online { api_key: key, cse_id: cse },
                None => {
                    tracing::warn!("retrieval mode is 'online' but credentials are missing, using offline sources");
                    ResolvedRetrieval::Offline
                }
            },
            _ => match self.credentials() {
                Some((key, cse)) => ResolvedRetrieval::Online { api_key: key, cse_id: cse },
                None => ResolvedRetrieval::Offline,
            },
        }
    }
}

/// resolve() 的结果：凭据已就位或确定离线
pub enum ResolvedRetrieval {
    Online { api_key: String, cse_id: String },
    Offline,
}

/// [rate_limits.*] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
}

fn default_per_minute() -> u32 {
    60
}

fn default_min_delay_ms() -> u64 {
    100
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            min_delay_ms: default_min_delay_ms(),
        }
    }
}

impl RateLimitSection {
    pub fn to_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            per_minute: self.per_minute,
            min_delay_ms: self.min_delay_ms,
        }
    }
}

impl AppConfig {
    /// 按提供方的限速表（含配置文件中的覆盖项）
    pub fn rate_limit_table(&self) -> HashMap<String, RateLimitConfig> {
        self.rate_limits
            .iter()
            .map(|(provider, section)| (provider.clone(), section.to_config()))
            .collect()
    }
}

/// 从 config 目录加载配置，环境变量 ARGUS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ARGUS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARGUS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
