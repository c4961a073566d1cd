//! 检索层：多类别搜索、限速、抓取与可信度打分

pub mod credibility;
pub mod fetch;
pub mod manager;
pub mod provider;
pub mod rate_limit;

pub use credibility::credibility_score;
pub use fetch::PageFetcher;
pub use manager::{RetrievalConfig, RetrievalManager, RetrievalMode};
pub use provider::{RetrievalError, SearchHit, SearchProvider, SyntheticProvider};
pub use rate_limit::{RateLimitConfig, RateLimiter};
