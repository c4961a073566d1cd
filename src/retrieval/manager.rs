//! RetrievalManager：多来源并行检索
//!
//! 对每个启用的来源类别并行派发一个搜索任务（有界并发），逐任务限速与超时；
//! 单任务失败只记日志返回零来源，绝不影响整体。结果按 (url, 类别) 去重、
//! 按可信度降序截断。Offline 模式在构造时显式选择（不是调用时按凭据推断）。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::time::timeout;

use crate::core::state::{Source, SourceType};
use crate::retrieval::credibility::credibility_score;
use crate::retrieval::fetch::PageFetcher;
use crate::retrieval::provider::{HttpSearchProvider, SearchProvider, SyntheticProvider};
use crate::retrieval::rate_limit::RateLimiter;

/// 检索模式：构造时确定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrievalMode {
    /// 真实搜索 API + 页面抓取
    Online,
    /// 固定合成来源集（无凭据 / 测试）
    Offline,
}

/// 检索参数（默认值与 config 对应）
#[derive(Clone, Copy, Debug)]
pub struct RetrievalConfig {
    /// 扇出并发上限
    pub concurrency: usize,
    /// 单个搜索/抓取任务的超时
    pub fetch_timeout_secs: u64,
    /// 每个类别最多取的条数
    pub results_per_category: usize,
    /// 抓取正文的最大字符数
    pub max_content_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            fetch_timeout_secs: 30,
            results_per_category: 2,
            max_content_chars: 2000,
        }
    }
}

/// 多来源检索管理器
pub struct RetrievalManager {
    providers: Vec<Arc<dyn SearchProvider>>,
    limiter: Arc<RateLimiter>,
    fetcher: Arc<PageFetcher>,
    mode: RetrievalMode,
    config: RetrievalConfig,
}

impl RetrievalManager {
    /// Offline 模式：全类别合成提供方
    pub fn offline(limiter: Arc<RateLimiter>, config: RetrievalConfig) -> Self {
        let providers: Vec<Arc<dyn SearchProvider>> = SourceType::ALL
            .iter()
            .map(|&st| Arc::new(SyntheticProvider::new(st)) as Arc<dyn SearchProvider>)
            .collect();
        let fetcher = Arc::new(PageFetcher::new(
            config.fetch_timeout_secs,
            config.max_content_chars,
        ));
        Self { providers, limiter, fetcher, mode: RetrievalMode::Offline, config }
    }

    /// Online 模式：全类别 HTTP 提供方（共享 Client）+ 页面抓取
    pub fn online(
        api_key: impl Into<String>,
        cse_id: impl Into<String>,
        limiter: Arc<RateLimiter>,
        config: RetrievalConfig,
    ) -> Self {
        let api_key = api_key.into();
        let cse_id = cse_id.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .unwrap_or_default();
        let providers: Vec<Arc<dyn SearchProvider>> = SourceType::ALL
            .iter()
            .map(|&st| {
                Arc::new(HttpSearchProvider::new(
                    client.clone(),
                    api_key.clone(),
                    cse_id.clone(),
                    st,
                )) as Arc<dyn SearchProvider>
            })
            .collect();
        let fetcher = Arc::new(PageFetcher::new(
            config.fetch_timeout_secs,
            config.max_content_chars,
        ));
        Self { providers, limiter, fetcher, mode: RetrievalMode::Online, config }
    }

    pub fn mode(&self) -> RetrievalMode {
        self.mode
    }

    /// 跨类别检索：并行扇出、去重、按可信度降序、截断到 max_sources
    pub async fn retrieve(&self, query: &str, entity: &str, max_sources: usize) -> Vec<Source> {
        let start = Instant::now();
        // Offline 提供方用实体名构造档案页；Online 用 "实体" + 查询词
        let search_query = match self.mode {
            RetrievalMode::Offline => entity.to_string(),
            RetrievalMode::Online => format!("\"{entity}\" {query}"),
        };

        let fetch_timeout = Duration::from_secs(self.config.fetch_timeout_secs);
        let per_category = self.config.results_per_category;

        let all: Vec<Vec<Source>> = stream::iter(self.providers.iter().cloned())
            .map(|provider| {
                let query = search_query.clone();
                let limiter = self.limiter.clone();
                let fetcher = self.fetcher.clone();
                let mode = self.mode;
                async move {
                    limiter.wait(provider.provider_key()).await;
                    let result =
                        timeout(fetch_timeout, provider.search(&query, per_category)).await;
                    let hits = match result {
                        Ok(Ok(hits)) => hits,
                        Ok(Err(e)) => {
                            tracing::warn!(
                                category = ?provider.source_type(),
                                error = %e,
                                "retrieval task failed, contributing zero sources"
                            );
                            return Vec::new();
                        }
                        Err(_) => {
                            tracing::warn!(
                                category = ?provider.source_type(),
                                "retrieval task timed out"
                            );
                            return Vec::new();
                        }
                    };

                    let mut sources = Vec::with_capacity(hits.len());
                    for hit in hits {
                        let content = match hit.content {
                            Some(content) => content,
                            None if mode == RetrievalMode::Online => {
                                // 正文抓取失败退回 snippet，不放弃该来源
                                match timeout(fetch_timeout, fetcher.fetch(&hit.url)).await {
                                    Ok(Ok(text)) => text,
                                    _ => hit.snippet.clone(),
                                }
                            }
                            None => hit.snippet.clone(),
                        };
                        let credibility = credibility_score(&hit.url, &hit.title, &content);
                        sources.push(Source {
                            url: hit.url,
                            source_type: provider.source_type(),
                            title: hit.title,
                            content,
                            credibility,
                            retrieved_at: Utc::now(),
                        });
                    }
                    sources
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut seen: HashSet<(String, SourceType)> = HashSet::new();
        let mut merged: Vec<Source> = Vec::new();
        for source in all.into_iter().flatten() {
            if seen.insert(source.dedup_key()) {
                merged.push(source);
            }
        }
        merged.sort_by(|a, b| {
            b.credibility
                .partial_cmp(&a.credibility)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(max_sources);

        let audit = serde_json::json!({
            "event": "retrieval_audit",
            "mode": format!("{:?}", self.mode),
            "sources": merged.len(),
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit.to_string(), "retrieval");

        merged
    }
}
