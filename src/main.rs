//! Argus - Rust OSINT 调查编排引擎
//!
//! 入口：加载配置、装配 LLM / 检索 / 记忆 / 协调器，驱动一次调查并输出报告。
//! 用法：argus <query> [max_steps]

use std::sync::Arc;

use anyhow::{bail, Context};

use argus::config::{load_config, ResolvedRetrieval};
use argus::core::{DurableCoordinator, InMemoryDurable, Phase};
use argus::llm::{LlmClient, MockLlmClient, OpenAiClient};
use argus::memory::MemoryStore;
use argus::phases::PhaseExecutor;
use argus::retrieval::{RateLimiter, RetrievalManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    argus::observability::init();

    let mut args = std::env::args().skip(1);
    let query = match args.next() {
        Some(q) if !q.trim().is_empty() => q,
        _ => bail!("usage: argus <query> [max_steps]"),
    };
    let config = load_config(None).context("Failed to load config")?;
    let max_steps = match args.next() {
        Some(n) => n.parse::<u32>().context("max_steps must be an integer")?,
        None => config.coordinator.max_steps,
    };

    // LLM：有 API Key 走 OpenAI 兼容端点，否则退回离线 Mock
    let llm: Arc<dyn LlmClient> = if config.llm.provider == "mock"
        || std::env::var("OPENAI_API_KEY").is_err()
    {
        tracing::info!("no OPENAI_API_KEY, using offline mock client");
        Arc::new(MockLlmClient)
    } else {
        Arc::new(OpenAiClient::new(
            config.llm.base_url.as_deref(),
            &config.llm.model,
            None,
        ))
    };

    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_table(),
        argus::retrieval::RateLimitConfig::default(),
    ));
    let retrieval = match config.retrieval.resolve() {
        ResolvedRetrieval::Online { api_key, cse_id } => RetrievalManager::online(
            api_key,
            cse_id,
            limiter,
            config.retrieval.retrieval_config(),
        ),
        ResolvedRetrieval::Offline => {
            RetrievalManager::offline(limiter, config.retrieval.retrieval_config())
        }
    };

    let executor = PhaseExecutor::new(llm, Arc::new(retrieval), Arc::new(MemoryStore::new()));
    let coordinator = DurableCoordinator::new(executor, Arc::new(InMemoryDurable::new()))
        .with_policy(config.coordinator.retry_policy());

    let state = coordinator
        .run(query.as_str(), max_steps)
        .await
        .context("Investigation failed")?;

    match state.phase {
        Phase::Complete => {
            println!("{}", state.final_report);
            if let Some(quality) = &state.quality {
                eprintln!(
                    "\n[quality] overall {:.2}, status {}",
                    quality.overall_score, quality.approval_status
                );
            }
        }
        _ => {
            eprintln!(
                "investigation ended in {:?} after {} step(s)",
                state.phase, state.step
            );
            for note in &state.notes {
                eprintln!("  note: {note}");
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
