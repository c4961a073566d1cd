//! 按提供方限速：60 秒滑动窗口 + 最小请求间隔
//!
//! wait(provider) 只挂起调用方任务，不跨 await 持锁；窗口计数由 Mutex 保护，
//! 多个检索任务并发调用安全。不同提供方互不影响。

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// 单个提供方的限速配置
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// 每分钟请求上限
    pub per_minute: u32,
    /// 相邻请求最小间隔
    pub min_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { per_minute: 100, min_delay_ms: 100 }
    }
}

/// 滑动窗口长度（固定 60 秒）
const WINDOW: Duration = Duration::from_secs(60);

/// 按提供方键（"openai"、"google"、"synthetic" 等）限速
pub struct RateLimiter {
    limits: HashMap<String, RateLimitConfig>,
    default_limit: RateLimitConfig,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, RateLimitConfig>, default_limit: RateLimitConfig) -> Self {
        Self {
            limits,
            default_limit,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn limit_for(&self, provider: &str) -> RateLimitConfig {
        let mut limit = self.limits.get(provider).copied().unwrap_or(self.default_limit);
        // 0 配额按最严格节流处理（每窗口 1 次），而不是让调用方饿死或越界
        limit.per_minute = limit.per_minute.max(1);
        limit
    }

    /// 窗口内是否还有配额（不阻塞、不记录）
    pub async fn check_limit(&self, provider: &str) -> bool {
        let limit = self.limit_for(provider);
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let window = windows.entry(provider.to_string()).or_default();
        prune(window, now);
        (window.len() as u32) < limit.per_minute
    }

    /// 阻塞当前任务直到窗口约束与最小间隔都满足，然后记录本次请求
    pub async fn wait(&self, provider: &str) {
        let limit = self.limit_for(provider);
        loop {
            let sleep_for = {
                let now = Instant::now();
                let mut windows = self.windows.lock().await;
                let window = windows.entry(provider.to_string()).or_default();
                prune(window, now);

                if let Some(oldest) = window.front().copied().filter(|_| {
                    (window.len() as u32) >= limit.per_minute
                }) {
                    // 等最老的一条滑出窗口
                    (oldest + WINDOW).saturating_duration_since(now) + Duration::from_millis(10)
                } else if let Some(last) = window.back() {
                    let min_delay = Duration::from_millis(limit.min_delay_ms);
                    let since_last = now.saturating_duration_since(*last);
                    if since_last < min_delay {
                        min_delay - since_last
                    } else {
                        window.push_back(now);
                        return;
                    }
                } else {
                    window.push_back(now);
                    return;
                }
            };
            // 锁已释放，挂起的只有当前任务
            tokio::time::sleep(sleep_for).await;
        }
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = window.front() {
        if now.saturating_duration_since(*front) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
