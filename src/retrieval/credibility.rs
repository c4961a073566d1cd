//! 来源可信度打分（确定性加权启发式）
//!
//! 基准 0.5；域名按档位取一项加分（机构 > 新闻 > 职业网络），博客/论坛/社交扣分；
//! 标题与正文长度、HTTPS 各有小幅加分。最终夹取到 [0.1, 1.0]。

/// 公认新闻域名指示词
const PRESS_DOMAINS: [&str; 4] = ["reuters", "bbc", "ap.org", "npr"];
/// 职业网络域名指示词
const PROFESSIONAL_DOMAINS: [&str; 3] = ["linkedin", "researchgate", "scholar.google"];
/// 低可信度指示词（博客 / 论坛 / 社交）
const LOW_SIGNAL: [&str; 4] = ["blog", "forum", "social", "reddit"];

/// 计算来源可信度；url 为完整 URL，title / content 为抓取内容
pub fn credibility_score(url: &str, title: &str, content: &str) -> f64 {
    let domain = url.to_lowercase();
    let mut score: f64 = 0.5;

    // 域名档位：取首个命中的一项
    if [".gov", ".edu", ".org"].iter().any(|tld| domain.contains(tld)) {
        score += 0.3;
    } else if PRESS_DOMAINS.iter().any(|d| domain.contains(d)) {
        score += 0.25;
    } else if PROFESSIONAL_DOMAINS.iter().any(|d| domain.contains(d)) {
        score += 0.2;
    }

    if LOW_SIGNAL.iter().any(|d| domain.contains(d)) {
        score -= 0.1;
    }

    if title.len() > 10 {
        score += 0.05;
    }
    if content.len() > 200 {
        score += 0.05;
    }
    if url.starts_with("https://") {
        score += 0.02;
    }

    score.clamp(0.1, 1.0)
}
