//! 页面抓取：GET + HTML 文本提取 + 截断
//!
//! 对 HTML 响应使用 html2text 提取可读文本（失败时退回手写去标签）；
//! 响应超过 max_chars 时按字符截断并追加 ...[truncated]，控制每个来源的内存占用。

use std::time::Duration;

use html2text::from_read;
use reqwest::Client;

use crate::retrieval::provider::RetrievalError;

const USER_AGENT: &str = "argus-osint/0.1 (open-source research tool)";

/// 页面抓取器：带超时与 UA 的 reqwest Client，统一做 HTML 转文本与截断
pub struct PageFetcher {
    client: Client,
    max_chars: usize,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

impl PageFetcher {
    pub fn new(timeout_secs: u64, max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, max_chars }
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    /// 抓取 URL 并返回截断后的纯文本
    pub async fn fetch(&self, url: &str) -> Result<String, RetrievalError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RetrievalError::Provider(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(RetrievalError::Provider(format!("HTTP {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| RetrievalError::Provider(format!("read body: {e}")))?;
        Ok(self.truncate(&self.extract_text(&body)))
    }

    /// 去除 BOM（否则 HTML 检测失败），HTML 正文转可读文本
    fn extract_text(&self, body: &str) -> String {
        let body = body.trim_start_matches('\u{FEFF}');
        if looks_like_html(body) {
            self.html_to_text(body)
        } else {
            body.to_string()
        }
    }

    /// 按字符数截断
    pub fn truncate(&self, text: &str) -> String {
        if text.chars().count() > self.max_chars {
            text.chars().take(self.max_chars).collect::<String>() + "\n...[truncated]"
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_tags_removes_markup() {
        let html = "<html><body><h1>Title</h1><p>Some  text</p></body></html>";
        let text = strip_html_tags(html);
        assert!(!text.contains('<'));
        assert!(text.contains("Title"));
        assert!(text.contains("Some text"));
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html>..."));
        assert!(!looks_like_html("plain text body"));
    }

    #[test]
    fn test_bom_prefixed_html_is_detected_and_stripped() {
        let fetcher = PageFetcher::new(30, 1000);
        let out = fetcher.extract_text("\u{FEFF}<html><body><p>Hello world</p></body></html>");
        assert!(out.contains("Hello world"));
        assert!(!out.contains('\u{FEFF}'));
        assert!(!out.contains('<'));

        let plain = fetcher.extract_text("\u{FEFF}plain text body");
        assert_eq!(plain, "plain text body");
    }

    #[test]
    fn test_truncate_bounds_content_length() {
        let fetcher = PageFetcher::new(30, 10);
        let out = fetcher.truncate("0123456789abcdef");
        assert!(out.starts_with("0123456789"));
        assert!(out.ends_with("...[truncated]"));
    }
}
