//! web_fetch tool: fetches a URL and returns a text excerpt, guarded by a
//! circuit breaker so a flaky endpoint doesn't get hammered on every turn.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::{CommanderError, Result};
use crate::tools::Tool;

const MAX_FETCH_BYTES: usize = 200_000;
const FETCH_TIMEOUT_SECS: u64 = 15;
const MAX_FAILURES: u32 = 3;
const COOLDOWN_SECS: u64 = 60;

struct CircuitBreaker {
    failure_count: AtomicU32,
    last_failure: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    fn new() -> Self {
        Self { failure_count: AtomicU32::new(0), last_failure: Mutex::new(None) }
    }

    fn is_open(&self) -> bool {
        if self.failure_count.load(Ordering::SeqCst) < MAX_FAILURES {
            return false;
        }
        let mut last = self.last_failure.lock().unwrap();
        match *last {
            Some(t) if t.elapsed().as_secs() >= COOLDOWN_SECS => {
                self.failure_count.store(0, Ordering::SeqCst);
                *last = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        *self.last_failure.lock().unwrap() = None;
    }

    fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::SeqCst);
        *self.last_failure.lock().unwrap() = Some(Instant::now());
    }
}

pub struct WebFetchTool {
    breaker: CircuitBreaker,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self { breaker: CircuitBreaker::new() }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &'static str {
        "web_fetch"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "web_fetch",
            "description": "Fetch a URL over HTTP(S) and return a text excerpt of the body.",
            "parameters": {
                "type": "object",
                "properties": {
                    "url": {"type": "string"}
                },
                "required": ["url"]
            }
        })
    }

    async fn call(&self, args: &Value, _cwd: Option<&str>) -> Result<String> {
        if self.breaker.is_open() {
            return Ok("Error: web_fetch temporarily disabled after repeated failures".to_string());
        }

        let Some(url) = args.get("url").and_then(|v| v.as_str()).or_else(|| args.as_str()) else {
            return Ok("Error: missing 'url'".to_string());
        };

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Ok("Error: url must start with http:// or https://".to_string());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(CommanderError::Http)?;

        let result = client.get(url).send().await;
        match result {
            Ok(response) => {
                let status = response.status();
                let is_html = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|ct| ct.to_lowercase().contains("html"))
                    .unwrap_or(false);
                let body = response.text().await.unwrap_or_default();
                self.breaker.record_success();
                let body = if is_html { strip_html(&body) } else { body };
                let mut excerpt: String = body.chars().take(MAX_FETCH_BYTES).collect();
                if body.len() > excerpt.len() {
                    excerpt.push_str("\n... [truncated]");
                }
                Ok(format!("status: {status}\n\n{excerpt}"))
            }
            Err(e) => {
                self.breaker.record_failure();
                Ok(format!("Error: {e}"))
            }
        }
    }
}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script>").expect("static html-strip pattern must compile")
    })
}

fn style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<style\b[^>]*>.*?</style>").expect("static html-strip pattern must compile")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("static tag pattern must compile"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("static whitespace pattern must compile"))
}

/// Reduce an HTML document to plain text: drop `<script>`/`<style>`
/// blocks, then strip all remaining tags, collapsing the blank lines
/// the removed tags leave behind.
fn strip_html(body: &str) -> String {
    let without_scripts = script_re().replace_all(body, "");
    let without_scripts = style_re().replace_all(&without_scripts, "");
    let without_tags = tag_re().replace_all(&without_scripts, "");
    let collapsed = whitespace_re().replace_all(&without_tags, "\n\n");
    collapsed.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_opens_after_max_failures() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.is_open());
        for _ in 0..MAX_FAILURES {
            breaker.record_failure();
        }
        assert!(breaker.is_open());
    }

    #[test]
    fn circuit_breaker_resets_on_success() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn web_fetch_rejects_non_http_scheme() {
        let tool = WebFetchTool::new();
        let out = tool.call(&json!({"url": "file:///etc/passwd"}), None).await.unwrap();
        assert!(out.starts_with("Error: "));
    }

    #[test]
    fn strip_html_drops_scripts_and_tags() {
        let doc = "<html><head><style>body{color:red}</style></head><body><script>alert(1)</script><p>Hello <b>world</b></p></body></html>";
        let text = strip_html(doc);
        assert!(!text.contains("alert"));
        assert!(!text.contains("color:red"));
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains('<'));
    }
}
