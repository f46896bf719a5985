//! Completion backend: the prompt-in/text-out seam and its retry policy.
//!
//! Everything network-facing lives here. The rest of the pipeline only sees
//! [`CompletionClient`], so tests drive the whole pipeline with a scripted
//! in-memory client and never open a socket.
//!
//! ## Retry Strategy
//!
//! Only transient failures are retried: HTTP 429 and any 5xx. The status is
//! read from [`BackendError::Status`] when the backend gave us one, otherwise
//! sniffed from the error text (`Error code: 503`, `status code: 502`), since
//! proxies and TLS layers often flatten the response into a string.
//! Backoff is `base * 2^(retry-1)`: with the default 1 s base and 2 retries the
//! waits are 1 s then 2 s. A timeout is not retried on its own.

use crate::config::SummarizerConfig;
use crate::error::{BackendError, CompletionError, SummarizeError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// A chat-completion backend reduced to its essence.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `prompt` as a single user message and return the first choice's
    /// text.
    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

// ── Retry ────────────────────────────────────────────────────────────────

/// Bounded exponential backoff for transient backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SummarizerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Sleep before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

static ERROR_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)error code:\s*(\d{3})").unwrap());
static STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)status(?:[ _]?code)?\s*[:=]\s*(\d{3})\b").unwrap());

/// HTTP status carried by `err`, structured or embedded in its message.
pub fn status_code_of(err: &BackendError) -> Option<u16> {
    if let BackendError::Status { status, .. } = err {
        return Some(*status);
    }
    let text = err.to_string();
    [&*ERROR_CODE_RE, &*STATUS_RE]
        .iter()
        .find_map(|re| re.captures(&text))
        .and_then(|caps| caps[1].parse().ok())
}

/// `true` for 429 and 5xx.
pub fn is_retryable(err: &BackendError) -> bool {
    matches!(status_code_of(err), Some(429) | Some(500..=599))
}

/// Call `client.complete`, retrying transient failures per `policy`.
pub async fn call_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String, CompletionError> {
    let max_attempts = policy.max_retries + 1;
    let mut attempt = 1;
    loop {
        match client.complete(prompt).await {
            Ok(text) => {
                debug!("LLM call succeeded on attempt {attempt} ({} chars)", text.len());
                return Ok(text);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "LLM call attempt {attempt}/{max_attempts} failed ({e}); retrying in {:.1}s",
                    delay.as_secs_f64()
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(CompletionError {
                    attempts: attempt,
                    source: e,
                });
            }
        }
    }
}

// ── OpenAI-compatible HTTP client ────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// [`CompletionClient`] for any `/chat/completions` endpoint (OpenRouter,
/// OpenAI, LM Studio, vLLM, …).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    timeout: Duration,
}

/// Attribution headers OpenRouter asks for; empty for every other host.
pub fn provider_headers(base: &reqwest::Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if base
        .host_str()
        .is_some_and(|host| host.contains("openrouter.ai"))
    {
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_static(concat!(
                "https://crates.io/crates/",
                env!("CARGO_PKG_NAME")
            )),
        );
        headers.insert("X-Title", HeaderValue::from_static(env!("CARGO_PKG_NAME")));
    }
    headers
}

impl OpenAiCompatibleClient {
    /// Build a client from the backend fields of `config`.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, SummarizeError> {
        let base = reqwest::Url::parse(&config.base_url).map_err(|e| {
            SummarizeError::InvalidConfig(format!("invalid base_url '{}': {e}", config.base_url))
        })?;

        let headers = provider_headers(&base);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| SummarizeError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
            max_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };

        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                BackendError::Timeout {
                    secs: self.timeout.as_secs(),
                }
            } else {
                BackendError::Transport(e.to_string())
            }
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                transport(e)
            } else {
                BackendError::InvalidResponse(e.to_string())
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::InvalidResponse("no message content in first choice".into()))
    }
}

/// Connectivity check against the scheme+host root of `base_url`.
///
/// Any HTTP response, whatever its status, counts as reachable; only a
/// connection-level failure is an error.
pub async fn check_reachable(base_url: &str, timeout: Duration) -> Result<(), BackendError> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| BackendError::Transport(format!("invalid base URL '{base_url}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| BackendError::Transport(format!("base URL '{base_url}' has no host")))?;
    let root = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Transport(e.to_string()))?;

    match client.get(&root).send().await {
        Ok(resp) => {
            debug!("{root} reachable (HTTP {})", resp.status());
            Ok(())
        }
        Err(e) if e.is_timeout() => Err(BackendError::Timeout {
            secs: timeout.as_secs(),
        }),
        Err(e) => Err(BackendError::Transport(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, BackendError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, BackendError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, _prompt: &str) -> Result<String, BackendError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".into())))
        }
    }

    fn status(code: u16) -> BackendError {
        BackendError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn status_sniffed_from_message_text() {
        let e = BackendError::Transport("upstream said Error code: 503 - overloaded".into());
        assert_eq!(status_code_of(&e), Some(503));
        let e = BackendError::Transport("HTTP status code: 429 Too Many Requests".into());
        assert_eq!(status_code_of(&e), Some(429));
        let e = BackendError::Transport("connection reset by peer".into());
        assert_eq!(status_code_of(&e), None);
    }

    #[test]
    fn bare_status_mention_is_not_a_status_code() {
        let e = BackendError::Transport("proxy returned status 500 earlier, retry later".into());
        assert_eq!(status_code_of(&e), None);
        assert!(!is_retryable(&e));
        let e = BackendError::Transport("status=502".into());
        assert_eq!(status_code_of(&e), Some(502));
    }

    #[test]
    fn classification() {
        assert!(is_retryable(&status(429)));
        assert!(is_retryable(&status(500)));
        assert!(is_retryable(&status(599)));
        assert!(!is_retryable(&status(400)));
        assert!(!is_retryable(&status(401)));
        assert!(!is_retryable(&BackendError::Timeout { secs: 120 }));
    }

    #[test]
    fn delays_double() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_429_then_500_then_succeeds() {
        let client = Scripted::new(vec![Err(status(429)), Err(status(500)), Ok("ok".into())]);
        let out = call_with_retry(&client, "p", &RetryPolicy::default()).await;
        assert_eq!(out.unwrap(), "ok");

        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1] - calls[0], Duration::from_secs(1));
        assert_eq!(calls[2] - calls[1], Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_fails_immediately() {
        let client = Scripted::new(vec![Err(status(401)), Ok("never".into())]);
        let err = call_with_retry(&client, "p", &RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.source, status(401));
        assert_eq!(client.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn openrouter_host_gets_attribution_headers() {
        let url = reqwest::Url::parse("https://openrouter.ai/api/v1").unwrap();
        let headers = provider_headers(&url);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["x-title"], env!("CARGO_PKG_NAME"));
        assert!(headers["http-referer"]
            .to_str()
            .unwrap()
            .ends_with(env!("CARGO_PKG_NAME")));
    }

    #[test]
    fn other_hosts_get_no_extra_headers() {
        for base in ["http://localhost:1234/v1", "https://api.openai.com/v1"] {
            let url = reqwest::Url::parse(base).unwrap();
            assert!(provider_headers(&url).is_empty(), "{base}");
        }
    }

    #[test]
    fn request_omits_unset_max_tokens() {
        let body = ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
