//! Configuration types for paper summarisation.
//!
//! Every run is controlled through [`SummarizerConfig`], built via its
//! [`SummarizerConfigBuilder`]. One struct carries the backend settings, the
//! extraction knobs and the batch options, so the same value can be handed to
//! every worker and logged once at startup.

use crate::error::SummarizeError;
use crate::pipeline::llm::CompletionClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b:free";
/// Environment variable consulted when no API key is configured.
pub const API_KEY_ENV: &str = "LLM_API_KEY";
/// Key sent when neither config nor environment provide one. Local servers
/// such as LM Studio accept any bearer token.
pub const PLACEHOLDER_API_KEY: &str = "lm-studio";

/// Configuration for summarising one or more papers.
///
/// Built via [`SummarizerConfig::builder()`] or using
/// [`SummarizerConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_papersum::{ExtractorStrategy, SummarizerConfig};
///
/// let config = SummarizerConfig::builder()
///     .model("openai/gpt-oss-120b:free")
///     .workers(4)
///     .extractor(ExtractorStrategy::Auto)
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 4);
/// ```
#[derive(Clone)]
pub struct SummarizerConfig {
    /// Base URL of the OpenAI-compatible API, without the `/chat/completions`
    /// suffix. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Bearer token. `None` falls back to `LLM_API_KEY`, then to
    /// [`PLACEHOLDER_API_KEY`]; see [`SummarizerConfig::resolved_api_key`].
    pub api_key: Option<String>,

    /// Hard per-call timeout in seconds. Default: 120.
    ///
    /// A summary of a 40-page paper is a long generation; free-tier hosted
    /// models regularly need more than a minute.
    pub timeout_secs: u64,

    /// Output-token cap. Default: `None`, in which case the field is left out
    /// of the request entirely.
    pub max_output_tokens: Option<u32>,

    /// Maximum characters of extracted text embedded in the prompt. Default: 200 000.
    pub max_chars: usize,

    /// Ignore the `.md` extraction sidecar and re-run the engines. Default: false.
    pub reparse: bool,

    /// Summarise even if the PDF is already listed in the processed index. Default: false.
    pub force_summary: bool,

    /// Which extraction engine(s) to use. Default: [`ExtractorStrategy::Auto`].
    pub extractor: ExtractorStrategy,

    /// List what would be processed without extracting or calling the model. Default: false.
    pub dry_run: bool,

    /// Root directory for rendered summaries and `processed.txt`.
    /// Default: `output_summaries`.
    pub output_dir: PathBuf,

    /// Directory of reference `.md` files embedded in every prompt.
    /// Default: `skill_data/references`.
    pub references_dir: PathBuf,

    /// Number of papers summarised concurrently in batch mode. Default: 3.
    ///
    /// Each worker holds one paper from extraction to rendered output. Keep
    /// this low on free-tier endpoints: every extra worker is one more
    /// concurrent request counted against the rate limit.
    pub workers: usize,

    /// Transient-error retries per completion call. Default: 2 (3 attempts).
    pub max_retries: u32,

    /// Backoff before the first retry in milliseconds; doubles per retry.
    /// Default: 1000 (1 s then 2 s).
    pub retry_backoff_ms: u64,

    /// Pre-constructed completion client. Takes precedence over the HTTP
    /// settings above.
    pub client: Option<Arc<dyn CompletionClient>>,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout_secs: 120,
            max_output_tokens: None,
            max_chars: 200_000,
            reparse: false,
            force_summary: false,
            extractor: ExtractorStrategy::default(),
            dry_run: false,
            output_dir: PathBuf::from("output_summaries"),
            references_dir: PathBuf::from("skill_data/references"),
            workers: 3,
            max_retries: 2,
            retry_backoff_ms: 1000,
            client: None,
        }
    }
}

impl fmt::Debug for SummarizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizerConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_chars", &self.max_chars)
            .field("reparse", &self.reparse)
            .field("force_summary", &self.force_summary)
            .field("extractor", &self.extractor)
            .field("dry_run", &self.dry_run)
            .field("output_dir", &self.output_dir)
            .field("references_dir", &self.references_dir)
            .field("workers", &self.workers)
            .field("max_retries", &self.max_retries)
            .field("client", &self.client.as_ref().map(|_| "<dyn CompletionClient>"))
            .finish()
    }
}

impl SummarizerConfig {
    /// Create a new builder for `SummarizerConfig`.
    pub fn builder() -> SummarizerConfigBuilder {
        SummarizerConfigBuilder {
            config: Self::default(),
        }
    }

    /// API key actually sent: configured value, else `LLM_API_KEY`, else the
    /// local-server placeholder.
    pub fn resolved_api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
            .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string())
    }
}

/// Builder for [`SummarizerConfig`].
#[derive(Debug)]
pub struct SummarizerConfigBuilder {
    config: SummarizerConfig,
}

impl SummarizerConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_output_tokens(mut self, n: Option<u32>) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn max_chars(mut self, n: usize) -> Self {
        self.config.max_chars = n;
        self
    }

    pub fn reparse(mut self, v: bool) -> Self {
        self.config.reparse = v;
        self
    }

    pub fn force_summary(mut self, v: bool) -> Self {
        self.config.force_summary = v;
        self
    }

    pub fn extractor(mut self, strategy: ExtractorStrategy) -> Self {
        self.config.extractor = strategy;
        self
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.config.dry_run = v;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn references_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.references_dir = dir.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SummarizerConfig, SummarizeError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(SummarizeError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.max_chars == 0 {
            return Err(SummarizeError::InvalidConfig("max_chars must be ≥ 1".into()));
        }
        if c.timeout_secs == 0 {
            return Err(SummarizeError::InvalidConfig(
                "timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.client.is_none()
            && !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://"))
        {
            return Err(SummarizeError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which extraction engine(s) the text extractor may use.
///
/// | Strategy | Behaviour |
/// |----------|-----------|
/// | `auto` | pdfium first, pdf-extract if pdfium fails (default) |
/// | `pdfium` | pdfium only, failures surface directly |
/// | `pdf-extract` | pdf-extract only, failures surface directly |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractorStrategy {
    #[default]
    Auto,
    Pdfium,
    PdfExtract,
}

impl ExtractorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorStrategy::Auto => "auto",
            ExtractorStrategy::Pdfium => "pdfium",
            ExtractorStrategy::PdfExtract => "pdf-extract",
        }
    }
}

impl fmt::Display for ExtractorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ExtractorStrategy::Auto),
            "pdfium" | "primary" => Ok(ExtractorStrategy::Pdfium),
            "pdf-extract" | "pdf_extract" | "fallback" => Ok(ExtractorStrategy::PdfExtract),
            other => Err(format!(
                "unknown extractor '{other}' (expected auto, pdfium or pdf-extract)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    /// Sets or clears `LLM_API_KEY` and puts the previous value back on drop.
    struct ApiKeyEnv(Option<String>);

    impl ApiKeyEnv {
        fn set(value: Option<&str>) -> Self {
            let previous = std::env::var(API_KEY_ENV).ok();
            match value {
                Some(v) => std::env::set_var(API_KEY_ENV, v),
                None => std::env::remove_var(API_KEY_ENV),
            }
            Self(previous)
        }
    }

    impl Drop for ApiKeyEnv {
        fn drop(&mut self) {
            match &self.0 {
                Some(v) => std::env::set_var(API_KEY_ENV, v),
                None => std::env::remove_var(API_KEY_ENV),
            }
        }
    }

    #[test]
    #[serial]
    fn api_key_prefers_config_then_env_then_placeholder() {
        let _env = ApiKeyEnv::set(Some("sk-from-env"));
        let explicit = SummarizerConfig::builder().api_key("sk-explicit").build().unwrap();
        assert_eq!(explicit.resolved_api_key(), "sk-explicit");

        let from_env = SummarizerConfig::default();
        assert_eq!(from_env.resolved_api_key(), "sk-from-env");

        let blank = SummarizerConfig::builder().api_key("").build().unwrap();
        assert_eq!(blank.resolved_api_key(), "sk-from-env");
    }

    #[test]
    #[serial]
    fn api_key_falls_back_to_placeholder_without_env() {
        let _env = ApiKeyEnv::set(None);
        assert_eq!(
            SummarizerConfig::default().resolved_api_key(),
            PLACEHOLDER_API_KEY
        );
    }


    #[test]
    fn defaults_match_documented_values() {
        let c = SummarizerConfig::default();
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.timeout_secs, 120);
        assert_eq!(c.max_chars, 200_000);
        assert_eq!(c.workers, 3);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.retry_backoff_ms, 1000);
        assert!(c.max_output_tokens.is_none());
        assert_eq!(c.extractor, ExtractorStrategy::Auto);
    }

    #[test]
    fn build_rejects_zero_workers() {
        let err = SummarizerConfig::builder().workers(0).build().unwrap_err();
        assert!(err.to_string().contains("workers"));
    }

    #[test]
    fn build_rejects_non_http_base_url() {
        let err = SummarizerConfig::builder()
            .base_url("openrouter.ai/api/v1")
            .build()
            .unwrap_err();
        assert!(matches!(err, SummarizeError::InvalidConfig(_)));
    }

    #[test]
    fn explicit_api_key_wins() {
        let c = SummarizerConfig::builder().api_key("sk-test").build().unwrap();
        assert_eq!(c.resolved_api_key(), "sk-test");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = SummarizerConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn extractor_strategy_parses_cli_spellings() {
        assert_eq!("auto".parse::<ExtractorStrategy>(), Ok(ExtractorStrategy::Auto));
        assert_eq!("PDFium".parse::<ExtractorStrategy>(), Ok(ExtractorStrategy::Pdfium));
        assert_eq!(
            "pdf_extract".parse::<ExtractorStrategy>(),
            Ok(ExtractorStrategy::PdfExtract)
        );
        assert!("marker".parse::<ExtractorStrategy>().is_err());
        assert_eq!(ExtractorStrategy::PdfExtract.to_string(), "pdf-extract");
    }
}
