//! Shared fixtures for the integration tests: a scripted completion client,
//! fake extraction engines and payload builders.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_papersum::schema::PART2_FIELDS;
use edgequake_papersum::{
    BackendError, CompletionClient, ExtractError, ExtractorStrategy, PaperPipeline,
    SummarizerConfig, TextEngine, TextExtractor,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Completion clients ───────────────────────────────────────────────────────

/// Replies from a fixed script, in order; records every prompt it sees.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = Result<String, BackendError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(texts: impl IntoIterator<Item = String>) -> Arc<Self> {
        Self::new(texts.into_iter().map(Ok))
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("script exhausted".into())))
    }
}

/// Picks its reply by the source filename embedded in the prompt, so
/// concurrent batch workers get the answer meant for their paper.
pub struct RoutedClient {
    routes: Vec<(String, Result<String, BackendError>)>,
    calls: AtomicUsize,
}

impl RoutedClient {
    pub fn new(routes: Vec<(&str, Result<String, BackendError>)>) -> Arc<Self> {
        Arc::new(Self {
            routes: routes
                .into_iter()
                .map(|(name, reply)| (name.to_string(), reply))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for RoutedClient {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.routes
            .iter()
            .find(|(name, _)| prompt.contains(name.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Err(BackendError::Transport("no route for prompt".into())))
    }
}

// ── Extraction engines ───────────────────────────────────────────────────────

/// Returns a fixed result and counts invocations.
pub struct FakeEngine {
    name: &'static str,
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeEngine {
    pub fn ok(name: &'static str, text: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str, detail: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: Err(detail.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextEngine for FakeEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(|detail| ExtractError::EngineFailed {
            engine: self.name,
            path: path.to_path_buf(),
            detail,
        })
    }
}

/// Sleeps for `delay` inside every call and records how many calls overlap.
pub struct SlowEngine {
    name: &'static str,
    result: Result<String, String>,
    delay: std::time::Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowEngine {
    pub fn new(
        name: &'static str,
        result: Result<&str, &str>,
        delay: std::time::Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            result: result.map(str::to_string).map_err(str::to_string),
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl TextEngine for SlowEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.result.clone().map_err(|detail| ExtractError::EngineFailed {
            engine: self.name,
            path: path.to_path_buf(),
            detail,
        })
    }
}

// ── Workspace and pipeline ───────────────────────────────────────────────────

/// Write a placeholder PDF; the fake engines never read it.
pub fn touch_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").unwrap();
    path
}

/// Route library logs to the test harness; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config rooted in `dir` with a 1 ms retry base so failures stay fast.
pub fn test_config(dir: &Path) -> SummarizerConfig {
    init_tracing();
    let references = dir.join("skill_data/references");
    std::fs::create_dir_all(&references).unwrap();
    std::fs::write(references.join("01_scope.md"), "# Scope\nSNN control.").unwrap();

    SummarizerConfig::builder()
        .output_dir(dir.join("out"))
        .references_dir(references)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

pub fn pipeline_with(
    config: &SummarizerConfig,
    client: Arc<dyn CompletionClient>,
    primary: Arc<FakeEngine>,
    fallback: Arc<FakeEngine>,
    strategy: ExtractorStrategy,
) -> PaperPipeline {
    let extractor = TextExtractor::with_engines(primary, fallback, strategy);
    PaperPipeline::with_parts(config, client, extractor, "# Scope\nSNN control.")
}

// ── Payloads ─────────────────────────────────────────────────────────────────

pub fn part2() -> Value {
    Value::Object(
        PART2_FIELDS
            .iter()
            .map(|k| (k.to_string(), Value::from("not reported")))
            .collect(),
    )
}

pub fn primary_payload(key: &str) -> Value {
    json!({
        "metadata": {
            "citation_key": key,
            "title": "Spiking Networks for Quadrotor Control",
            "authors": ["Jane Doe", "Bo Li"],
            "year": 2024,
            "venue": "ICRA",
            "is_research_paper": true,
            "paper_type": "primary",
            "rejection_reason": null,
            "tags": ["snn", "control"]
        },
        "part1": {
            "paper_type": "primary",
            "tldr": "An SNN flies a quadrotor.",
            "problem_motivation": "Energy-efficient control.",
            "core_contribution": "Event-driven controller.",
            "methods": "Surrogate gradients.",
            "results": "Matches a PID baseline.",
            "key_takeaways": "SNNs are viable controllers.",
            "limitations": "Simulation only.",
            "relevance": "Direct.",
            "critical_assessment": "Solid but narrow.",
            "cite_for": ["SNN flight control"],
            "quotable_sentences": ["Spikes suffice."],
            "notable_findings": ["Low latency."]
        },
        "part2": part2()
    })
}

pub fn survey_payload(key: &str) -> Value {
    json!({
        "metadata": {
            "citation_key": key,
            "title": "A Survey of Neuromorphic Control",
            "authors": ["Ann Smith"],
            "year": 2022,
            "venue": "Frontiers",
            "is_research_paper": true,
            "paper_type": "survey",
            "rejection_reason": null,
            "tags": ["survey"]
        },
        "part1": {
            "paper_type": "survey",
            "tldr": "Overview.",
            "scope_coverage": "2015-2022.",
            "taxonomy_organization": "By task.",
            "key_claims_narrative": "SNNs are promising.",
            "gaps_identified": "Few hardware results.",
            "relevance": "Background.",
            "critical_assessment": "Broad.",
            "cite_for": ["field overview"],
            "quotable_sentences": []
        },
        "part2": null
    })
}

pub fn non_research_payload() -> Value {
    json!({
        "metadata": {
            "citation_key": "acme2021catalog",
            "title": "Product Catalog",
            "authors": [],
            "year": 2021,
            "venue": "n/a",
            "is_research_paper": false,
            "paper_type": null,
            "rejection_reason": "Vendor catalog, not a paper.",
            "tags": []
        },
        "part1": {"paper_type": "non_research", "note": "Skipped."},
        "part2": null
    })
}

/// Wrap `payload` in prose and a code fence, the way chat models answer.
pub fn chatty(payload: &Value) -> String {
    format!(
        "Sure! Here is the summary:\n```json\n{}\n```\nLet me know if you need more.",
        serde_json::to_string_pretty(payload).unwrap()
    )
}
