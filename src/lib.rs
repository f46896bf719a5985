//! # edgequake-papersum
//!
//! Summarise research-paper PDFs into structured, schema-validated Markdown
//! with a single call to an OpenAI-compatible LLM endpoint.
//!
//! ## Why this crate?
//!
//! A literature review over a few hundred PDFs needs summaries that all share
//! one shape: the same metadata, the same sections per paper type, the same
//! extraction fields. Free-form LLM output drifts. This crate asks for one
//! JSON document per paper, validates it against a strict schema, repairs it
//! with targeted follow-up prompts when it is off, and only then renders
//! Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    pdfium (pdf-extract fallback), cached next to the PDF as .md
//!  ├─ 2. Prompt     paper text + reference pack + output contract
//!  ├─ 3. Complete   chat completion with exponential backoff on 429 / 5xx
//!  ├─ 4. Decode     first `{` .. last `}`; one JSON-repair call on failure
//!  ├─ 5. Validate   normalise year / citation key, check schema; ≤ 2 repair calls
//!  └─ 6. Render     Markdown under output_dir/<category>/<key>_summary.md
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_papersum::{render_summary, summarize_pdf, SummarizerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // OpenRouter by default; LLM_API_KEY is picked up if set.
//!     let config = SummarizerConfig::builder()
//!         .references_dir("skill_data/references")
//!         .build()?;
//!     let summary = summarize_pdf("papers/doe2024.pdf", &config).await?;
//!     println!("{}", render_summary(&summary));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `papersum` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-papersum = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod schema;
pub mod summarize;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{
    find_pdfs, output_path, run_batch, run_batch_with, should_skip, summarize_single,
    versioned_path, write_summary, BatchReport, FailedPaper, ProcessedIndex, SingleOutcome,
};
pub use config::{ExtractorStrategy, SummarizerConfig, SummarizerConfigBuilder};
pub use error::{
    BackendError, CompletionError, DecodeError, ExtractError, PipelineFailure, SummarizeError,
    ValidationError, Violation,
};
pub use pipeline::extract::{TextEngine, TextExtractor};
pub use pipeline::llm::{CompletionClient, OpenAiCompatibleClient, RetryPolicy};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use render::render_summary;
pub use schema::{
    validate_payload, CommentarySummary, Metadata, NonResearchNote, PaperSummary, PaperType,
    PrimarySummary, SnnExtraction, SummaryPart1, SurveySummary,
};
pub use summarize::{summarize_pdf, PaperPipeline, PipelineOutcome};
