//! One paper, end to end.
//!
//! ```text
//! extract ──▶ prompt ──▶ complete (+retry) ──▶ decode (+1 repair) ──▶ normalise+validate (+2 repairs)
//! ```
//!
//! Stages run strictly in order. Whatever fails is converted into a
//! [`PipelineFailure`] exactly once, here, tagged with the document path; no
//! partial result ever leaves this module.

use crate::config::SummarizerConfig;
use crate::error::{PipelineFailure, SummarizeError};
use crate::pipeline::decode::complete_and_decode;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::llm::{CompletionClient, OpenAiCompatibleClient, RetryPolicy};
use crate::pipeline::validate::{validate_with_repair, RepairContext};
use crate::prompts::{build_combined_prompt, load_references};
use crate::schema::PaperSummary;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Terminal state of one document: a validated summary or a failure record.
#[derive(Debug)]
pub enum PipelineOutcome {
    Success(PaperSummary),
    Failure { path: PathBuf, cause: String },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }
}

impl From<Result<PaperSummary, PipelineFailure>> for PipelineOutcome {
    fn from(result: Result<PaperSummary, PipelineFailure>) -> Self {
        match result {
            Ok(summary) => PipelineOutcome::Success(summary),
            Err(failure) => PipelineOutcome::Failure {
                path: failure.path,
                cause: failure.cause.to_string(),
            },
        }
    }
}

/// Shared, reusable per-paper pipeline.
///
/// Build it once per run; the references and the HTTP client are reused for
/// every document. `PaperPipeline` is `Send + Sync`, so batch workers share it
/// through an `Arc`.
pub struct PaperPipeline {
    client: Arc<dyn CompletionClient>,
    extractor: TextExtractor,
    references: String,
    policy: RetryPolicy,
    max_chars: usize,
    reparse: bool,
}

impl PaperPipeline {
    /// Load the references and build the backend client from `config`.
    ///
    /// Fails before any document is touched if the references directory is
    /// missing.
    pub fn from_config(config: &SummarizerConfig) -> Result<Self, SummarizeError> {
        let references = load_references(&config.references_dir)?;
        let client: Arc<dyn CompletionClient> = match &config.client {
            Some(client) => Arc::clone(client),
            None => Arc::new(OpenAiCompatibleClient::from_config(config)?),
        };
        Ok(Self::with_parts(
            config,
            client,
            TextExtractor::new(config.extractor),
            references,
        ))
    }

    /// Assemble a pipeline from explicit collaborators.
    pub fn with_parts(
        config: &SummarizerConfig,
        client: Arc<dyn CompletionClient>,
        extractor: TextExtractor,
        references: impl Into<String>,
    ) -> Self {
        Self {
            client,
            extractor,
            references: references.into(),
            policy: RetryPolicy::from_config(config),
            max_chars: config.max_chars,
            reparse: config.reparse,
        }
    }

    /// Summarise one PDF.
    pub async fn summarize(&self, pdf: &Path) -> Result<PaperSummary, PipelineFailure> {
        let path = std::path::absolute(pdf).unwrap_or_else(|_| pdf.to_path_buf());
        let start = Instant::now();
        match self.run(&path).await {
            Ok(summary) => {
                info!(
                    "Summarised {} as {} ({}) in {:.1}s",
                    path.display(),
                    summary.citation_key(),
                    summary.category_dir(),
                    start.elapsed().as_secs_f64()
                );
                Ok(summary)
            }
            Err(cause) => {
                error!("Pipeline failed for {}: {cause}", path.display());
                Err(PipelineFailure::new(path, cause))
            }
        }
    }

    /// [`PaperPipeline::summarize`] as a [`PipelineOutcome`].
    pub async fn summarize_outcome(&self, pdf: &Path) -> PipelineOutcome {
        self.summarize(pdf).await.into()
    }

    async fn run(&self, pdf: &Path) -> Result<PaperSummary, SummarizeError> {
        let paper_text = self.extractor.extract(pdf, self.max_chars, self.reparse).await?;

        let file_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prompt = build_combined_prompt(&paper_text, &self.references, &file_name);
        info!(
            "Built prompt ({} chars, ~{} tokens)",
            prompt.len(),
            prompt.len() / 4
        );

        let payload = complete_and_decode(self.client.as_ref(), &prompt, &self.policy).await?;

        let ctx = RepairContext {
            client: self.client.as_ref(),
            policy: &self.policy,
            original_prompt: &prompt,
            pdf_path: pdf,
        };
        validate_with_repair(payload, &ctx).await
    }
}

/// Summarise a single PDF with a pipeline built from `config`.
///
/// This is the primary entry point for the library.
///
/// # Example
/// ```rust,no_run
/// use edgequake_papersum::{summarize_pdf, SummarizerConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = SummarizerConfig::default();
///     let summary = summarize_pdf("papers/doe2024.pdf", &config).await?;
///     println!("{}", edgequake_papersum::render_summary(&summary));
///     Ok(())
/// }
/// ```
pub async fn summarize_pdf(
    pdf: impl AsRef<Path>,
    config: &SummarizerConfig,
) -> Result<PaperSummary, PipelineFailure> {
    let pdf = pdf.as_ref();
    let pipeline =
        PaperPipeline::from_config(config).map_err(|cause| PipelineFailure::new(pdf, cause))?;
    pipeline.summarize(pdf).await
}
