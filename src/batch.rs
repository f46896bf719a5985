//! Directory batch runs: discovery, skip index, output paths, worker pool.
//!
//! Two independent skips keep reruns cheap:
//!
//! * extraction: the `.md` sidecar next to each PDF (see
//!   [`crate::pipeline::extract`]);
//! * summarisation: `output_dir/processed.txt`, one absolute PDF path per
//!   line, updated only after a summary was written.
//!
//! Summaries land in `output_dir/<primary|survey|commentary|non_research>/`
//! as `<citation_key>_summary.md`; an existing file is never overwritten, a
//! `_v2`, `_v3`, … suffix is added instead.
//!
//! ## Concurrency
//!
//! Papers are independent, so up to `workers` of them run through the full
//! pipeline at once (`buffer_unordered`). Results are consumed on a single
//! task in completion order, which keeps the index and the versioned paths
//! free of races without any extra locking.

use crate::config::SummarizerConfig;
use crate::error::{PipelineFailure, SummarizeError};
use crate::progress::ProgressCallback;
use crate::render::render_summary;
use crate::schema::PaperSummary;
use crate::summarize::PaperPipeline;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// File name of the processed index inside the output directory.
pub const PROCESSED_INDEX_FILE: &str = "processed.txt";

/// All `*.pdf` files under `source_dir`, recursively, sorted.
pub fn find_pdfs(source_dir: &Path) -> Result<Vec<PathBuf>, SummarizeError> {
    let pattern = format!(
        "{}/**/*.pdf",
        glob::Pattern::escape(&source_dir.to_string_lossy())
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| SummarizeError::InvalidConfig(format!("bad source directory pattern: {e}")))?;

    let mut pdfs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SummarizeError::Io {
            path: e.path().to_path_buf(),
            source: e.into_error(),
        })?;
        if path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// Identity of a PDF in the index: its absolute, symlink-resolved path.
fn index_key(pdf: &Path) -> String {
    std::fs::canonicalize(pdf)
        .or_else(|_| std::path::absolute(pdf))
        .unwrap_or_else(|_| pdf.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Set of PDFs that already have a written summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessedIndex {
    entries: BTreeSet<String>,
}

impl ProcessedIndex {
    /// Read `output_dir/processed.txt`; a missing file is an empty index.
    pub fn load(output_dir: &Path) -> Result<Self, SummarizeError> {
        let path = output_dir.join(PROCESSED_INDEX_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(SummarizeError::Io { path, source }),
        };
        Ok(Self {
            entries: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        })
    }

    /// Rewrite the whole index, sorted, via a temp file and rename.
    pub fn save(&self, output_dir: &Path) -> Result<(), SummarizeError> {
        let io_err = |path: &Path, source| SummarizeError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(output_dir).map_err(|e| io_err(output_dir, e))?;

        let path = output_dir.join(PROCESSED_INDEX_FILE);
        let mut body = self.entries.iter().cloned().collect::<Vec<_>>().join("\n");
        body.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(output_dir).map_err(|e| io_err(&path, e))?;
        tmp.write_all(body.as_bytes()).map_err(|e| io_err(&path, e))?;
        tmp.persist(&path).map_err(|e| io_err(&path, e.error))?;
        Ok(())
    }

    pub fn contains(&self, pdf: &Path) -> bool {
        self.entries.contains(&index_key(pdf))
    }

    pub fn insert(&mut self, pdf: &Path) -> bool {
        self.entries.insert(index_key(pdf))
    }

    pub fn remove(&mut self, pdf: &Path) -> bool {
        self.entries.remove(&index_key(pdf))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Skip `pdf` when it is indexed, unless `force_summary` is set.
pub fn should_skip(pdf: &Path, index: &ProcessedIndex, force_summary: bool) -> bool {
    !force_summary && index.contains(pdf)
}

/// `output_dir/<category_dir>/<citation_key>_summary.md`, creating the
/// category directory.
pub fn output_path(
    output_dir: &Path,
    category_dir: &str,
    citation_key: &str,
) -> Result<PathBuf, SummarizeError> {
    let dir = output_dir.join(category_dir);
    std::fs::create_dir_all(&dir).map_err(|source| SummarizeError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir.join(format!("{citation_key}_summary.md")))
}

/// `path` itself when free, else the first free `<stem>_vN<ext>` for N ≥ 2.
pub fn versioned_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (2u32..)
        .map(|v| path.with_file_name(format!("{stem}_v{v}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Render `summary` and write it to a fresh versioned path.
pub async fn write_summary(
    output_dir: &Path,
    summary: &PaperSummary,
) -> Result<PathBuf, SummarizeError> {
    let base = output_path(output_dir, summary.category_dir(), summary.citation_key())?;
    let path = versioned_path(&base);
    tokio::fs::write(&path, render_summary(summary))
        .await
        .map_err(|source| SummarizeError::Io {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// One paper that could not be summarised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPaper {
    pub pdf_path: PathBuf,
    pub error: String,
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_papers: Vec<FailedPaper>,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failed_papers.is_empty()
    }
}

/// Result of [`summarize_single`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleOutcome {
    /// Already in the processed index and not forced.
    Skipped,
    /// Summary written to this path.
    Written(PathBuf),
}

/// Summarise every PDF under `source_dir`.
///
/// The pipeline (and with it the references directory) is set up before any
/// document is touched, so a configuration error aborts the whole run.
pub async fn run_batch(
    source_dir: &Path,
    config: &SummarizerConfig,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, SummarizeError> {
    let pipeline = if config.dry_run {
        None
    } else {
        Some(PaperPipeline::from_config(config)?)
    };
    run_batch_with(source_dir, config, pipeline.as_ref(), progress).await
}

/// [`run_batch`] with an explicit pipeline. `pipeline` may be `None` only
/// in dry-run mode.
pub async fn run_batch_with(
    source_dir: &Path,
    config: &SummarizerConfig,
    pipeline: Option<&PaperPipeline>,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, SummarizeError> {
    let pdfs = find_pdfs(source_dir)?;
    let mut index = ProcessedIndex::load(&config.output_dir)?;
    info!("Discovered PDFs: {}", pdfs.len());
    info!("Processed-index entries loaded: {}", index.len());
    if config.force_summary {
        info!("force-summary enabled: processed index ignored for skip filtering");
    }

    let mut report = BatchReport::default();
    let mut jobs = Vec::new();
    for pdf in pdfs {
        if should_skip(&pdf, &index, config.force_summary) {
            report.skipped += 1;
            continue;
        }
        // Forced papers leave the index until they succeed again.
        index.remove(&pdf);
        jobs.push(pdf);
    }
    info!("Selected for processing: {}", jobs.len());
    info!("Skipped by processed index: {}", report.skipped);

    let pipeline = match pipeline {
        Some(p) if !config.dry_run => p,
        _ => {
            for pdf in &jobs {
                info!("[dry run] would process {}", pdf.display());
            }
            info!("Dry run mode: {} file(s) would be processed", jobs.len());
            report.skipped += jobs.len();
            return Ok(report);
        }
    };

    let total = jobs.len();
    if let Some(cb) = &progress {
        cb.on_batch_start(total);
    }

    let mut results = stream::iter(jobs.into_iter().enumerate())
        .map(|(i, pdf)| {
            let progress = progress.clone();
            async move {
                let index = i + 1;
                if let Some(cb) = &progress {
                    cb.on_document_start(index, total, &pdf);
                }
                info!("Processing [{index}/{total}]: {}", pdf.display());
                let result = pipeline.summarize(&pdf).await;
                (index, pdf, result)
            }
        })
        .buffer_unordered(config.workers.max(1));

    while let Some((i, pdf, result)) = results.next().await {
        match finish_document(&config.output_dir, &mut index, &pdf, result).await {
            Ok(path) => {
                info!("[{i}/{total}] Written: {}", path.display());
                report.processed += 1;
                if let Some(cb) = &progress {
                    cb.on_document_complete(i, total, &pdf, &path);
                }
            }
            Err(failure) => {
                let message = failure.to_string();
                error!("[{i}/{total}] Failed: {message}");
                report.failed += 1;
                if let Some(cb) = &progress {
                    cb.on_document_error(i, total, &pdf, &message);
                }
                report.failed_papers.push(FailedPaper {
                    pdf_path: pdf,
                    error: message,
                });
            }
        }
    }

    if let Some(cb) = &progress {
        cb.on_batch_complete(total, report.processed);
    }
    Ok(report)
}

/// Write the summary and mark the paper done. The index is only touched
/// after the markdown is on disk.
async fn finish_document(
    output_dir: &Path,
    index: &mut ProcessedIndex,
    pdf: &Path,
    result: Result<PaperSummary, PipelineFailure>,
) -> Result<PathBuf, PipelineFailure> {
    let summary = result?;
    let written = write_summary(output_dir, &summary)
        .await
        .map_err(|cause| PipelineFailure::new(pdf, cause))?;
    index.insert(pdf);
    index
        .save(output_dir)
        .map_err(|cause| PipelineFailure::new(pdf, cause))?;
    Ok(written)
}

/// Single-file mode: skip if indexed (unless forced), else summarise, write
/// and index.
pub async fn summarize_single(
    pdf: &Path,
    config: &SummarizerConfig,
    pipeline: &PaperPipeline,
) -> Result<SingleOutcome, PipelineFailure> {
    let mut index =
        ProcessedIndex::load(&config.output_dir).map_err(|cause| PipelineFailure::new(pdf, cause))?;
    if should_skip(pdf, &index, config.force_summary) {
        info!(
            "Already processed: {} (use --force-summary to reprocess)",
            pdf.display()
        );
        return Ok(SingleOutcome::Skipped);
    }
    index.remove(pdf);

    let result = pipeline.summarize(pdf).await;
    let path = finish_document(&config.output_dir, &mut index, pdf, result).await?;
    info!("Written: {}", path.display());
    Ok(SingleOutcome::Written(path))
}
