//! PDF text extraction with a sidecar cache and engine fallback.
//!
//! ## Engines
//!
//! * [`PdfiumEngine`]: primary. Page text via `pdfium-render`, pages joined
//!   with blank lines. pdfium keeps global state and is not re-entrant, so
//!   every call goes through one process-wide gate.
//! * [`PdfExtractEngine`]: fallback. Pure Rust, no native library, weaker
//!   on multi-column layouts. Fails on empty output.
//!
//! ## Cache
//!
//! `paper.pdf` caches to `paper.md` next to it. A zero-byte sidecar counts as
//! a miss. Fresh text is written (atomically, untruncated) only after a
//! successful extraction, so a failure never clobbers a good cache.
//!
//! ## Why spawn_blocking?
//!
//! Both engines are synchronous and CPU-bound. [`TextExtractor::extract`] moves
//! the work to Tokio's blocking pool so one slow PDF does not stall the
//! workers still waiting on the completion backend.

use crate::config::ExtractorStrategy;
use crate::error::ExtractError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Environment variable naming an existing pdfium shared library.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Held for exactly one primary-engine call.
static PRIMARY_GATE: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// One way of turning a PDF into text.
pub trait TextEngine: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Extract the full text of `path`.
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Primary engine backed by pdfium.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumEngine;

impl PdfiumEngine {
    fn bind() -> Result<Pdfium, PdfiumError> {
        let bindings = match std::env::var_os(PDFIUM_LIB_ENV) {
            Some(lib) => Pdfium::bind_to_library(PathBuf::from(lib))?,
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }
}

impl TextEngine for PdfiumEngine {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let fail = |e: PdfiumError| ExtractError::EngineFailed {
            engine: self.name(),
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        };

        let pdfium = Self::bind().map_err(fail)?;
        let document = pdfium.load_pdf_from_file(path, None).map_err(fail)?;

        let mut pages = Vec::new();
        for page in document.pages().iter() {
            pages.push(page.text().map_err(fail)?.all());
        }
        debug!("pdfium read {} page(s) from {}", pages.len(), path.display());

        let text = pages.join("\n\n");
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyText {
                engine: self.name(),
                path: path.to_path_buf(),
            });
        }
        Ok(text)
    }
}

/// Fallback engine backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractEngine;

impl TextEngine for PdfExtractEngine {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let text = pdf_extract::extract_text(path).map_err(|e| ExtractError::EngineFailed {
            engine: self.name(),
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ExtractError::EmptyText {
                engine: self.name(),
                path: path.to_path_buf(),
            });
        }
        Ok(text.to_string())
    }
}

/// Sidecar cache location: same directory and stem, `.md` extension.
pub fn cache_path(pdf: &Path) -> PathBuf {
    pdf.with_extension("md")
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Cached, fallback-aware text extraction.
#[derive(Clone)]
pub struct TextExtractor {
    primary: Arc<dyn TextEngine>,
    fallback: Arc<dyn TextEngine>,
    strategy: ExtractorStrategy,
}

impl TextExtractor {
    /// pdfium primary, pdf-extract fallback.
    pub fn new(strategy: ExtractorStrategy) -> Self {
        Self::with_engines(Arc::new(PdfiumEngine), Arc::new(PdfExtractEngine), strategy)
    }

    pub fn with_engines(
        primary: Arc<dyn TextEngine>,
        fallback: Arc<dyn TextEngine>,
        strategy: ExtractorStrategy,
    ) -> Self {
        Self {
            primary,
            fallback,
            strategy,
        }
    }

    pub fn strategy(&self) -> ExtractorStrategy {
        self.strategy
    }

    /// Extract text for `pdf`, truncated to `max_chars`, on the blocking pool.
    pub async fn extract(
        &self,
        pdf: &Path,
        max_chars: usize,
        reparse: bool,
    ) -> Result<String, ExtractError> {
        let this = self.clone();
        let pdf = pdf.to_path_buf();
        tokio::task::spawn_blocking(move || this.extract_blocking(&pdf, max_chars, reparse))
            .await
            .map_err(|e| ExtractError::TaskFailed(e.to_string()))?
    }

    /// Blocking implementation of [`TextExtractor::extract`].
    pub fn extract_blocking(
        &self,
        pdf: &Path,
        max_chars: usize,
        reparse: bool,
    ) -> Result<String, ExtractError> {
        let sidecar = cache_path(pdf);

        if !reparse {
            if let Some(cached) = read_cache(&sidecar)? {
                info!(
                    "Extraction cache hit: {} ({} chars)",
                    sidecar.display(),
                    cached.chars().count()
                );
                return Ok(truncate_chars(&cached, max_chars).to_string());
            }
        }

        if !pdf.is_file() {
            return Err(ExtractError::FileNotFound {
                path: pdf.to_path_buf(),
            });
        }

        info!("Running {} extraction on {}", self.strategy, pdf.display());
        let text = self.run_engines(pdf)?;
        write_cache(&sidecar, &text)?;
        info!("Extraction complete: {} chars", text.chars().count());

        Ok(truncate_chars(&text, max_chars).to_string())
    }

    fn run_engines(&self, pdf: &Path) -> Result<String, ExtractError> {
        match self.strategy {
            ExtractorStrategy::Pdfium => self.run_primary(pdf),
            ExtractorStrategy::PdfExtract => self.fallback.extract_text(pdf),
            ExtractorStrategy::Auto => {
                let primary_err = match self.run_primary(pdf) {
                    Ok(text) => return Ok(text),
                    Err(e) => e,
                };
                warn!(
                    "{} failed for {}; attempting {} fallback: {primary_err}",
                    self.primary.name(),
                    pdf.display(),
                    self.fallback.name()
                );
                match self.fallback.extract_text(pdf) {
                    Ok(text) => {
                        warn!(
                            "Using {} fallback text for {} ({} chars)",
                            self.fallback.name(),
                            pdf.display(),
                            text.chars().count()
                        );
                        Ok(text)
                    }
                    Err(fallback_err) => Err(ExtractError::AllEnginesFailed {
                        path: pdf.to_path_buf(),
                        primary: Box::new(primary_err),
                        fallback: Box::new(fallback_err),
                    }),
                }
            }
        }
    }

    fn run_primary(&self, pdf: &Path) -> Result<String, ExtractError> {
        // A panic inside a previous holder leaves `()` intact; keep going.
        let _guard = PRIMARY_GATE
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.primary.extract_text(pdf)
    }
}

/// `Ok(None)` when the sidecar is missing or empty.
fn read_cache(sidecar: &Path) -> Result<Option<String>, ExtractError> {
    let cache_err = |source| ExtractError::Cache {
        path: sidecar.to_path_buf(),
        source,
    };
    match std::fs::metadata(sidecar) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {
            std::fs::read_to_string(sidecar).map(Some).map_err(cache_err)
        }
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(cache_err(e)),
    }
}

fn write_cache(sidecar: &Path, text: &str) -> Result<(), ExtractError> {
    let cache_err = |source| ExtractError::Cache {
        path: sidecar.to_path_buf(),
        source,
    };
    let dir = sidecar
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(cache_err)?;
    tmp.write_all(text.as_bytes()).map_err(cache_err)?;
    tmp.persist(sidecar).map_err(|e| cache_err(e.error))?;
    Ok(())
}
