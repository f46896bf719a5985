//! Error types for the edgequake-papersum library.
//!
//! Each pipeline stage owns one error type so a caller can tell *where* a
//! paper fell over without parsing strings:
//!
//! * [`ExtractError`]: no text could be pulled out of the PDF.
//! * [`BackendError`]: one raw completion call failed (HTTP status,
//!   timeout, transport). Classified by the retry policy.
//! * [`CompletionError`]: the completion step gave up: a non-transient
//!   backend error, or the transient-retry budget ran out.
//! * [`DecodeError`]: the model reply held no parseable JSON object, even
//!   after the one syntax-repair round.
//! * [`ValidationError`]: the decoded object broke the summary schema after
//!   every schema-repair round.
//!
//! [`SummarizeError`] is the union of those kinds. [`PipelineFailure`] is the
//! single error a caller sees for one document: it tags the cause with the PDF
//! path. `SummarizeError` has no variant that can hold a `PipelineFailure`, so
//! a cause is wrapped exactly once.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ── Extraction ───────────────────────────────────────────────────────────

/// Text extraction failed for a document.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The PDF does not exist or cannot be opened.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// A specific engine raised while reading the document.
    #[error("{engine} failed to parse '{path}': {detail}")]
    EngineFailed {
        engine: &'static str,
        path: PathBuf,
        detail: String,
    },

    /// The engine ran but produced nothing but whitespace.
    #[error("{engine} extracted empty text from '{path}'")]
    EmptyText { engine: &'static str, path: PathBuf },

    /// `auto` strategy: the primary engine failed, then the fallback did too.
    ///
    /// The primary failure is the error source; the fallback is kept for the
    /// message.
    #[error("Failed to parse '{path}': primary and fallback extraction failed (fallback: {fallback})")]
    AllEnginesFailed {
        path: PathBuf,
        #[source]
        primary: Box<ExtractError>,
        fallback: Box<ExtractError>,
    },

    /// Reading or writing the `.md` sidecar cache failed.
    #[error("Extraction cache I/O failed for '{path}': {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    TaskFailed(String),
}

// ── Completion ───────────────────────────────────────────────────────────

/// A single completion call failed.
///
/// The `Status` message deliberately reads `Error code: NNN` so the same
/// status sniffing works for errors that only survive as strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with a non-success HTTP status.
    #[error("Error code: {status} - {body}")]
    Status { status: u16, body: String },

    /// The per-call timeout elapsed.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or protocol failure (may embed a status in text).
    #[error("{0}")]
    Transport(String),

    /// The backend answered 2xx but the body had no usable message content.
    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
}

/// The completion step failed for good.
#[derive(Debug, Error)]
#[error("LLM call failed after {attempts} attempt(s): {source}")]
pub struct CompletionError {
    /// Number of backend calls made, including the failing one.
    pub attempts: u32,
    #[source]
    pub source: BackendError,
}

// ── Decode ───────────────────────────────────────────────────────────────

/// The model reply could not be turned into a JSON object.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No `{` … `}` span exists in the reply.
    #[error("No JSON object found in LLM response: {preview:?}")]
    NoJsonObject { preview: String },

    /// The brace span is not valid JSON (or not an object).
    #[error("Failed to parse LLM response as JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

// ── Validation ───────────────────────────────────────────────────────────

/// One schema violation, addressed by a dotted path such as
/// `part1.primary.results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The decoded payload does not satisfy the summary schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// Compact `path: message` lines, in discovery order.
    pub fn compact(&self) -> Vec<String> {
        self.violations.iter().map(Violation::to_string).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} schema violation(s): {}",
            self.violations.len(),
            self.compact().join("; ")
        )
    }
}

impl std::error::Error for ValidationError {}

// ── Pipeline ─────────────────────────────────────────────────────────────

/// Any failure while summarising one document.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The reference-material directory is missing.
    #[error("References directory not found: '{path}'")]
    ReferencesNotFound { path: PathBuf },

    /// Reading or writing a file outside the extraction cache failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder or client construction rejected the configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The externally visible failure for one document.
#[derive(Debug, Error)]
#[error("Pipeline failed for {}: {cause}", .path.display())]
pub struct PipelineFailure {
    pub path: PathBuf,
    #[source]
    pub cause: SummarizeError,
}

impl PipelineFailure {
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<SummarizeError>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}
