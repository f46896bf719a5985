//! Progress-callback trait for per-document batch events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to [`crate::batch::run_batch`]
//! to receive events as each paper moves through the pipeline. The library
//! never draws anything itself; the `papersum` binary forwards these events to
//! an `indicatif` bar, and tests count them.
//!
//! # Example
//!
//! ```rust
//! use edgequake_papersum::BatchProgressCallback;
//! use std::path::Path;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_error(&self, _index: usize, _total: usize, pdf: &Path, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} failed: {error}", pdf.display());
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the batch runner as it processes each document.
///
/// Implementations must be `Send + Sync`: documents run concurrently, so
/// `on_document_start`, `on_document_complete` and `on_document_error` may
/// fire from different tasks at once. Every method defaults to a no-op.
///
/// `index` is the 1-based position of the document among those selected for
/// processing; completions arrive in whatever order the documents finish.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after filtering, with the number of documents to process.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a worker picks up a document.
    fn on_document_start(&self, index: usize, total: usize, pdf: &Path) {
        let _ = (index, total, pdf);
    }

    /// Called after the summary for `pdf` was written to `output`.
    fn on_document_complete(&self, index: usize, total: usize, pdf: &Path, output: &Path) {
        let _ = (index, total, pdf, output);
    }

    /// Called when a document fails; the batch continues.
    fn on_document_error(&self, index: usize, total: usize, pdf: &Path, error: &str) {
        let _ = (index, total, pdf, error);
    }

    /// Called once after every selected document was attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Shared handle type accepted by the batch runner.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
