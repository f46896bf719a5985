//! Per-paper pipeline stages.
//!
//! Each submodule implements one step and is testable on its own; the
//! orchestration lives in [`crate::summarize`].
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ llm ──▶ decode ──▶ normalize ──▶ validate
//! (pdfium/    (chat   (JSON +    (year, key)   (schema +
//!  pdf-extract) call)  1 repair)                2 repairs)
//! ```
//!
//! 1. [`extract`]:    PDF text with a `.md` sidecar cache; runs in
//!    `spawn_blocking` because both engines are synchronous
//! 2. [`llm`]:        OpenAI-compatible completion client with retry/backoff;
//!    the only stage with network I/O
//! 3. [`decode`]:     pull one JSON object out of a free-form reply, asking
//!    the model once to repair broken JSON
//! 4. [`normalize`]:  deterministic fixes for `metadata.year` and
//!    `metadata.citation_key`
//! 5. [`validate`]:   schema check, feeding violations back to the model at
//!    most twice

pub mod decode;
pub mod extract;
pub mod llm;
pub mod normalize;
pub mod validate;
