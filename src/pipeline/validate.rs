//! Schema validation with bounded LLM-assisted repair.
//!
//! Each attempt normalises the payload, then validates it. A failed attempt
//! that is not the last sends the violation list, the original prompt and the
//! offending JSON back to the model and starts over with whatever comes back.
//! The repair budget is fixed at two rounds (three validation attempts).

use crate::error::SummarizeError;
use crate::pipeline::decode::{complete_and_decode, Payload};
use crate::pipeline::llm::{CompletionClient, RetryPolicy};
use crate::pipeline::normalize::normalize;
use crate::prompts::schema_repair_prompt;
use crate::schema::{validate_payload, PaperSummary};
use std::path::Path;
use tracing::{info, warn};

/// Schema-repair rounds after the first validation attempt.
pub const MAX_SCHEMA_REPAIRS: u32 = 2;

/// Everything a repair round needs besides the payload itself.
pub struct RepairContext<'a> {
    pub client: &'a dyn CompletionClient,
    pub policy: &'a RetryPolicy,
    pub original_prompt: &'a str,
    pub pdf_path: &'a Path,
}

/// Validate `payload`, repairing it through the model at most
/// [`MAX_SCHEMA_REPAIRS`] times.
///
/// The last attempt's validation error is returned unchanged. A completion or
/// decode failure during a repair round ends the loop with that error.
pub async fn validate_with_repair(
    mut payload: Payload,
    ctx: &RepairContext<'_>,
) -> Result<PaperSummary, SummarizeError> {
    let attempts = MAX_SCHEMA_REPAIRS + 1;
    let mut attempt = 1;
    loop {
        normalize(&mut payload, ctx.pdf_path);
        let err = match validate_payload(&payload) {
            Ok(summary) => {
                if attempt > 1 {
                    info!("Schema repair succeeded on attempt {attempt}/{attempts}");
                }
                return Ok(summary);
            }
            Err(e) if attempt >= attempts => return Err(e.into()),
            Err(e) => e,
        };

        let compact = err.compact();
        warn!(
            "Schema validation failed on attempt {attempt}/{attempts}; requesting repair ({})",
            compact.iter().take(4).cloned().collect::<Vec<_>>().join("; ")
        );
        let prompt = schema_repair_prompt(ctx.original_prompt, &payload, &compact);
        payload = complete_and_decode(ctx.client, &prompt, ctx.policy).await?;
        attempt += 1;
    }
}
