//! Turn a raw model reply into a JSON object.
//!
//! Models wrap JSON in prose and code fences more often than not. The brace
//! span from the first `{` to the last `}` drops both, so no fence stripping is
//! needed. When the span still does not parse, the model gets exactly one
//! chance to fix its own syntax; if that fails too, the *original* parse error
//! is returned so the log shows the real defect.

use crate::error::{DecodeError, SummarizeError};
use crate::pipeline::llm::{call_with_retry, CompletionClient, RetryPolicy};
use crate::prompts::json_repair_prompt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A decoded top-level JSON object.
pub type Payload = Map<String, Value>;

/// Chars of the offending reply kept in a [`DecodeError::NoJsonObject`].
const PREVIEW_CHARS: usize = 200;

/// Decode the brace span of `text` without any repair.
pub fn decode_strict(text: &str) -> Result<Payload, DecodeError> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(DecodeError::NoJsonObject {
                preview: text.chars().take(PREVIEW_CHARS).collect(),
            })
        }
    };
    // `}` before `{`: an empty candidate yields a normal parse error.
    let candidate = if end >= start { &text[start..=end] } else { "" };
    serde_json::from_str::<Payload>(candidate).map_err(|source| DecodeError::InvalidJson { source })
}

/// Decode `text`, spending at most one repair call on a syntax error.
///
/// A reply without any brace is not sent for repair: there is nothing to fix.
pub async fn decode(text: &str, client: &dyn CompletionClient) -> Result<Payload, DecodeError> {
    let original = match decode_strict(text) {
        Ok(payload) => return Ok(payload),
        Err(e @ DecodeError::NoJsonObject { .. }) => return Err(e),
        Err(e) => e,
    };

    warn!("LLM returned malformed JSON ({original}); requesting one repair");
    let repaired = match client.complete(&json_repair_prompt(text)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("JSON repair call failed: {e}");
            return Err(original);
        }
    };

    decode_strict(&repaired).map_err(|e| {
        debug!("JSON repair reply still undecodable: {e}");
        original
    })
}

/// One full request: completion with transient retry, then decode with its
/// single syntax repair.
pub async fn complete_and_decode(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<Payload, SummarizeError> {
    let raw = call_with_retry(client, prompt, policy).await?;
    Ok(decode(&raw, client).await?)
}
