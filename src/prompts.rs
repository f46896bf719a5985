//! Prompt construction for the summarisation call and its repair rounds.
//!
//! Every prompt is self-contained: the reference guidelines, the paper text
//! and the filename travel with each request, so calls are stateless and a
//! repair round can be sent to a different backend instance than the first
//! call. Keeping the wording here means retry and validation code never
//! touches prompt text.

use crate::error::SummarizeError;
use crate::pipeline::decode::Payload;
use std::path::Path;

/// Separator placed between reference files.
pub const REFERENCE_SEPARATOR: &str = "\n\n---\n\n";

/// Concatenate every `*.md` file in `dir`, sorted by file name.
///
/// A missing directory is a hard error: without the guidelines the model has
/// no output contract to follow.
pub fn load_references(dir: &Path) -> Result<String, SummarizeError> {
    if !dir.is_dir() {
        return Err(SummarizeError::ReferencesNotFound {
            path: dir.to_path_buf(),
        });
    }

    let io_err = |path: &Path, source| SummarizeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let path = entry.map_err(|e| io_err(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();

    let parts = files
        .iter()
        .map(|p| std::fs::read_to_string(p).map_err(|e| io_err(p, e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(REFERENCE_SEPARATOR))
}

/// Build the single prompt asking for `metadata`, `part1` and `part2` at once.
///
/// `source_filename` is offered as evidence for the publication year.
pub fn build_combined_prompt(paper_text: &str, references: &str, source_filename: &str) -> String {
    format!(
        r#"You are a research paper summarizer and data extractor.

Follow the reference guidelines below exactly:

{references}

---

Return exactly ONE valid JSON object with exactly these top-level keys:
- "metadata"
- "part1"
- "part2"

Output rules:
- Return JSON only: no markdown fences, no prose, no comments.
- No trailing commas.
- No extra top-level keys.
- Use key names exactly as the references specify them.
- Follow the JSON output contract for the chosen document type and do not omit any of its required keys.
- When a required value is unavailable write "not reported" (or "not applicable" when it truly does not apply).

metadata.year resolution, in priority order:
1) the publication year stated in the paper header or metadata,
2) the source filename,
3) the best-supported inference from the paper context (e.g. its references), only if needed.
metadata.year must be an integer, never "not reported".

Research gate:
- Research paper:
  - metadata.is_research_paper = true
  - metadata.paper_type is one of "primary", "survey", "commentary"
  - metadata.rejection_reason = null
  - part1.paper_type equals metadata.paper_type
- Not a research paper:
  - metadata.is_research_paper = false
  - metadata.paper_type = null
  - metadata.rejection_reason is a short reason
  - part1 = {{"paper_type": "non_research", "note": "..."}}

Part 2:
- metadata.paper_type == "primary": part2 is a complete Part 2 object. Keep every Part 2 key even when the paper has no control task or learning setup; use "not applicable" or "not reported" for those fields.
- metadata.paper_type "survey" or "commentary": part2 = null.
- Non-research documents: part2 = null.

Required part1 keys per variant:
- primary: paper_type, tldr, problem_motivation, core_contribution, methods, results, key_takeaways, limitations, relevance, cite_for, critical_assessment, quotable_sentences, notable_findings
- survey: paper_type, tldr, scope_coverage, taxonomy_organization, key_claims_narrative, gaps_identified, relevance, cite_for, critical_assessment, quotable_sentences
- commentary: paper_type, tldr, core_argument, target_papers, limitations, relevance, cite_for, critical_assessment, quotable_sentences
- non_research: paper_type, note

---

Source filename:
{source_filename}

---

Paper text:
{paper_text}"#
    )
}

/// Ask the model to fix JSON syntax only.
pub fn json_repair_prompt(bad_text: &str) -> String {
    format!(
        "You are a JSON repair assistant.\n\
         Task: repair the JSON syntax of the payload below.\n\
         Rules:\n\
         1) Output valid JSON only: no markdown, no comments, no explanation.\n\
         2) Keep every original key and value wherever possible.\n\
         3) Fix only syntax: escaping, quoting, commas, brackets.\n\
         4) Do not invent new facts.\n\n\
         Payload to repair:\n\
         {bad_text}"
    )
}

/// Ask the model to make `bad_payload` satisfy the schema.
///
/// `errors` are compact `path: message` lines, rendered as a bullet list.
pub fn schema_repair_prompt(original_prompt: &str, bad_payload: &Payload, errors: &[String]) -> String {
    let rendered_errors = errors
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    let bad_json = serde_json::to_string(bad_payload).unwrap_or_else(|_| "{}".to_string());

    format!(
        "You are a JSON schema-repair assistant.\n\
         Task: fix the RESPONSE JSON so it satisfies the expected schema.\n\
         Rules:\n\
         1) Output one valid JSON object only, with no markdown or explanation.\n\
         2) Keep existing fields and values wherever possible.\n\
         3) Add or repair only what the schema requires.\n\
         4) Do not invent unsupported facts; use 'not reported' for a required value that is unknown.\n\
         5) Keep exactly the top-level keys: metadata, part1, part2.\n\n\
         Validation errors:\n\
         {rendered_errors}\n\n\
         Original extraction prompt (for context):\n\
         {original_prompt}\n\n\
         Response JSON to repair:\n\
         {bad_json}"
    )
}
