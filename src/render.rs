//! Markdown rendering of a validated [`PaperSummary`].
//!
//! Pure formatting, no I/O: the caller decides where the string goes. Part 1
//! prose is never truncated; when it runs more than 50 % over the per-type
//! word limit a warning is logged so prompt drift shows up in the run log.

use crate::schema::{
    CommentarySummary, Metadata, NonResearchNote, PaperSummary, PaperType, PrimarySummary,
    SnnExtraction, SummaryPart1, SurveySummary,
};
use std::fmt::Write;
use tracing::warn;

/// Part 1 prose word limit, shared by all research types.
pub const PART1_WORD_LIMIT: usize = 400;

/// Warn once prose exceeds the limit by this fraction.
const WARN_OVER_FRACTION: f64 = 0.5;

/// Render `summary` as the final markdown document.
pub fn render_summary(summary: &PaperSummary) -> String {
    let meta = summary.metadata();
    let mut out = render_header(meta);
    out.push_str("\n\n---\n\n");

    match summary.part1() {
        SummaryPart1::Primary(p) => render_primary(&mut out, p),
        SummaryPart1::Survey(s) => render_survey(&mut out, s),
        SummaryPart1::Commentary(c) => render_commentary(&mut out, c),
        SummaryPart1::NonResearch(n) => {
            render_non_research(&mut out, n);
            return out;
        }
    }

    if let Some(part2) = summary.part2() {
        out.push_str("---\n\n");
        render_part2(&mut out, part2);
    }
    out.trim_end().to_string()
}

/// Total whitespace-separated words across `texts`.
pub fn count_words(texts: &[&str]) -> usize {
    texts.iter().map(|t| t.split_whitespace().count()).sum()
}

/// `true` when `words` is more than 50 % over [`PART1_WORD_LIMIT`].
pub fn exceeds_word_limit(words: usize) -> bool {
    let threshold = (PART1_WORD_LIMIT as f64 * (1.0 + WARN_OVER_FRACTION)) as usize;
    words > threshold
}

fn check_word_limit(paper_type: PaperType, texts: &[&str]) {
    let words = count_words(texts);
    if exceeds_word_limit(words) {
        warn!(
            "{paper_type} Part 1 prose is {words} words (limit {PART1_WORD_LIMIT}; >50% over, consider refining the prompt)"
        );
    }
}

fn type_label(paper_type: Option<PaperType>) -> &'static str {
    match paper_type {
        Some(PaperType::Primary) => "primary research",
        Some(PaperType::Survey) => "survey/review",
        Some(PaperType::Commentary) => "commentary/opinion",
        None => "non-research",
    }
}

fn render_header(meta: &Metadata) -> String {
    format!(
        "# {}\n\n\
         **Citation key:** {}\n\
         **Authors:** {}\n\
         **Year:** {}\n\
         **Venue:** {}\n\
         **Paper Type:** {}\n\
         **Tags:** {}",
        meta.title,
        meta.citation_key,
        meta.authors.join(", "),
        meta.year,
        meta.venue,
        type_label(meta.paper_type),
        meta.tags.join(", "),
    )
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn quoted_bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- \"{i}\""))
        .collect::<Vec<_>>()
        .join("\n")
}

fn section(out: &mut String, heading: &str, body: &str) {
    let _ = write!(out, "### {heading}\n\n{body}\n\n");
}

fn tldr_and_part1_heading(out: &mut String, tldr: &str) {
    let _ = write!(out, "## TL;DR\n\n{tldr}\n\n---\n\n## Part 1: Paper Summary\n\n");
}

fn cite_for(out: &mut String, items: &[String]) {
    let _ = write!(out, "**Cite for:**\n{}\n\n", bullets(items));
}

fn render_primary(out: &mut String, p: &PrimarySummary) {
    check_word_limit(
        PaperType::Primary,
        &[
            &p.tldr,
            &p.problem_motivation,
            &p.core_contribution,
            &p.methods,
            &p.results,
            &p.key_takeaways,
            &p.limitations,
            &p.relevance,
            &p.critical_assessment,
        ],
    );

    tldr_and_part1_heading(out, &p.tldr);
    section(out, "Problem & Motivation", &p.problem_motivation);
    section(out, "Core Contribution", &p.core_contribution);
    section(out, "Methods", &p.methods);
    section(out, "Results", &p.results);
    section(out, "Key Takeaways", &p.key_takeaways);
    section(out, "Limitations", &p.limitations);
    section(out, "Relevance to This Review", &p.relevance);
    cite_for(out, &p.cite_for);
    section(out, "Critical Assessment", &p.critical_assessment);
    section(out, "Quotable Sentences", &quoted_bullets(&p.quotable_sentences));
    section(out, "Notable Findings", &bullets(&p.notable_findings));
}

fn render_survey(out: &mut String, s: &SurveySummary) {
    check_word_limit(
        PaperType::Survey,
        &[
            &s.tldr,
            &s.scope_coverage,
            &s.taxonomy_organization,
            &s.key_claims_narrative,
            &s.gaps_identified,
            &s.relevance,
            &s.critical_assessment,
        ],
    );

    tldr_and_part1_heading(out, &s.tldr);
    section(out, "Scope & Coverage", &s.scope_coverage);
    section(out, "Taxonomy & Organization", &s.taxonomy_organization);
    section(out, "Key Claims & Narrative", &s.key_claims_narrative);
    section(out, "Gaps Identified", &s.gaps_identified);
    section(out, "Relevance to This Review", &s.relevance);
    cite_for(out, &s.cite_for);
    section(out, "Critical Assessment", &s.critical_assessment);
    section(out, "Quotable Sentences", &quoted_bullets(&s.quotable_sentences));
}

fn render_commentary(out: &mut String, c: &CommentarySummary) {
    check_word_limit(
        PaperType::Commentary,
        &[
            &c.tldr,
            &c.core_argument,
            &c.target_papers,
            &c.limitations,
            &c.relevance,
            &c.critical_assessment,
        ],
    );

    tldr_and_part1_heading(out, &c.tldr);
    section(out, "Core Argument", &c.core_argument);
    section(out, "Target Paper(s)", &c.target_papers);
    section(out, "Limitations", &c.limitations);
    section(out, "Relevance to This Review", &c.relevance);
    cite_for(out, &c.cite_for);
    section(out, "Critical Assessment", &c.critical_assessment);
    section(out, "Quotable Sentences", &quoted_bullets(&c.quotable_sentences));
}

fn render_non_research(out: &mut String, n: &NonResearchNote) {
    let _ = write!(
        out,
        "## Note\n\n\
         This document was detected as non-research and excluded from paper-type classification.\n\n\
         {}",
        n.note
    );
}

fn render_part2(out: &mut String, p: &SnnExtraction) {
    let fields: [(&str, &str); 18] = [
        ("Neuron model", p.neuron_model.as_str()),
        ("Network architecture", p.network_architecture.as_str()),
        ("Model scale", p.model_scale.as_str()),
        ("Simulator / framework", p.simulator_framework.as_str()),
        ("Hardware (training)", p.hardware_training.as_str()),
        ("Controller hardware (inference)", p.controller_hardware_inference.as_str()),
        ("Control task", p.control_task.as_str()),
        ("Task type", p.task_type.as_str()),
        ("Task complexity & scale", p.task_complexity_scale.as_str()),
        ("Simulation environment", p.simulation_environment.as_str()),
        ("Spike encoding", p.spike_encoding.as_str()),
        ("Action decoding", p.action_decoding.as_str()),
        ("Learning mechanism", p.learning_mechanism.as_str()),
        ("Credit assignment scope", p.credit_assignment_scope.as_str()),
        ("Online vs. offline", p.online_vs_offline.as_str()),
        ("Data collection", p.data_collection.as_str()),
        ("Key training details", p.key_training_details.as_str()),
        ("Comparison to baselines", p.comparison_to_baselines.as_str()),
    ];

    out.push_str("## Part 2: SNN Control Extraction\n\n");
    for (label, value) in fields {
        let _ = write!(out, "**{label}:** {value}\n\n");
    }
}
