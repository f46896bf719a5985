//! The summary schema: typed result model plus the validator that guards it.
//!
//! The model answers with one JSON object:
//!
//! ```text
//! { "metadata": {...}, "part1": {"paper_type": "...", ...}, "part2": {...} | null }
//! ```
//!
//! [`validate_payload`] walks that object by hand and collects *every*
//! violation as a `path: message` pair (e.g. `part1.primary.results: field
//! required`), because the full list goes back to the model in a repair
//! prompt. Only a payload with zero violations is converted into a
//! [`PaperSummary`], which has no public constructor: holding one means the
//! research gate, the `part1` discriminator and the `part2` presence rule all
//! held.

use crate::error::{ValidationError, Violation};
use crate::pipeline::decode::Payload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ── Field lists ──────────────────────────────────────────────────────────

const PRIMARY_PROSE: &[&str] = &[
    "tldr",
    "problem_motivation",
    "core_contribution",
    "methods",
    "results",
    "key_takeaways",
    "limitations",
    "relevance",
    "critical_assessment",
];
const PRIMARY_LISTS: &[&str] = &["cite_for", "quotable_sentences", "notable_findings"];

const SURVEY_PROSE: &[&str] = &[
    "tldr",
    "scope_coverage",
    "taxonomy_organization",
    "key_claims_narrative",
    "gaps_identified",
    "relevance",
    "critical_assessment",
];
const SURVEY_LISTS: &[&str] = &["cite_for", "quotable_sentences"];

const COMMENTARY_PROSE: &[&str] = &[
    "tldr",
    "core_argument",
    "target_papers",
    "limitations",
    "relevance",
    "critical_assessment",
];
const COMMENTARY_LISTS: &[&str] = &["cite_for", "quotable_sentences"];

const NON_RESEARCH_PROSE: &[&str] = &["note"];
const NO_LISTS: &[&str] = &[];

/// The 18 flat string fields of the Part 2 extraction block.
pub const PART2_FIELDS: [&str; 18] = [
    "neuron_model",
    "network_architecture",
    "model_scale",
    "simulator_framework",
    "hardware_training",
    "controller_hardware_inference",
    "control_task",
    "task_type",
    "task_complexity_scale",
    "simulation_environment",
    "spike_encoding",
    "action_decoding",
    "learning_mechanism",
    "credit_assignment_scope",
    "online_vs_offline",
    "data_collection",
    "key_training_details",
    "comparison_to_baselines",
];

const TOP_LEVEL_KEYS: [&str; 3] = ["metadata", "part1", "part2"];

// ── Typed model ──────────────────────────────────────────────────────────

/// Research-paper category. `None` in metadata means "not a research paper".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperType {
    Primary,
    Survey,
    Commentary,
}

impl PaperType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperType::Primary => "primary",
            PaperType::Survey => "survey",
            PaperType::Commentary => "commentary",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(PaperType::Primary),
            "survey" => Some(PaperType::Survey),
            "commentary" => Some(PaperType::Commentary),
            _ => None,
        }
    }

    /// Only primary papers carry a Part 2 block.
    pub fn requires_part2(&self) -> bool {
        matches!(self, PaperType::Primary)
    }
}

impl fmt::Display for PaperType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bibliographic facts and the research gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub citation_key: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: i32,
    pub venue: String,
    pub is_research_paper: bool,
    pub paper_type: Option<PaperType>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimarySummary {
    pub tldr: String,
    pub problem_motivation: String,
    pub core_contribution: String,
    pub methods: String,
    pub results: String,
    pub key_takeaways: String,
    pub limitations: String,
    pub relevance: String,
    #[serde(default)]
    pub cite_for: Vec<String>,
    pub critical_assessment: String,
    #[serde(default)]
    pub quotable_sentences: Vec<String>,
    #[serde(default)]
    pub notable_findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveySummary {
    pub tldr: String,
    pub scope_coverage: String,
    pub taxonomy_organization: String,
    pub key_claims_narrative: String,
    pub gaps_identified: String,
    pub relevance: String,
    #[serde(default)]
    pub cite_for: Vec<String>,
    pub critical_assessment: String,
    #[serde(default)]
    pub quotable_sentences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentarySummary {
    pub tldr: String,
    pub core_argument: String,
    pub target_papers: String,
    pub limitations: String,
    pub relevance: String,
    #[serde(default)]
    pub cite_for: Vec<String>,
    pub critical_assessment: String,
    #[serde(default)]
    pub quotable_sentences: Vec<String>,
}

/// Why a document was rejected by the research gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonResearchNote {
    pub note: String,
}

/// Part 1, selected by its `paper_type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "paper_type", rename_all = "snake_case")]
pub enum SummaryPart1 {
    Primary(PrimarySummary),
    Survey(SurveySummary),
    Commentary(CommentarySummary),
    NonResearch(NonResearchNote),
}

impl SummaryPart1 {
    /// The discriminator as it appears on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            SummaryPart1::Primary(_) => "primary",
            SummaryPart1::Survey(_) => "survey",
            SummaryPart1::Commentary(_) => "commentary",
            SummaryPart1::NonResearch(_) => "non_research",
        }
    }

    /// `None` for the non-research variant.
    pub fn paper_type(&self) -> Option<PaperType> {
        match self {
            SummaryPart1::Primary(_) => Some(PaperType::Primary),
            SummaryPart1::Survey(_) => Some(PaperType::Survey),
            SummaryPart1::Commentary(_) => Some(PaperType::Commentary),
            SummaryPart1::NonResearch(_) => None,
        }
    }
}

/// SNN control extraction (Part 2), present for primary papers only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnnExtraction {
    pub neuron_model: String,
    pub network_architecture: String,
    pub model_scale: String,
    pub simulator_framework: String,
    pub hardware_training: String,
    pub controller_hardware_inference: String,
    pub control_task: String,
    pub task_type: String,
    pub task_complexity_scale: String,
    pub simulation_environment: String,
    pub spike_encoding: String,
    pub action_decoding: String,
    pub learning_mechanism: String,
    pub credit_assignment_scope: String,
    pub online_vs_offline: String,
    pub data_collection: String,
    pub key_training_details: String,
    pub comparison_to_baselines: String,
}

/// A fully validated summary for one paper.
///
/// Only [`validate_payload`] produces one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaperSummary {
    metadata: Metadata,
    part1: SummaryPart1,
    part2: Option<SnnExtraction>,
}

#[derive(Deserialize)]
struct RawSummary {
    metadata: Metadata,
    part1: SummaryPart1,
    part2: Option<SnnExtraction>,
}

impl PaperSummary {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn part1(&self) -> &SummaryPart1 {
        &self.part1
    }

    pub fn part2(&self) -> Option<&SnnExtraction> {
        self.part2.as_ref()
    }

    pub fn citation_key(&self) -> &str {
        &self.metadata.citation_key
    }

    pub fn paper_type(&self) -> Option<PaperType> {
        self.metadata.paper_type
    }

    /// Output sub-directory: the paper type, or `non_research`.
    pub fn category_dir(&self) -> &'static str {
        self.metadata
            .paper_type
            .map_or("non_research", |t| t.as_str())
    }
}

// ── Validation ───────────────────────────────────────────────────────────

/// Validate a decoded payload and build the typed summary.
///
/// Field-level checks run first; the cross-field rules (research gate,
/// discriminator agreement, `part2` presence) only run once the fields they
/// read are well-typed, so a repair prompt never lists a consequence next to
/// its cause. Extra top-level keys are ignored.
pub fn validate_payload(payload: &Payload) -> Result<PaperSummary, ValidationError> {
    let mut c = Checker::default();

    for key in TOP_LEVEL_KEYS {
        if !payload.contains_key(key) {
            c.push(key, "field required");
        }
    }

    let meta = payload.get("metadata").and_then(|v| c.object(v, "metadata"));
    let gate = meta.and_then(|m| c.metadata(m));

    let part1_tag = payload.get("part1").and_then(|v| c.part1(v));

    let part2_present = match payload.get("part2") {
        None => None,
        Some(Value::Null) => Some(false),
        Some(Value::Object(obj)) => {
            c.strings(obj, "part2", &PART2_FIELDS);
            Some(true)
        }
        Some(_) => {
            c.push("part2", "expected an object or null");
            None
        }
    };

    if c.violations.is_empty() {
        if let (Some(gate), Some(tag), Some(part2_present)) = (gate, part1_tag, part2_present) {
            c.consistency(gate, tag, part2_present);
        }
    }

    if !c.violations.is_empty() {
        return Err(ValidationError {
            violations: c.violations,
        });
    }

    let raw: RawSummary = serde_json::from_value(Value::Object(payload.clone())).map_err(|e| {
        ValidationError {
            violations: vec![Violation::new("response", e.to_string())],
        }
    })?;

    Ok(PaperSummary {
        metadata: raw.metadata,
        part1: raw.part1,
        part2: raw.part2,
    })
}

/// Research-gate facts pulled out of a well-typed `metadata`.
#[derive(Clone, Copy)]
struct Gate {
    is_research: bool,
    paper_type: Option<PaperType>,
}

#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation::new(path, message));
    }

    fn object<'a>(&mut self, v: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match v {
            Value::Object(obj) => Some(obj),
            _ => {
                self.push(path, "expected an object");
                None
            }
        }
    }

    /// Required string fields. Returns `true` when all were valid.
    fn strings(&mut self, obj: &Map<String, Value>, prefix: &str, keys: &[&str]) -> bool {
        let before = self.violations.len();
        for key in keys {
            match obj.get(*key) {
                None => self.push(format!("{prefix}.{key}"), "field required"),
                Some(Value::String(_)) => {}
                Some(_) => self.push(format!("{prefix}.{key}"), "expected a string"),
            }
        }
        self.violations.len() == before
    }

    /// A list of strings; `required = false` lets the key be absent.
    fn string_list(&mut self, obj: &Map<String, Value>, prefix: &str, key: &str, required: bool) {
        let path = format!("{prefix}.{key}");
        match obj.get(key) {
            None if required => self.push(path, "field required"),
            None => {}
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        self.push(format!("{path}.{i}"), "expected a string");
                    }
                }
            }
            Some(_) => self.push(path, "expected a list"),
        }
    }

    fn metadata(&mut self, m: &Map<String, Value>) -> Option<Gate> {
        let before = self.violations.len();
        self.strings(m, "metadata", &["citation_key", "title", "venue"]);
        self.string_list(m, "metadata", "authors", true);
        self.string_list(m, "metadata", "tags", true);

        match m.get("year") {
            None => self.push("metadata.year", "field required"),
            Some(v) if v.is_i64() || v.is_u64() => {
                if v.as_i64().and_then(|y| i32::try_from(y).ok()).is_none() {
                    self.push("metadata.year", "integer out of range");
                }
            }
            Some(_) => self.push("metadata.year", "expected an integer"),
        }

        let is_research = match m.get("is_research_paper") {
            None => {
                self.push("metadata.is_research_paper", "field required");
                None
            }
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.push("metadata.is_research_paper", "expected a boolean");
                None
            }
        };

        let paper_type = match m.get("paper_type") {
            None => {
                self.push("metadata.paper_type", "field required");
                None
            }
            Some(Value::Null) => Some(None),
            Some(Value::String(s)) => match PaperType::parse(s) {
                Some(t) => Some(Some(t)),
                None => {
                    self.push(
                        "metadata.paper_type",
                        format!("expected 'primary', 'survey', 'commentary' or null, got '{s}'"),
                    );
                    None
                }
            },
            Some(_) => {
                self.push(
                    "metadata.paper_type",
                    "expected 'primary', 'survey', 'commentary' or null",
                );
                None
            }
        };

        let rejection_reason = match m.get("rejection_reason") {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(s)) => Some(Some(s.as_str())),
            Some(_) => {
                self.push("metadata.rejection_reason", "expected a string or null");
                None
            }
        };

        if self.violations.len() != before {
            return None;
        }
        let (is_research, paper_type, rejection_reason) =
            (is_research?, paper_type?, rejection_reason?);

        if is_research {
            if paper_type.is_none() {
                self.push("metadata", "paper_type is required when is_research_paper=true");
            }
            if rejection_reason.is_some() {
                self.push("metadata", "rejection_reason must be null when is_research_paper=true");
            }
        } else {
            if paper_type.is_some() {
                self.push("metadata", "paper_type must be null when is_research_paper=false");
            }
            if rejection_reason.is_none_or(str::is_empty) {
                self.push("metadata", "rejection_reason is required when is_research_paper=false");
            }
        }

        (self.violations.len() == before).then_some(Gate {
            is_research,
            paper_type,
        })
    }

    /// Check `part1` and return its discriminator when fully valid.
    fn part1(&mut self, v: &Value) -> Option<&'static str> {
        let obj = self.object(v, "part1")?;
        let tag = match obj.get("paper_type") {
            Some(Value::String(s)) => s.as_str(),
            _ => {
                self.push("part1", "unable to extract tag using discriminator 'paper_type'");
                return None;
            }
        };

        let (tag, prose, lists): (&'static str, &[&str], &[&str]) = match tag {
            "primary" => ("primary", PRIMARY_PROSE, PRIMARY_LISTS),
            "survey" => ("survey", SURVEY_PROSE, SURVEY_LISTS),
            "commentary" => ("commentary", COMMENTARY_PROSE, COMMENTARY_LISTS),
            "non_research" => ("non_research", NON_RESEARCH_PROSE, NO_LISTS),
            other => {
                self.push(
                    "part1",
                    format!(
                        "input tag '{other}' found using 'paper_type' does not match any of the \
                         expected tags: 'primary', 'survey', 'commentary', 'non_research'"
                    ),
                );
                return None;
            }
        };

        let prefix = format!("part1.{tag}");
        let before = self.violations.len();
        self.strings(obj, &prefix, prose);
        for key in lists {
            self.string_list(obj, &prefix, key, false);
        }
        (self.violations.len() == before).then_some(tag)
    }

    fn consistency(&mut self, gate: Gate, part1_tag: &str, part2_present: bool) {
        if !gate.is_research {
            if part1_tag != "non_research" {
                self.push(
                    "response",
                    "part1.paper_type must be 'non_research' when is_research_paper=false",
                );
            }
            if part2_present {
                self.push("response", "part2 must be null when is_research_paper=false");
            }
            return;
        }

        let Some(paper_type) = gate.paper_type else {
            return;
        };
        if part1_tag != paper_type.as_str() {
            self.push(
                "response",
                format!(
                    "metadata.paper_type '{paper_type}' must match part1.paper_type '{part1_tag}'"
                ),
            );
        }
        match (paper_type.requires_part2(), part2_present) {
            (true, false) => self.push("part2", "part2 is required for primary papers"),
            (false, true) => self.push("part2", "part2 must be null for survey/commentary papers"),
            _ => {}
        }
    }
}
