//! Deterministic pre-validation repairs of `metadata.year` and
//! `metadata.citation_key`.
//!
//! These two fields are the ones models get wrong most often ("not reported",
//! `"2024"`, `"n/a"`, `"Doe2024"`), and both can be reconstructed from the
//! rest of the payload or from the filename. Fixing them locally saves a
//! schema-repair round trip.
//!
//! Both passes are idempotent: a payload that already carries an integer year
//! and a valid key is left untouched.

use crate::pipeline::decode::Payload;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)(19\d{2}|20\d{2})(?:\D|$)").unwrap());
static CITATION_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*$").unwrap());
static TOKEN_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

const PLACEHOLDER_KEYS: [&str; 4] = ["not reported", "unknown", "n/a", "na"];

/// Apply year then citation-key normalisation to `payload` in place.
///
/// The year goes first so a synthesised key uses the repaired year.
pub fn normalize(payload: &mut Payload, pdf_path: &Path) {
    normalize_year(payload, pdf_path);
    normalize_citation_key(payload, pdf_path);
}

/// Replace a non-integer `metadata.year` with the first 19xx/20xx found in
/// the year string, the title, the filename, then the citation key; else 0.
pub fn normalize_year(payload: &mut Payload, pdf_path: &Path) {
    let Some(Value::Object(metadata)) = payload.get_mut("metadata") else {
        return;
    };

    let year = metadata.get("year").cloned().unwrap_or(Value::Null);
    if year.is_i64() || year.is_u64() {
        return;
    }

    let file_name = pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (normalized, source) = year_candidate(year.as_str())
        .map(|y| (y, "metadata.year"))
        .or_else(|| year_candidate(metadata.get("title").and_then(Value::as_str)).map(|y| (y, "metadata.title")))
        .or_else(|| year_candidate(Some(&file_name)).map(|y| (y, "source filename")))
        .or_else(|| {
            year_candidate(metadata.get("citation_key").and_then(Value::as_str))
                .map(|y| (y, "metadata.citation_key"))
        })
        .unwrap_or((0, "fallback=0"));

    warn!("LLM returned non-integer metadata.year={year}; normalized to {normalized} using {source}");
    metadata.insert("year".into(), Value::from(normalized));
}

/// Replace an invalid `metadata.citation_key` with
/// `{first-author surname}{year}{first title word}`.
pub fn normalize_citation_key(payload: &mut Payload, pdf_path: &Path) {
    let Some(Value::Object(metadata)) = payload.get_mut("metadata") else {
        return;
    };

    let current = metadata.get("citation_key").cloned().unwrap_or(Value::Null);
    if let Some(key) = current.as_str().filter(|k| is_valid_citation_key(k)) {
        let trimmed = key.trim();
        if trimmed != key {
            metadata.insert("citation_key".into(), Value::from(trimmed));
        }
        return;
    }

    let repaired = build_citation_key(metadata, pdf_path);
    warn!("LLM returned invalid citation_key={current}; repaired to {repaired}");
    metadata.insert("citation_key".into(), Value::from(repaired));
}

/// Non-empty, not a placeholder, lowercase alphanumeric starting with a letter.
pub fn is_valid_citation_key(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty()
        && !PLACEHOLDER_KEYS.contains(&key.to_lowercase().as_str())
        && CITATION_KEY_RE.is_match(key)
}

fn build_citation_key(metadata: &serde_json::Map<String, Value>, pdf_path: &Path) -> String {
    let year = metadata.get("year").and_then(Value::as_i64).unwrap_or(0);

    let author = metadata
        .get("authors")
        .and_then(Value::as_array)
        .and_then(|authors| authors.first())
        .map(|first| match first {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .and_then(|name| alpha_tokens(&name).last().cloned())
        .unwrap_or_else(|| "paper".to_string());

    let title_token = metadata
        .get("title")
        .and_then(Value::as_str)
        .and_then(|t| alpha_tokens(t).into_iter().next())
        .or_else(|| {
            pdf_path
                .file_stem()
                .and_then(|s| alpha_tokens(&s.to_string_lossy()).into_iter().next())
        })
        .unwrap_or_else(|| "paper".to_string());

    format!("{author}{year}{title_token}").to_lowercase()
}

/// Lowercased `[A-Za-z0-9]+` runs starting with a letter.
fn alpha_tokens(value: &str) -> Vec<String> {
    TOKEN_SPLIT_RE
        .split(value)
        .filter(|t| t.starts_with(|c: char| c.is_ascii_alphabetic()))
        .map(str::to_lowercase)
        .collect()
}

fn year_candidate(value: Option<&str>) -> Option<i64> {
    YEAR_RE
        .captures(value?)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(metadata: Value) -> Payload {
        json!({"metadata": metadata, "part1": {}, "part2": null})
            .as_object()
            .unwrap()
            .clone()
    }

    fn meta(p: &Payload) -> &serde_json::Map<String, Value> {
        p["metadata"].as_object().unwrap()
    }

    #[test]
    fn year_from_filename_when_field_and_title_lack_one() {
        let mut p = payload(json!({"year": "not reported", "title": "Untitled"}));
        normalize_year(&mut p, Path::new("/papers/Doe - 2024 - Study.pdf"));
        assert_eq!(meta(&p)["year"], 2024);
    }

    #[test]
    fn year_string_itself_wins() {
        let mut p = payload(json!({"year": "published 1998", "title": "In 2001"}));
        normalize_year(&mut p, Path::new("2010.pdf"));
        assert_eq!(meta(&p)["year"], 1998);
    }

    #[test]
    fn year_ignores_longer_digit_runs() {
        let mut p = payload(json!({"year": "id 120245", "title": "x"}));
        normalize_year(&mut p, Path::new("scan.pdf"));
        assert_eq!(meta(&p)["year"], 0);
    }

    #[test]
    fn year_falls_back_to_citation_key() {
        let mut p = payload(json!({"year": null, "title": "x", "citation_key": "doe2019x"}));
        normalize_year(&mut p, Path::new("paper.pdf"));
        assert_eq!(meta(&p)["year"], 2019);
    }

    #[test]
    fn integer_year_untouched() {
        let mut p = payload(json!({"year": 1850, "title": "2024"}));
        normalize_year(&mut p, Path::new("x.pdf"));
        assert_eq!(meta(&p)["year"], 1850);
    }

    #[test]
    fn placeholder_key_rebuilt_from_author_year_title() {
        let mut p = payload(json!({
            "citation_key": "n/a",
            "authors": ["Jane Doe"],
            "year": 2024,
            "title": "Spiking Networks"
        }));
        normalize_citation_key(&mut p, Path::new("x.pdf"));
        assert_eq!(meta(&p)["citation_key"], "doe2024spiking");
    }

    #[test]
    fn key_fallbacks_use_stem_and_paper() {
        let mut p = payload(json!({"citation_key": "Doe2024", "authors": [], "year": 2020, "title": "2020"}));
        normalize_citation_key(&mut p, Path::new("/x/42-neuromorphic-control.pdf"));
        assert_eq!(meta(&p)["citation_key"], "paper2020neuromorphic");

        let mut p = payload(json!({"citation_key": null, "title": "!!!"}));
        normalize_citation_key(&mut p, Path::new("/x/123.pdf"));
        assert_eq!(meta(&p)["citation_key"], "paper0paper");
    }

    #[test]
    fn valid_key_is_trimmed_not_replaced() {
        let mut p = payload(json!({"citation_key": " smith2021deep "}));
        normalize_citation_key(&mut p, Path::new("x.pdf"));
        assert_eq!(meta(&p)["citation_key"], "smith2021deep");
    }

    #[test]
    fn placeholders_rejected_case_insensitively() {
        for k in ["Unknown", "NA", "not reported", "", "  ", "9lives", "doe_2024"] {
            assert!(!is_valid_citation_key(k), "{k:?} should be invalid");
        }
        assert!(is_valid_citation_key("na2020x"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut p = payload(json!({
            "citation_key": "unknown",
            "authors": ["Doe, J."],
            "year": "c. 2003",
            "title": "Learning to fly"
        }));
        let path = Path::new("paper.pdf");
        normalize(&mut p, path);
        let once = p.clone();
        normalize(&mut p, path);
        assert_eq!(p, once);
        assert_eq!(meta(&p)["citation_key"], "j2003learning");
    }

    #[test]
    fn author_suffix_starting_with_digit_is_skipped() {
        let mut p = payload(json!({
            "citation_key": "n/a",
            "authors": ["John Smith 3rd"],
            "year": 2024,
            "title": "3D Spiking Networks"
        }));
        normalize_citation_key(&mut p, Path::new("x.pdf"));
        let key = meta(&p)["citation_key"].as_str().unwrap().to_string();
        assert_eq!(key, "smith2024spiking");
        assert!(is_valid_citation_key(&key));
    }

    #[test]
    fn missing_metadata_is_noop() {
        let mut p = json!({"part1": {}}).as_object().unwrap().clone();
        let before = p.clone();
        normalize(&mut p, Path::new("x.pdf"));
        assert_eq!(p, before);
    }
}
