//! Normalized concept records and search requests

use serde::{Deserialize, Serialize};

/// A concept returned by a terminology service, in service-neutral form.
///
/// Each service client produces these from its own wire format; nothing
/// above the client layer sees raw service payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptResult {
    pub label: String,
    pub uri: String,
    /// Upper-case ontology acronym (e.g. `MONDO`, `HP`).
    pub ontology_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub source_service: String,
    pub confidence_score: f32,
}

impl ConceptResult {
    pub fn new(
        label: impl Into<String>,
        uri: impl Into<String>,
        ontology_code: impl Into<String>,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            uri: uri.into(),
            ontology_code: ontology_code.into(),
            description: None,
            synonyms: Vec::new(),
            source_service: source_service.into(),
            confidence_score: 0.0,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn confidence(mut self, score: f32) -> Self {
        self.confidence_score = score;
        self
    }

    /// Label in canonical comparison form.
    pub fn normalized_label(&self) -> String {
        normalize_text(&self.label)
    }
}

/// Parameters for a single-service search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// BioPortal-style ontology acronyms; empty means no filter.
    #[serde(default)]
    pub ontologies: Vec<String>,
    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ontologies: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn ontologies<I, S>(mut self, ontologies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ontologies = ontologies.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }
}

/// Results requested per service when the caller does not say.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Confidence that `label`/`synonyms` name the queried concept.
///
/// 1.0 for an exact label match, 0.9 for an exact synonym, 0.75 when one
/// contains the other, 0.5 otherwise.
pub fn score_confidence(query: &str, label: &str, synonyms: &[String]) -> f32 {
    let query = normalize_text(query);
    let label = normalize_text(label);
    if query.is_empty() || label.is_empty() {
        return 0.5;
    }
    if label == query {
        return 1.0;
    }
    if synonyms.iter().any(|s| normalize_text(s) == query) {
        return 0.9;
    }
    if label.contains(&query) || query.contains(&label) {
        return 0.75;
    }
    0.5
}

/// Drop repeated `(uri, ontology_code)` pairs, keeping first occurrence.
pub fn dedup_results(results: Vec<ConceptResult>) -> Vec<ConceptResult> {
    let mut seen = std::collections::HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert((r.uri.clone(), r.ontology_code.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize_text("  Long   COVID \t"), "long covid");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn confidence_levels() {
        let syns = vec!["Tiredness".to_string()];
        assert_eq!(score_confidence("fatigue", "Fatigue", &syns), 1.0);
        assert_eq!(score_confidence("tiredness", "Fatigue", &syns), 0.9);
        assert_eq!(score_confidence("fatigue", "Chronic fatigue", &syns), 0.75);
        assert_eq!(score_confidence("fatigue", "Malaise", &syns), 0.5);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let a = ConceptResult::new("A", "http://x/1", "HP", "ols").confidence(1.0);
        let b = ConceptResult::new("A dup", "http://x/1", "HP", "ols");
        let c = ConceptResult::new("A", "http://x/1", "MONDO", "ols");
        let out = dedup_results(vec![a.clone(), b, c.clone()]);
        assert_eq!(out, vec![a, c]);
    }
}
