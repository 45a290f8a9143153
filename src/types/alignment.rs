//! Alignment predicates and selection validation.
//!
//! The ontology generator turns a user's chosen [`ConceptResult`]s into
//! alignment triples. This module supplies the predicate vocabulary, a
//! heuristic suggestion for which predicate fits, and sanity checks on a
//! selection before it is written out.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::concept::{ConceptResult, normalize_text};

/// Predicate linking a local concept to an external one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPredicate {
    SameAs,
    SeeAlso,
    ExactMatch,
    CloseMatch,
    RelatedMatch,
    BroadMatch,
    NarrowMatch,
}

impl AlignmentPredicate {
    pub fn iri(self) -> &'static str {
        match self {
            AlignmentPredicate::SameAs => "http://www.w3.org/2002/07/owl#sameAs",
            AlignmentPredicate::SeeAlso => "http://www.w3.org/2000/01/rdf-schema#seeAlso",
            AlignmentPredicate::ExactMatch => "http://www.w3.org/2004/02/skos/core#exactMatch",
            AlignmentPredicate::CloseMatch => "http://www.w3.org/2004/02/skos/core#closeMatch",
            AlignmentPredicate::RelatedMatch => "http://www.w3.org/2004/02/skos/core#relatedMatch",
            AlignmentPredicate::BroadMatch => "http://www.w3.org/2004/02/skos/core#broadMatch",
            AlignmentPredicate::NarrowMatch => "http://www.w3.org/2004/02/skos/core#narrowMatch",
        }
    }

    pub fn curie(self) -> &'static str {
        match self {
            AlignmentPredicate::SameAs => "owl:sameAs",
            AlignmentPredicate::SeeAlso => "rdfs:seeAlso",
            AlignmentPredicate::ExactMatch => "skos:exactMatch",
            AlignmentPredicate::CloseMatch => "skos:closeMatch",
            AlignmentPredicate::RelatedMatch => "skos:relatedMatch",
            AlignmentPredicate::BroadMatch => "skos:broadMatch",
            AlignmentPredicate::NarrowMatch => "skos:narrowMatch",
        }
    }
}

impl fmt::Display for AlignmentPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.curie())
    }
}

const BROADER_INDICATORS: &[&str] = &["disease", "disorder", "condition", "syndrome"];
const NARROWER_INDICATORS: &[&str] = &["symptom", "sign", "manifestation"];

/// Suggest a predicate for aligning `concept_key` to `result`.
///
/// `concept_key` is the local identifier; underscores count as spaces.
pub fn suggest_predicate(concept_key: &str, result: &ConceptResult) -> AlignmentPredicate {
    let concept = normalize_text(&concept_key.replace('_', " "));
    let label = result.normalized_label();

    if label == concept || result.synonyms.iter().any(|s| normalize_text(s) == concept) {
        return AlignmentPredicate::ExactMatch;
    }
    if !label.is_empty() && (label.contains(&concept) || concept.contains(&label)) {
        return AlignmentPredicate::CloseMatch;
    }
    if matches!(concept.as_str(), "symptom" | "sign")
        && BROADER_INDICATORS.iter().any(|w| label.contains(w))
    {
        return AlignmentPredicate::BroadMatch;
    }
    if matches!(concept.as_str(), "disease" | "disorder")
        && NARROWER_INDICATORS.iter().any(|w| label.contains(w))
    {
        return AlignmentPredicate::NarrowMatch;
    }
    AlignmentPredicate::RelatedMatch
}

/// Limits used to flag questionable alignment selections.
///
/// These are presentation heuristics, not invariants; tune them in config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// More selected mappings than this for one concept is suspicious.
    pub max_mappings: usize,
    /// Selections scoring below this are flagged.
    pub min_confidence: f32,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            max_mappings: 5,
            min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionWarning {
    ExcessiveMappings {
        concept: String,
        count: usize,
        max: usize,
    },
    LowConfidence {
        concept: String,
        uri: String,
        score: f32,
    },
}

impl fmt::Display for SelectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionWarning::ExcessiveMappings {
                concept,
                count,
                max,
            } => write!(f, "'{concept}' has {count} mappings (more than {max})"),
            SelectionWarning::LowConfidence {
                concept,
                uri,
                score,
            } => write!(f, "'{concept}' → {uri} has low confidence ({score:.2})"),
        }
    }
}

/// Check a concept's selected alignments against `thresholds`.
pub fn validate_selection(
    concept: &str,
    selected: &[ConceptResult],
    thresholds: &ValidationThresholds,
) -> Vec<SelectionWarning> {
    let mut warnings = Vec::new();
    if selected.len() > thresholds.max_mappings {
        warnings.push(SelectionWarning::ExcessiveMappings {
            concept: concept.to_string(),
            count: selected.len(),
            max: thresholds.max_mappings,
        });
    }
    for result in selected {
        if result.confidence_score < thresholds.min_confidence {
            warnings.push(SelectionWarning::LowConfidence {
                concept: concept.to_string(),
                uri: result.uri.clone(),
                score: result.confidence_score,
            });
        }
    }
    warnings
}
