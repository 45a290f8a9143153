//! Search strategies: query variants and default ontologies per concept type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::concept::normalize_text;

/// Ontologies searched for a concept type with no strategy of its own.
pub const FALLBACK_ONTOLOGIES: [&str; 3] = ["MONDO", "HP", "NCIT"];

/// How to search for one kind of concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStrategy {
    /// Query texts tried in order; each service's answers are merged.
    pub variants: Vec<String>,
    /// BioPortal acronyms used when the caller names none.
    #[serde(default)]
    pub ontologies: Vec<String>,
}

impl SearchStrategy {
    pub fn new<V, O, S, T>(variants: V, ontologies: O) -> Self
    where
        V: IntoIterator<Item = S>,
        O: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            variants: variants.into_iter().map(Into::into).collect(),
            ontologies: ontologies.into_iter().map(Into::into).collect(),
        }
    }

    /// Strategy for a concept nobody configured: its label as written and
    /// lowercased, over [`FALLBACK_ONTOLOGIES`].
    pub fn fallback(label: &str) -> Self {
        Self::new([label.to_string(), label.to_lowercase()], FALLBACK_ONTOLOGIES)
    }
}

/// Strategy table keyed by concept type (e.g. `Disease`) or concept key
/// (e.g. `long_covid`).
///
/// `Default` is the built-in table. In TOML each entry is a table:
///
/// ```toml
/// [strategies.fatigue]
/// variants = ["fatigue", "chronic fatigue", "tiredness"]
/// ontologies = ["HP", "NCIT", "SYMP"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchStrategies(BTreeMap<String, SearchStrategy>);

impl Default for SearchStrategies {
    fn default() -> Self {
        let table: [(&str, &[&str], &[&str]); 8] = [
            (
                "Disease",
                &["disease", "medical condition", "disorder"],
                &["MONDO", "HP", "DOID", "NCIT"],
            ),
            (
                "Symptom",
                &["symptom", "clinical sign", "phenotype"],
                &["HP", "NCIT", "SYMP"],
            ),
            (
                "BiologicalProcess",
                &["biological process", "physiological process"],
                &["GO", "NCIT"],
            ),
            (
                "MolecularEntity",
                &["molecular entity", "chemical entity", "biomarker"],
                &["CHEBI", "PRO", "NCIT"],
            ),
            (
                "Treatment",
                &["treatment", "therapy", "intervention"],
                &["NCIT", "DRON"],
            ),
            (
                "long_covid",
                &["long covid", "post-covid", "post covid syndrome", "covid-19 sequelae"],
                &["MONDO", "HP", "NCIT", "DOID"],
            ),
            (
                "fatigue",
                &[
                    "fatigue",
                    "chronic fatigue",
                    "tiredness",
                    "exhaustion",
                    "post-exertional malaise",
                ],
                &["HP", "NCIT", "SYMP"],
            ),
            (
                "immune_dysfunction",
                &[
                    "immune dysfunction",
                    "immune system disorder",
                    "immune response abnormality",
                ],
                &["GO", "HP", "NCIT"],
            ),
        ];
        Self(
            table
                .into_iter()
                .map(|(key, variants, ontologies)| {
                    (
                        key.to_string(),
                        SearchStrategy::new(variants.iter().copied(), ontologies.iter().copied()),
                    )
                })
                .collect(),
        )
    }
}

impl SearchStrategies {
    /// A table with no entries; every concept gets the fallback.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, strategy: SearchStrategy) {
        self.0.insert(key.into(), strategy);
    }

    /// Add or replace entries from `other`.
    pub fn extend(&mut self, other: SearchStrategies) {
        self.0.extend(other.0);
    }

    pub fn get(&self, key: &str) -> Option<&SearchStrategy> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The strategy for `key`, or [`SearchStrategy::fallback`] built from
    /// `label`.
    pub fn resolve(&self, key: &str, label: &str) -> SearchStrategy {
        self.get(key)
            .cloned()
            .unwrap_or_else(|| SearchStrategy::fallback(label))
    }
}

/// Query texts for one lookup: `variants` with blanks and repeats (after
/// normalization) removed, or just `query` when there are none.
pub fn search_terms(query: &str, variants: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let terms: Vec<String> = variants
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && seen.insert(normalize_text(v)))
        .map(str::to_string)
        .collect();
    if terms.is_empty() {
        vec![query.to_string()]
    } else {
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_concept_types_and_keys() {
        let strategies = SearchStrategies::default();
        assert_eq!(strategies.len(), 8);
        let disease = strategies.get("Disease").unwrap();
        assert_eq!(disease.variants[0], "disease");
        assert_eq!(disease.ontologies, vec!["MONDO", "HP", "DOID", "NCIT"]);
        assert_eq!(strategies.get("fatigue").unwrap().variants.len(), 5);
    }

    #[test]
    fn unknown_key_falls_back_to_label() {
        let strategy = SearchStrategies::empty().resolve("brain_fog", "Brain Fog");
        assert_eq!(strategy.variants, vec!["Brain Fog", "brain fog"]);
        assert_eq!(strategy.ontologies, vec!["MONDO", "HP", "NCIT"]);
    }

    #[test]
    fn search_terms_drop_blanks_and_repeats() {
        let variants = vec![
            "Brain Fog".to_string(),
            "brain  fog".to_string(),
            "  ".to_string(),
            "cognitive impairment".to_string(),
        ];
        assert_eq!(
            search_terms("brain fog", &variants),
            vec!["Brain Fog", "cognitive impairment"]
        );
        assert_eq!(search_terms("brain fog", &[]), vec!["brain fog"]);
    }

    #[test]
    fn strategies_parse_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            strategies: SearchStrategies,
        }
        let doc: Doc = toml::from_str(
            r#"
            [strategies.fatigue]
            variants = ["fatigue", "tiredness"]
            ontologies = ["HP"]

            [strategies.pem]
            variants = ["post-exertional malaise"]
            "#,
        )
        .unwrap();
        assert_eq!(doc.strategies.len(), 2);
        assert!(doc.strategies.get("pem").unwrap().ontologies.is_empty());
    }
}
