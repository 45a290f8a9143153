//! Content-addressed cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::normalize_text;

/// Deterministic key for one (query, ontology set, service) triple.
///
/// The query is lowercased, trimmed, and whitespace-collapsed; ontology
/// codes are trimmed, upper-cased, de-duplicated, and sorted; the service
/// name is lowercased. The canonical string is hashed with BLAKE3 so the
/// key is stable across processes and safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<S: AsRef<str>>(query: &str, ontologies: &[S], service: &str) -> Self {
        let canonical = canonical_form(query, ontologies, service);
        Self(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical_form<S: AsRef<str>>(query: &str, ontologies: &[S], service: &str) -> String {
    let mut codes: Vec<String> = ontologies
        .iter()
        .map(|o| o.as_ref().trim().to_uppercase())
        .filter(|o| !o.is_empty())
        .collect();
    codes.sort_unstable();
    codes.dedup();
    format!(
        "{}|{}|{}",
        normalize_text(query),
        codes.join(","),
        service.trim().to_lowercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: &[&str] = &[];

    #[test]
    fn key_ignores_case_and_whitespace() {
        let k1 = CacheKey::new("Long COVID", &["MONDO"], "bioportal");
        let k2 = CacheKey::new("  long   covid ", &["mondo"], "BioPortal");
        assert_eq!(k1, k2);
    }

    #[test]
    fn key_ignores_ontology_order_and_duplicates() {
        let k1 = CacheKey::new("fatigue", &["HP", "NCIT"], "ols");
        let k2 = CacheKey::new("fatigue", &["ncit", " hp", "HP"], "ols");
        assert_eq!(k1, k2);
    }

    #[test]
    fn key_differs_on_service() {
        let k1 = CacheKey::new("fatigue", NONE, "ols");
        let k2 = CacheKey::new("fatigue", NONE, "bioportal");
        assert_ne!(k1, k2);
    }

    #[test]
    fn key_differs_on_ontologies() {
        let k1 = CacheKey::new("fatigue", &["HP"], "ols");
        let k2 = CacheKey::new("fatigue", NONE, "ols");
        assert_ne!(k1, k2);
    }

    #[test]
    fn key_is_hex_file_safe() {
        let key = CacheKey::new("a/b\\c", NONE, "ols");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
