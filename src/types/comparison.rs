//! Cross-service comparison report types

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// How the services' answers for one query line up.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Comparison {
    pub concept: String,
    /// Result count per answering service.
    pub counts: BTreeMap<String, usize>,
    /// Results grouped by normalized label, sorted by label.
    pub groups: Vec<ConceptGroup>,
    pub discrepancies: Vec<Discrepancy>,
}

impl Comparison {
    /// Groups found by more than one service.
    pub fn common(&self) -> impl Iterator<Item = &ConceptGroup> {
        self.groups.iter().filter(|g| g.service_count() > 1)
    }

    /// Groups found only by `service`.
    pub fn only_in<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a ConceptGroup> {
        self.groups
            .iter()
            .filter(move |g| g.service_count() == 1 && g.matches[0].service == service)
    }
}

/// One concept (by normalized label) and where each service placed it.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptGroup {
    /// Label as first reported.
    pub label: String,
    pub normalized_label: String,
    pub matches: Vec<ServiceMatch>,
    /// True when every match carries the same URI.
    pub uri_match: bool,
}

impl ConceptGroup {
    /// Number of distinct services in this group.
    pub fn service_count(&self) -> usize {
        let mut services: Vec<&str> = self.matches.iter().map(|m| m.service.as_str()).collect();
        services.sort_unstable();
        services.dedup();
        services.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceMatch {
    pub service: String,
    pub uri: String,
    pub ontology_code: String,
}

/// Something the caller should look at before trusting the merged results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Services returned different numbers of results.
    CountMismatch { counts: BTreeMap<String, usize> },
    /// The same concept label was mapped to different URIs.
    UriMismatch {
        label: String,
        uris: Vec<(String, String)>,
    },
    /// Only one service found this concept.
    SingleSource { label: String, service: String },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::CountMismatch { counts } => {
                let parts: Vec<String> = counts.iter().map(|(s, n)| format!("{s}={n}")).collect();
                write!(f, "result count differs: {}", parts.join(", "))
            }
            Discrepancy::UriMismatch { label, uris } => {
                let parts: Vec<String> = uris.iter().map(|(s, u)| format!("{s}: {u}")).collect();
                write!(f, "'{label}' has different URIs ({})", parts.join("; "))
            }
            Discrepancy::SingleSource { label, service } => {
                write!(f, "'{label}' found only by {service}")
            }
        }
    }
}
