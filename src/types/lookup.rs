//! Lookup options and outcomes

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::comparison::Comparison;
use super::concept::{ConceptResult, DEFAULT_MAX_RESULTS};
use crate::error::ErrorKind;

/// Options for a multi-service concept lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupOptions {
    /// Ontology acronyms to restrict the search to; empty means all.
    #[serde(default)]
    pub ontologies: Vec<String>,
    /// Results requested from each service, per query variant.
    pub max_results: usize,
    /// Query texts to search instead of the lookup query; each service's
    /// answers across them are merged. Empty means the query alone.
    #[serde(default)]
    pub variants: Vec<String>,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            ontologies: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            variants: Vec::new(),
        }
    }
}

impl LookupOptions {
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

    pub fn variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of a lookup across the enabled services.
///
/// Partial success is normal: a service that was skipped or failed shows up
/// in `notices` instead of `results`.
#[derive(Debug, Clone, Serialize)]
pub struct LookupOutcome {
    pub query: String,
    /// Results per service that answered, keyed by service name.
    pub results: BTreeMap<String, Vec<ConceptResult>>,
    /// All results de-duplicated by URI, in service registration order.
    pub combined: Vec<ConceptResult>,
    pub comparison: Comparison,
    pub notices: Vec<DegradationNotice>,
}

impl LookupOutcome {
    /// Whether any requested service was skipped or failed.
    pub fn is_degraded(&self) -> bool {
        !self.notices.is_empty()
    }

    /// Names of services that were skipped or failed.
    pub fn degraded_services(&self) -> Vec<&str> {
        self.notices.iter().map(|n| n.service.as_str()).collect()
    }
}

/// Why a service contributed nothing to a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DegradationReason {
    /// Health registry reported the service unavailable (circuit open or
    /// manually disabled); it was not called.
    Unavailable,
    /// The service was called and failed terminally.
    Failed { kind: ErrorKind, message: String },
    /// The caller asked for a service this lookup has no client for.
    NotConfigured,
}

/// Notice that a lookup proceeded without one of its services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradationNotice {
    pub service: String,
    #[serde(flatten)]
    pub reason: DegradationReason,
}

impl DegradationNotice {
    pub fn new(service: impl Into<String>, reason: DegradationReason) -> Self {
        Self {
            service: service.into(),
            reason,
        }
    }
}

impl fmt::Display for DegradationNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            DegradationReason::Unavailable => {
                write!(f, "{} is currently unavailable; skipped", self.service)
            }
            DegradationReason::Failed { message, .. } => {
                write!(f, "{} failed: {message}", self.service)
            }
            DegradationReason::NotConfigured => {
                write!(f, "{} is not configured; skipped", self.service)
            }
        }
    }
}
