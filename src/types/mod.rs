//! Public types for the Ontomap API.

mod alignment;
mod comparison;
mod concept;
mod lookup;
mod strategy;

pub use alignment::{
    AlignmentPredicate, SelectionWarning, ValidationThresholds, suggest_predicate,
    validate_selection,
};
pub use comparison::{Comparison, ConceptGroup, Discrepancy, ServiceMatch};
pub use concept::{
    ConceptResult, DEFAULT_MAX_RESULTS, SearchRequest, dedup_results, normalize_text,
    score_confidence,
};
pub use lookup::{DegradationNotice, DegradationReason, LookupOptions, LookupOutcome};
pub use strategy::{FALLBACK_ONTOLOGIES, SearchStrategies, SearchStrategy, search_terms};
