//! Ontomap - resilient concept lookup against BioPortal and OLS
//!
//! This crate looks biomedical concepts up in two terminology services,
//! compares what they return, and keeps working when one of them is slow,
//! rate limited, or down. Every service call goes through a result cache, a
//! per-service circuit breaker, and a retry loop with exponential backoff;
//! a health registry tracks which services are currently usable.
//!
//! # Example
//!
//! ```rust,no_run
//! use ontomap::{CacheConfig, ConceptLookup, LookupOptions};
//!
//! #[tokio::main]
//! async fn main() -> ontomap::Result<()> {
//!     let lookup = ConceptLookup::builder()
//!         .bioportal("your-bioportal-key")
//!         .ols()
//!         .cache(CacheConfig::new())
//!         .build()?;
//!
//!     let outcome = lookup
//!         .lookup("long covid", &[], &LookupOptions::default().ontologies(["MONDO"]))
//!         .await?;
//!
//!     for notice in &outcome.notices {
//!         eprintln!("{notice}");
//!     }
//!     for result in &outcome.combined {
//!         println!("{} {} ({})", result.ontology_code, result.label, result.uri);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`ConceptLookup::from_config`] builds a lookup from a TOML [`Config`]
//! and [`Secrets`]; see the [`config`] module for file locations and
//! environment overrides.

pub mod cache;
pub mod config;
pub mod error;
pub mod lookup;
pub mod services;
pub mod telemetry;
pub mod types;

pub use cache::{CacheConfig, CacheKey, CacheManager, CacheStats};
pub use config::{Config, Secrets};
pub use error::{ErrorKind, OntomapError, Result, ServiceFailure};
pub use lookup::{ConceptLookup, ConceptLookupBuilder, NetworkCheck, compare_results};
pub use services::{
    BioPortalClient, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    ConceptSearch, HealthRegistry, HealthReport, OlsClient, ResilienceContext, ResilientClient,
    RetryConfig, ServiceHealthRecord, with_retry,
};
pub use types::{
    AlignmentPredicate, Comparison, ConceptGroup, ConceptResult, DegradationNotice,
    DegradationReason, Discrepancy, LookupOptions, LookupOutcome, SearchRequest,
    SearchStrategies, SearchStrategy, SelectionWarning, ServiceMatch, ValidationThresholds,
    suggest_predicate, validate_selection,
};

/// Crate version, for user agents and `--version` output.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
