//! Terminology service clients and the resilience layer around them.
//!
//! - [`ConceptSearch`]: the one trait every backend implements.
//! - [`BioPortalClient`], [`OlsClient`]: HTTP clients for the two services.
//! - [`ResilientClient`]: decorator adding cache, circuit breaker, retry,
//!   and health reporting to any `ConceptSearch`.
//! - [`ResilienceContext`]: owns the shared breakers, health registry, and
//!   cache that `ResilientClient`s are built from.

pub mod bioportal;
mod circuit;
mod context;
mod health;
mod http;
pub mod ols;
mod resilient;
mod retry;
mod traits;

pub use bioportal::BioPortalClient;
pub use circuit::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use context::ResilienceContext;
pub use health::{HealthRegistry, HealthReport, HealthSummary, ServiceHealthRecord};
pub use http::DEFAULT_REQUEST_TIMEOUT;
pub use ols::{OlsClient, OntologyMap, default_ontology_map};
pub use resilient::ResilientClient;
pub use retry::{RetryConfig, with_retry};
pub use traits::ConceptSearch;
