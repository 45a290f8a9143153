//! Service trait for terminology search backends.
//!
//! Every backend (BioPortal, OLS, test doubles) implements [`ConceptSearch`].
//! Resilience is layered on by decoration rather than baked into each
//! client: [`ResilientClient`](super::ResilientClient) wraps any
//! `ConceptSearch` with cache, circuit breaker, and retry, and is itself a
//! `ConceptSearch`.
//!
//! # Error contract
//!
//! Implementations map transport failures onto the retryable kinds
//! (`Network`, `Timeout`, `RateLimited`, `ServiceUnavailable`) and everything
//! a retry cannot fix onto the rest (`AuthenticationFailed`,
//! `InvalidRequest`, `InvalidResponse`). The decorators rely on that split.

use async_trait::async_trait;

use crate::Result;
use crate::types::{ConceptResult, SearchRequest};

/// A terminology service that can be searched for concepts.
#[async_trait]
pub trait ConceptSearch: Send + Sync {
    /// Service name for logging, health tracking, and cache keys
    /// (e.g. `"bioportal"`).
    fn name(&self) -> &str;

    /// Search for concepts matching `request.query`.
    ///
    /// Returns at most `request.max_results` normalized results.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<ConceptResult>>;
}
