//! Cache + circuit breaker + retry decorator for any [`ConceptSearch`].
//!
//! Call path for one search:
//!
//! 1. Cache lookup. A hit returns immediately with no network call.
//! 2. `breaker.call(|| with_retry(|| inner.search()))`. The breaker gates
//!    the whole retry cycle, so an open circuit costs no backoff.
//! 3. On success the results are de-duplicated, cached, and the health
//!    registry is told. On failure the health registry is told too, except
//!    for circuit rejections and cancellation, which never reached the
//!    service.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::circuit::CircuitBreaker;
use super::context::ResilienceContext;
use super::health::HealthRegistry;
use super::retry::{RetryConfig, with_retry};
use super::traits::ConceptSearch;
use crate::cache::CacheManager;
use crate::telemetry;
use crate::types::{ConceptResult, SearchRequest, dedup_results};
use crate::{OntomapError, Result};

/// Decorator that wraps a [`ConceptSearch`] with the resilience stack of a
/// [`ResilienceContext`].
pub struct ResilientClient {
    inner: Arc<dyn ConceptSearch>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthRegistry>,
    cache: Option<Arc<CacheManager>>,
    retry: RetryConfig,
}

impl ResilientClient {
    /// Wrap `inner`, sharing the context's breaker for `inner.name()`.
    pub fn new(inner: Arc<dyn ConceptSearch>, context: &ResilienceContext) -> Self {
        let breaker = context.breaker_for(inner.name());
        Self {
            breaker,
            health: Arc::clone(context.health()),
            cache: context.cache().cloned(),
            retry: context.retry_config().clone(),
            inner,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Search, giving up with [`OntomapError::Cancelled`] once `cancel`
    /// fires (checked before each attempt and during every backoff).
    #[instrument(
        name = "resilient_search",
        skip_all,
        fields(service = %self.inner.name(), query = %request.query)
    )]
    pub async fn search_cancellable(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConceptResult>> {
        let service = self.inner.name();

        let cached = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(&request.query, &request.ontologies, service));
        if let Some(mut cached) = cached {
            cached.truncate(request.max_results);
            debug!(count = cached.len(), "served from cache");
            return Ok(cached);
        }

        let start = Instant::now();
        let result = self
            .breaker
            .call(|| {
                with_retry(&self.retry, service, cancel, || self.inner.search(request))
            })
            .await;
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "service" => service.to_owned(),
        )
        .record(start.elapsed().as_secs_f64());

        match result {
            Ok(results) => {
                let results = dedup_results(results);
                if let Some(cache) = &self.cache {
                    cache.set(&request.query, &request.ontologies, service, results.clone());
                }
                self.health.report_outcome(service, true);
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "service" => service.to_owned(),
                    "status" => "ok",
                )
                .increment(1);
                Ok(results)
            }
            Err(e) => {
                if !matches!(e, OntomapError::CircuitOpen { .. } | OntomapError::Cancelled) {
                    self.health.report_outcome(service, false);
                }
                metrics::counter!(telemetry::REQUESTS_TOTAL,
                    "service" => service.to_owned(),
                    "status" => "error",
                )
                .increment(1);
                warn!(error = %e, kind = %e.kind(), "search failed");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ConceptSearch for ResilientClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<ConceptResult>> {
        self.search_cancellable(request, &CancellationToken::new())
            .await
    }
}
