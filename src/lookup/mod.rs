//! Multi-service concept lookup.
//!
//! [`ConceptLookup`] fans one query out to every requested service that the
//! health registry reports available, waits for all of them, and merges the
//! answers into a [`LookupOutcome`].
//!
//! # Query variants
//!
//! With [`LookupOptions::variants`] set, each service searches every variant
//! in turn and its answers are merged, first occurrence of each concept
//! kept. Services still run concurrently. [`ConceptLookup::lookup_concept`]
//! fills variants and ontologies from the [`SearchStrategies`] table.
//!
//! # Degradation
//!
//! A service that is unavailable (circuit open, manually disabled), not
//! configured, or fails terminally contributes a [`DegradationNotice`]
//! instead of results. A service answers if any of its variants did. The
//! lookup only fails as a whole when no service produced results, with one
//! [`OntomapError::AllServicesFailed`] naming every service that was asked.
//! Cancellation always returns immediately. An authentication failure is
//! returned as-is only when that service was the one requested.

mod builder;
mod compare;
mod precheck;

pub use builder::{ConceptLookupBuilder, DEFAULT_LONG_REQUEST_TIMEOUT};
pub use compare::compare_results;
pub use precheck::NetworkCheck;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheManager, CacheStats};
use crate::config::{Config, Secrets};
use crate::error::ServiceFailure;
use crate::services::{
    ConceptSearch, HealthRegistry, HealthReport, ResilienceContext, ResilientClient,
};
use crate::telemetry;
use crate::types::{
    ConceptResult, DegradationNotice, DegradationReason, LookupOptions, LookupOutcome,
    SearchRequest, SearchStrategies, SelectionWarning, ValidationThresholds, dedup_results,
    search_terms, validate_selection,
};
use crate::{OntomapError, Result};

/// Concept lookup across the configured terminology services.
pub struct ConceptLookup {
    context: ResilienceContext,
    clients: Vec<ResilientClient>,
    long_request_timeout: Duration,
    network_check: Option<NetworkCheck>,
    validation: ValidationThresholds,
    strategies: SearchStrategies,
}

impl ConceptLookup {
    pub fn builder() -> ConceptLookupBuilder {
        ConceptLookupBuilder::new()
    }

    pub(crate) fn new(
        context: ResilienceContext,
        clients: Vec<ResilientClient>,
        long_request_timeout: Duration,
        network_check: Option<NetworkCheck>,
        validation: ValidationThresholds,
        strategies: SearchStrategies,
    ) -> Self {
        Self {
            context,
            clients,
            long_request_timeout,
            network_check,
            validation,
            strategies,
        }
    }

    /// Wire services, resilience settings, and cache from configuration.
    ///
    /// BioPortal is only registered when enabled and an API key is
    /// available; OLS needs no key.
    pub fn from_config(config: &Config, secrets: &Secrets) -> Result<Self> {
        let mut builder = Self::builder()
            .retry(config.retry_config())
            .circuit_breaker(config.circuit_breaker_config())
            .request_timeout(config.request_timeout())
            .long_request_timeout(config.long_request_timeout())
            .validation(config.validation)
            .strategies(config.search_strategies());

        if config.services.bioportal.enabled {
            match secrets.bioportal_api_key() {
                Some(key) => {
                    builder = builder.bioportal_at(key, config.services.bioportal.base_url.clone());
                }
                None => warn!("BioPortal enabled but no API key found; skipping it"),
            }
        }
        if config.services.ols.enabled {
            builder = builder.ols_at(
                config.services.ols.base_url.clone(),
                config.services.ols.ontology_map.clone(),
            );
        }
        if let Some(cache) = config.cache_config() {
            builder = builder.cache(cache);
        }
        if let Some(check) = config.network_check() {
            builder = builder.network_check(check);
        }
        builder.build()
    }

    /// Names of the configured services, in query order.
    pub fn services(&self) -> Vec<&str> {
        self.clients.iter().map(|c| c.name()).collect()
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        self.context.health()
    }

    pub fn health_report(&self) -> HealthReport {
        self.context.health().health_report()
    }

    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.context.cache()
    }

    /// `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.context.cache().map(|c| c.stats())
    }

    /// Drop every cached entry. Returns how many were removed.
    pub fn clear_cache(&self) -> usize {
        self.context.cache().map_or(0, |c| c.clear())
    }

    /// Check a selection against the configured thresholds.
    pub fn validate_selection(
        &self,
        concept: &str,
        selected: &[ConceptResult],
    ) -> Vec<SelectionWarning> {
        validate_selection(concept, selected, &self.validation)
    }

    pub fn strategies(&self) -> &SearchStrategies {
        &self.strategies
    }

    /// `options` completed from the strategy for `key`: its variants, and
    /// its ontologies when `options` names none.
    pub fn strategy_options(
        &self,
        key: &str,
        label: &str,
        options: &LookupOptions,
    ) -> LookupOptions {
        let strategy = self.strategies.resolve(key, label);
        let mut options = options.clone();
        if options.ontologies.is_empty() {
            options.ontologies = strategy.ontologies;
        }
        if options.variants.is_empty() {
            options.variants = strategy.variants;
        }
        options
    }

    /// Look a concept up under its search strategy.
    ///
    /// `key` picks the strategy (concept type or concept key); `label` is
    /// what results are compared against and the fallback query text.
    pub async fn lookup_concept(
        &self,
        key: &str,
        label: &str,
        services: &[&str],
        options: &LookupOptions,
    ) -> Result<LookupOutcome> {
        let options = self.strategy_options(key, label, options);
        self.lookup(label, services, &options).await
    }

    /// Look `query` up in `services` (all configured services when empty).
    pub async fn lookup(
        &self,
        query: &str,
        services: &[&str],
        options: &LookupOptions,
    ) -> Result<LookupOutcome> {
        self.lookup_cancellable(query, services, options, &CancellationToken::new())
            .await
    }

    /// Like [`lookup`](Self::lookup), returning [`OntomapError::Cancelled`]
    /// once `cancel` fires. In-flight requests are dropped and backoff
    /// sleeps are interrupted.
    #[instrument(skip(self, options, cancel), fields(max_results = options.max_results))]
    pub async fn lookup_cancellable(
        &self,
        query: &str,
        services: &[&str],
        options: &LookupOptions,
        cancel: &CancellationToken,
    ) -> Result<LookupOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(OntomapError::InvalidRequest("query is empty".to_string()));
        }
        if cancel.is_cancelled() {
            return Err(OntomapError::Cancelled);
        }

        if let Some(check) = &self.network_check {
            tokio::select! {
                _ = cancel.cancelled() => return Err(OntomapError::Cancelled),
                result = check.ensure() => result?,
            }
        }

        let requested = self.requested_services(services);
        let health = self.context.health();
        let mut notices = Vec::new();
        let mut failures = Vec::new();
        let mut runnable: Vec<&ResilientClient> = Vec::new();

        for name in &requested {
            match self.clients.iter().find(|c| c.name() == name.as_str()) {
                None => {
                    let err = OntomapError::UnknownService(name.clone());
                    failures.push(ServiceFailure::new(name.as_str(), &err));
                    notices.push(DegradationNotice::new(
                        name.as_str(),
                        DegradationReason::NotConfigured,
                    ));
                }
                Some(_) if !health.is_available(name) => {
                    let err = OntomapError::ServiceUnavailable {
                        service: name.clone(),
                        reason: "marked unavailable by health registry".to_string(),
                    };
                    failures.push(ServiceFailure::new(name.as_str(), &err));
                    notices.push(DegradationNotice::new(
                        name.as_str(),
                        DegradationReason::Unavailable,
                    ));
                }
                Some(client) => runnable.push(client),
            }
        }

        if runnable.is_empty() {
            return Err(self.all_failed(query, failures, &notices));
        }

        let terms = search_terms(query, &options.variants);
        if terms.len() > 1 {
            info!(variants = terms.len(), "searching query variants");
        }

        let calls = runnable.iter().map(|client| {
            let terms = &terms;
            async move {
                let outcome = self.search_variants(client, terms, options, cancel).await;
                (client.name(), outcome)
            }
        });

        let outcomes = tokio::select! {
            _ = cancel.cancelled() => return Err(OntomapError::Cancelled),
            outcomes = join_all(calls) => outcomes,
        };

        let sole_service = requested.len() == 1;
        let mut answered: Vec<(String, Vec<ConceptResult>)> = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(results) => answered.push((name.to_string(), results)),
                Err(OntomapError::Cancelled) => return Err(OntomapError::Cancelled),
                Err(e @ OntomapError::AuthenticationFailed { .. }) if sole_service => {
                    return Err(e);
                }
                Err(e) => {
                    failures.push(ServiceFailure::new(name, &e));
                    notices.push(DegradationNotice::new(
                        name,
                        DegradationReason::Failed {
                            kind: e.kind(),
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }

        if answered.is_empty() {
            return Err(self.all_failed(query, failures, &notices));
        }

        for notice in &notices {
            metrics::counter!(telemetry::DEGRADED_LOOKUPS_TOTAL,
                "service" => notice.service.clone(),
            )
            .increment(1);
            warn!(service = %notice.service, notice = %notice, "lookup degraded");
        }

        let combined = combine(&answered, options.max_results);
        let comparison = compare_results(query, &answered);
        info!(
            answered = answered.len(),
            degraded = notices.len(),
            combined = combined.len(),
            "lookup complete"
        );

        Ok(LookupOutcome {
            query: query.to_string(),
            results: answered.into_iter().collect::<BTreeMap<_, _>>(),
            combined,
            comparison,
            notices,
        })
    }

    /// Run every term against one service, in order, and merge the answers.
    ///
    /// The service has answered if any term succeeded. Authentication
    /// failures and an open circuit stop the remaining terms, since they
    /// would fail the same way.
    async fn search_variants(
        &self,
        client: &ResilientClient,
        terms: &[String],
        options: &LookupOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConceptResult>> {
        let mut merged = Vec::new();
        let mut answered = false;
        let mut last_error = None;
        for term in terms {
            let request = SearchRequest::new(term.as_str())
                .ontologies(options.ontologies.iter().cloned())
                .max_results(options.max_results);
            match self.search_within_deadline(client, &request, cancel).await {
                Ok(results) => {
                    answered = true;
                    merged.extend(results);
                }
                Err(OntomapError::Cancelled) => return Err(OntomapError::Cancelled),
                Err(e) => {
                    let stop = matches!(
                        e,
                        OntomapError::AuthenticationFailed { .. }
                            | OntomapError::CircuitOpen { .. }
                    );
                    if terms.len() > 1 {
                        debug!(service = client.name(), term = %term, error = %e, "variant failed");
                    }
                    last_error = Some(e);
                    if stop {
                        break;
                    }
                }
            }
        }
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(dedup_results(merged)),
        }
    }

    /// One search bounded by the long-request timeout. Expiry counts as a
    /// health failure.
    async fn search_within_deadline(
        &self,
        client: &ResilientClient,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConceptResult>> {
        match tokio::time::timeout(
            self.long_request_timeout,
            client.search_cancellable(request, cancel),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                self.context.health().report_outcome(client.name(), false);
                Err(OntomapError::Timeout(format!(
                    "{} did not finish within {:?}",
                    client.name(),
                    self.long_request_timeout
                )))
            }
        }
    }

    /// Deduplicated requested names, or every configured service.
    fn requested_services(&self, services: &[&str]) -> Vec<String> {
        if services.is_empty() {
            return self.clients.iter().map(|c| c.name().to_string()).collect();
        }
        let mut seen = HashSet::new();
        services
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect()
    }

    fn all_failed(
        &self,
        query: &str,
        failures: Vec<ServiceFailure>,
        notices: &[DegradationNotice],
    ) -> OntomapError {
        for notice in notices {
            metrics::counter!(telemetry::DEGRADED_LOOKUPS_TOTAL,
                "service" => notice.service.clone(),
            )
            .increment(1);
        }
        let err = OntomapError::AllServicesFailed { failures };
        warn!(query, error = %err, "lookup failed on every service");
        err
    }
}

/// Results in service order, first occurrence of each URI kept, capped at
/// `max_results` per answering service.
fn combine(answered: &[(String, Vec<ConceptResult>)], max_results: usize) -> Vec<ConceptResult> {
    let mut seen = HashSet::new();
    let mut combined: Vec<ConceptResult> = answered
        .iter()
        .flat_map(|(_, results)| results.iter())
        .filter(|r| seen.insert(r.uri.clone()))
        .cloned()
        .collect();
    combined.truncate(max_results.saturating_mul(answered.len()));
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_dedups_by_uri_and_caps() {
        let answered = vec![
            (
                "bioportal".to_string(),
                vec![
                    ConceptResult::new("A", "http://x/1", "MONDO", "bioportal"),
                    ConceptResult::new("B", "http://x/2", "MONDO", "bioportal"),
                ],
            ),
            (
                "ols".to_string(),
                vec![
                    ConceptResult::new("A", "http://x/1", "MONDO", "ols"),
                    ConceptResult::new("C", "http://x/3", "HP", "ols"),
                ],
            ),
        ];
        let combined = combine(&answered, 5);
        let uris: Vec<_> = combined.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["http://x/1", "http://x/2", "http://x/3"]);
        assert_eq!(combined[0].source_service, "bioportal");

        assert_eq!(combine(&answered, 1).len(), 2);
    }
}
