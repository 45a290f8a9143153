//! Builder for configuring [`ConceptLookup`] instances.

use std::sync::Arc;
use std::time::Duration;

use super::{ConceptLookup, NetworkCheck};
use crate::cache::{CacheConfig, CacheManager};
use crate::services::{
    BioPortalClient, CircuitBreakerConfig, ConceptSearch, DEFAULT_REQUEST_TIMEOUT, OlsClient,
    OntologyMap, ResilienceContext, ResilientClient, RetryConfig, bioportal, default_ontology_map,
    ols,
};
use crate::types::{SearchStrategies, ValidationThresholds};
use crate::{OntomapError, Result};

/// Default bound on one service's whole call cycle inside a lookup.
pub const DEFAULT_LONG_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

enum ServiceSource {
    BioPortal { api_key: String, base_url: String },
    Ols { base_url: String, ontology_map: OntologyMap },
    Custom(Arc<dyn ConceptSearch>),
}

/// Builder for [`ConceptLookup`].
///
/// Services are queried and reported in the order they are added.
///
/// ```rust,no_run
/// # use ontomap::ConceptLookup;
/// # fn main() -> ontomap::Result<()> {
/// let lookup = ConceptLookup::builder()
///     .bioportal("my-api-key")
///     .ols()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConceptLookupBuilder {
    services: Vec<ServiceSource>,
    retry: RetryConfig,
    circuit_breaker: CircuitBreakerConfig,
    cache: Option<CacheSource>,
    request_timeout: Duration,
    long_request_timeout: Duration,
    network_check: Option<NetworkCheck>,
    validation: ValidationThresholds,
    strategies: SearchStrategies,
}

enum CacheSource {
    Config(CacheConfig),
    Shared(Arc<CacheManager>),
}

impl ConceptLookupBuilder {
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            long_request_timeout: DEFAULT_LONG_REQUEST_TIMEOUT,
            network_check: None,
            validation: ValidationThresholds::default(),
            strategies: SearchStrategies::default(),
        }
    }

    /// Add BioPortal at its public endpoint.
    pub fn bioportal(self, api_key: impl Into<String>) -> Self {
        self.bioportal_at(api_key, bioportal::DEFAULT_BASE_URL)
    }

    /// Add BioPortal at a custom base URL.
    pub fn bioportal_at(mut self, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.services.push(ServiceSource::BioPortal {
            api_key: api_key.into(),
            base_url: base_url.into(),
        });
        self
    }

    /// Add OLS at its public endpoint with the default ontology map.
    pub fn ols(self) -> Self {
        self.ols_at(ols::DEFAULT_BASE_URL, default_ontology_map())
    }

    pub fn ols_at(mut self, base_url: impl Into<String>, ontology_map: OntologyMap) -> Self {
        self.services.push(ServiceSource::Ols {
            base_url: base_url.into(),
            ontology_map,
        });
        self
    }

    /// Add any [`ConceptSearch`] implementation. It gets the same
    /// resilience wrapping as the built-in clients.
    pub fn service(mut self, service: Arc<dyn ConceptSearch>) -> Self {
        self.services.push(ServiceSource::Custom(service));
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Enable result caching with its own [`CacheManager`].
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(CacheSource::Config(config));
        self
    }

    /// Use an existing cache, e.g. one shared with another lookup.
    pub fn shared_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(CacheSource::Shared(cache));
        self
    }

    /// Per-HTTP-request deadline for the built-in clients (default: 30s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound on one service's whole cycle, retries included (default: 120s).
    pub fn long_request_timeout(mut self, timeout: Duration) -> Self {
        self.long_request_timeout = timeout;
        self
    }

    /// Probe connectivity before the first service call.
    pub fn network_check(mut self, check: NetworkCheck) -> Self {
        self.network_check = Some(check);
        self
    }

    pub fn validation(mut self, thresholds: ValidationThresholds) -> Self {
        self.validation = thresholds;
        self
    }

    /// Strategy table for [`ConceptLookup::lookup_concept`] (default: the
    /// built-in table).
    pub fn strategies(mut self, strategies: SearchStrategies) -> Self {
        self.strategies = strategies;
        self
    }

    /// Build the lookup.
    ///
    /// Fails with [`OntomapError::NoService`] if no service was added and
    /// with a configuration error if two services share a name.
    pub fn build(self) -> Result<ConceptLookup> {
        if self.services.is_empty() {
            return Err(OntomapError::NoService);
        }

        let mut context = ResilienceContext::new()
            .with_retry(self.retry)
            .with_circuit_breaker(self.circuit_breaker);
        match self.cache {
            Some(CacheSource::Config(config)) => {
                context = context.with_cache(Arc::new(CacheManager::new(config)));
            }
            Some(CacheSource::Shared(cache)) => context = context.with_cache(cache),
            None => {}
        }

        let mut clients: Vec<ResilientClient> = Vec::with_capacity(self.services.len());
        for source in self.services {
            let inner: Arc<dyn ConceptSearch> = match source {
                ServiceSource::BioPortal { api_key, base_url } => Arc::new(
                    BioPortalClient::with_options(api_key, base_url, self.request_timeout)?,
                ),
                ServiceSource::Ols {
                    base_url,
                    ontology_map,
                } => Arc::new(OlsClient::with_options(
                    base_url,
                    self.request_timeout,
                    ontology_map,
                )?),
                ServiceSource::Custom(service) => service,
            };
            if clients.iter().any(|c| c.name() == inner.name()) {
                return Err(OntomapError::Configuration(format!(
                    "service '{}' registered twice",
                    inner.name()
                )));
            }
            clients.push(ResilientClient::new(inner, &context));
        }

        Ok(ConceptLookup::new(
            context,
            clients,
            self.long_request_timeout,
            self.network_check,
            self.validation,
            self.strategies,
        ))
    }
}

impl Default for ConceptLookupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
