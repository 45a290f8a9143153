//! Shared resilience state for one process (or one test).
//!
//! A [`ResilienceContext`] owns the health registry, the optional result
//! cache, and one circuit breaker per service name. Clients built from the
//! same context share all three; clients built from different contexts
//! share nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::circuit::{CircuitBreaker, CircuitBreakerConfig};
use super::health::HealthRegistry;
use super::retry::RetryConfig;
use crate::cache::CacheManager;

pub struct ResilienceContext {
    health: Arc<HealthRegistry>,
    cache: Option<Arc<CacheManager>>,
    retry: RetryConfig,
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for ResilienceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceContext {
    /// Default retry and breaker settings, no cache.
    pub fn new() -> Self {
        Self {
            health: Arc::new(HealthRegistry::new()),
            cache: None,
            retry: RetryConfig::default(),
            breaker_config: CircuitBreakerConfig::default(),
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Breaker settings for breakers created after this call.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn health(&self) -> &Arc<HealthRegistry> {
        &self.health
    }

    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.cache.as_ref()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// The breaker for `service`, created (and registered with the health
    /// registry) on first use. Later calls return the same instance.
    pub fn breaker_for(&self, service: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = breakers.get(service) {
            return Arc::clone(existing);
        }
        let breaker = Arc::new(CircuitBreaker::new(service, self.breaker_config.clone()));
        breakers.insert(service.to_string(), Arc::clone(&breaker));
        drop(breakers);
        self.health.register(service, Some(Arc::clone(&breaker)));
        breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_breaker_per_service() {
        let ctx = ResilienceContext::new();
        let a = ctx.breaker_for("ols");
        let b = ctx.breaker_for("ols");
        let c = ctx.breaker_for("bioportal");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(ctx.health().is_available("ols"));
    }
}
