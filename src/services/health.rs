//! Service health tracking.
//!
//! [`HealthRegistry`] holds one [`ServiceHealthRecord`] per registered
//! service, combining reported call outcomes with the live state of the
//! service's circuit breaker. Records are keyed independently and each has
//! its own lock, so reports for different services never contend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, info};

use super::circuit::{BreakerSnapshot, CircuitBreaker, CircuitState};
use crate::{OntomapError, Result};

/// Health of one service at the time of the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealthRecord {
    pub service_name: String,
    pub available: bool,
    /// Manually enabled/disabled via [`HealthRegistry::disable_service`].
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerSnapshot>,
    pub last_success: Option<SystemTime>,
    pub last_failure: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub available: usize,
    pub unavailable: usize,
}

/// Snapshot of every registered service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub generated_at: SystemTime,
    pub services: BTreeMap<String, ServiceHealthRecord>,
    pub summary: HealthSummary,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.summary.unavailable == 0
    }
}

#[derive(Default)]
struct Outcomes {
    enabled: bool,
    consecutive_failures: u32,
    total_successes: u64,
    total_failures: u64,
    last_success: Option<SystemTime>,
    last_failure: Option<SystemTime>,
}

struct ServiceEntry {
    breaker: Option<Arc<CircuitBreaker>>,
    outcomes: Mutex<Outcomes>,
}

impl ServiceEntry {
    fn outcomes(&self) -> MutexGuard<'_, Outcomes> {
        self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_available(&self) -> bool {
        // HALF_OPEN counts as available so the probe call can happen.
        self.outcomes().enabled
            && self
                .breaker
                .as_ref()
                .is_none_or(|b| b.state() != CircuitState::Open)
    }

    fn record(&self, name: &str) -> ServiceHealthRecord {
        let available = self.is_available();
        let outcomes = self.outcomes();
        ServiceHealthRecord {
            service_name: name.to_string(),
            available,
            enabled: outcomes.enabled,
            consecutive_failures: outcomes.consecutive_failures,
            total_successes: outcomes.total_successes,
            total_failures: outcomes.total_failures,
            circuit_breaker: self.breaker.as_ref().map(|b| b.snapshot()),
            last_success: outcomes.last_success,
            last_failure: outcomes.last_failure,
        }
    }
}

/// Tracks availability of every configured service.
///
/// Constructed explicitly and shared through
/// [`ResilienceContext`](super::ResilienceContext); there is no global
/// instance.
#[derive(Default)]
pub struct HealthRegistry {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, optionally tied to its circuit breaker.
    ///
    /// Re-registering replaces the breaker but keeps recorded outcomes.
    pub fn register(&self, service: &str, breaker: Option<Arc<CircuitBreaker>>) {
        let mut services = self.write();
        let outcomes = services
            .remove(service)
            .map(|old| std::mem::take(&mut *old.outcomes()))
            .unwrap_or(Outcomes {
                enabled: true,
                ..Outcomes::default()
            });
        services.insert(
            service.to_string(),
            Arc::new(ServiceEntry {
                breaker,
                outcomes: Mutex::new(outcomes),
            }),
        );
        debug!(service, "service registered with health registry");
    }

    /// Record the outcome of one call. Unknown services are registered on
    /// first report.
    pub fn report_outcome(&self, service: &str, success: bool) {
        let entry = match self.entry(service) {
            Some(entry) => entry,
            None => {
                self.register(service, None);
                match self.entry(service) {
                    Some(entry) => entry,
                    None => return,
                }
            }
        };
        let mut outcomes = entry.outcomes();
        let now = SystemTime::now();
        if success {
            outcomes.consecutive_failures = 0;
            outcomes.total_successes += 1;
            outcomes.last_success = Some(now);
        } else {
            outcomes.consecutive_failures = outcomes.consecutive_failures.saturating_add(1);
            outcomes.total_failures += 1;
            outcomes.last_failure = Some(now);
        }
    }

    /// False for unknown or disabled services and while the breaker is OPEN.
    pub fn is_available(&self, service: &str) -> bool {
        self.entry(service).is_some_and(|e| e.is_available())
    }

    /// Names of available services, sorted.
    pub fn available_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_available())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn registered_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn record(&self, service: &str) -> Option<ServiceHealthRecord> {
        self.entry(service).map(|e| e.record(service))
    }

    pub fn health_report(&self) -> HealthReport {
        let entries: Vec<(String, Arc<ServiceEntry>)> = self
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        let services: BTreeMap<String, ServiceHealthRecord> = entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.record(name)))
            .collect();
        let available = services.values().filter(|r| r.available).count();
        HealthReport {
            generated_at: SystemTime::now(),
            summary: HealthSummary {
                total: services.len(),
                available,
                unavailable: services.len() - available,
            },
            services,
        }
    }

    pub fn enable_service(&self, service: &str) -> Result<()> {
        self.set_enabled(service, true)
    }

    /// Mark a service unavailable regardless of its breaker.
    pub fn disable_service(&self, service: &str) -> Result<()> {
        self.set_enabled(service, false)
    }

    /// Clear failure counts and reset the breaker. The enabled flag is kept.
    pub fn reset_service(&self, service: &str) -> Result<()> {
        let entry = self
            .entry(service)
            .ok_or_else(|| OntomapError::UnknownService(service.to_string()))?;
        {
            let mut outcomes = entry.outcomes();
            outcomes.consecutive_failures = 0;
        }
        if let Some(breaker) = &entry.breaker {
            breaker.reset();
        }
        info!(service, "service health reset");
        Ok(())
    }

    fn set_enabled(&self, service: &str, enabled: bool) -> Result<()> {
        let entry = self
            .entry(service)
            .ok_or_else(|| OntomapError::UnknownService(service.to_string()))?;
        entry.outcomes().enabled = enabled;
        info!(service, enabled, "service availability changed manually");
        Ok(())
    }

    fn entry(&self, service: &str) -> Option<Arc<ServiceEntry>> {
        self.read().get(service).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ServiceEntry>>> {
        self.services.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ServiceEntry>>> {
        self.services.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("services", &self.registered_services())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::CircuitBreakerConfig;

    #[test]
    fn unknown_service_is_unavailable() {
        let registry = HealthRegistry::new();
        assert!(!registry.is_available("bioportal"));
        assert!(registry.disable_service("bioportal").is_err());
    }

    #[test]
    fn outcomes_update_record() {
        let registry = HealthRegistry::new();
        registry.register("ols", None);
        registry.report_outcome("ols", false);
        registry.report_outcome("ols", false);
        let record = registry.record("ols").unwrap();
        assert_eq!(record.consecutive_failures, 2);
        assert!(record.last_failure.is_some());

        registry.report_outcome("ols", true);
        let record = registry.record("ols").unwrap();
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.total_failures, 2);
        assert_eq!(record.total_successes, 1);
        assert!(record.available);
    }

    #[test]
    fn disable_and_enable() {
        let registry = HealthRegistry::new();
        registry.register("ols", None);
        registry.register("bioportal", None);
        registry.disable_service("ols").unwrap();
        assert_eq!(registry.available_services(), vec!["bioportal".to_string()]);
        let report = registry.health_report();
        assert_eq!(report.summary.unavailable, 1);
        assert!(!report.is_healthy());

        registry.enable_service("ols").unwrap();
        assert!(registry.is_available("ols"));
    }

    #[test]
    fn reregister_keeps_outcomes() {
        let registry = HealthRegistry::new();
        registry.report_outcome("ols", true);
        let breaker = Arc::new(CircuitBreaker::new("ols", CircuitBreakerConfig::default()));
        registry.register("ols", Some(breaker));
        let record = registry.record("ols").unwrap();
        assert_eq!(record.total_successes, 1);
        assert!(record.circuit_breaker.is_some());
    }
}
