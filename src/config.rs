//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. explicit path (`--config <path>`)
//! 2. `~/.ontomap/config.toml` (user)
//! 3. `/etc/ontomap/config.toml` (system)
//! 4. built-in defaults
//!
//! Environment variables then override individual values (see
//! [`Config::apply_env_overrides`]).
//!
//! Secrets are loaded separately with a permission check:
//! 1. `~/.ontomap/secrets.toml` (user, must be 0600 or 0400)
//! 2. `BIOPORTAL_API_KEY` environment variable

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::CacheConfig;
use crate::lookup::NetworkCheck;
use crate::services::{CircuitBreakerConfig, OntologyMap, RetryConfig, bioportal, ols};
use crate::types::{SearchStrategies, ValidationThresholds};
use crate::{OntomapError, Result};

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub services: ServicesConfig,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub timeouts: TimeoutSettings,
    pub cache: CacheSettings,
    pub network_check: NetworkCheckSettings,
    pub validation: ValidationThresholds,
    /// Entries added to, or replacing, the built-in strategy table.
    pub strategies: SearchStrategies,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub bioportal: BioPortalSettings,
    pub ols: OlsSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BioPortalSettings {
    pub enabled: bool,
    pub base_url: String,
}

impl Default for BioPortalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: bioportal::DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OlsSettings {
    pub enabled: bool,
    pub base_url: String,
    /// BioPortal acronym → OLS ontology id.
    pub ontology_map: OntologyMap,
}

impl Default for OlsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: ols::DEFAULT_BASE_URL.to_string(),
            ontology_map: ols::default_ontology_map(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay_secs: 1.0,
            max_delay_secs: 60.0,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: f64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Deadline for one HTTP request.
    pub request_secs: f64,
    /// Deadline for one service's whole cycle within a lookup.
    pub long_request_secs: f64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request_secs: 30.0,
            long_request_secs: 120.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// 0 = never expire.
    pub ttl_secs: u64,
    pub persistent: bool,
    /// Default: `~/.ontology_mapper_cache`.
    pub dir: Option<PathBuf>,
    /// 0 = unbounded.
    pub max_size_mb: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 86_400,
            persistent: true,
            dir: None,
            max_size_mb: 100,
        }
    }
}

impl CacheSettings {
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ontology_mapper_cache")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkCheckSettings {
    pub enabled: bool,
    pub timeout_secs: f64,
    pub host: String,
    pub port: u16,
}

impl Default for NetworkCheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 3.0,
            host: "8.8.8.8".to_string(),
            port: 53,
        }
    }
}

impl Config {
    /// Load from the standard locations, then apply environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                debug!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            OntomapError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            OntomapError::Configuration(msg) => {
                OntomapError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| OntomapError::Configuration(format!("Failed to parse config: {e}")))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(OntomapError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".ontomap").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/ontomap/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparsable values are logged
    /// and leave the current value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides { lookup: &lookup };

        env.flag("ERROR_RETRY_ENABLED", &mut self.retry.enabled);
        env.parse("ERROR_MAX_RETRIES", &mut self.retry.max_retries);
        env.parse("ERROR_INITIAL_DELAY", &mut self.retry.initial_delay_secs);
        env.parse("ERROR_MAX_DELAY", &mut self.retry.max_delay_secs);
        env.parse("ERROR_EXPONENTIAL_BASE", &mut self.retry.exponential_base);
        env.flag("ERROR_RETRY_JITTER", &mut self.retry.jitter);

        env.flag("ERROR_CIRCUIT_BREAKER_ENABLED", &mut self.circuit_breaker.enabled);
        env.parse(
            "ERROR_CIRCUIT_BREAKER_THRESHOLD",
            &mut self.circuit_breaker.failure_threshold,
        );
        env.parse(
            "ERROR_CIRCUIT_BREAKER_TIMEOUT",
            &mut self.circuit_breaker.recovery_timeout_secs,
        );

        env.parse("ERROR_REQUEST_TIMEOUT", &mut self.timeouts.request_secs);
        env.parse("ERROR_LONG_REQUEST_TIMEOUT", &mut self.timeouts.long_request_secs);

        env.flag("ERROR_NETWORK_CHECK_ENABLED", &mut self.network_check.enabled);
        env.parse("ERROR_NETWORK_CHECK_TIMEOUT", &mut self.network_check.timeout_secs);

        env.flag("CACHE_ENABLED", &mut self.cache.enabled);
        env.parse("CACHE_TTL", &mut self.cache.ttl_secs);
        env.flag("CACHE_PERSISTENT", &mut self.cache.persistent);
        if let Some(dir) = lookup("CACHE_DIR").filter(|d| !d.trim().is_empty()) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        env.parse("CACHE_MAX_SIZE_MB", &mut self.cache.max_size_mb);
    }

    // ------------------------------------------------------------------------
    // Conversions into runtime settings
    // ------------------------------------------------------------------------

    pub fn retry_config(&self) -> RetryConfig {
        if !self.retry.enabled {
            return RetryConfig::disabled();
        }
        RetryConfig::new()
            .max_retries(self.retry.max_retries)
            .initial_delay(secs(self.retry.initial_delay_secs))
            .max_delay(secs(self.retry.max_delay_secs))
            .exponential_base(self.retry.exponential_base)
            .jitter(self.retry.jitter)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        if !self.circuit_breaker.enabled {
            return CircuitBreakerConfig::disabled();
        }
        CircuitBreakerConfig::new()
            .failure_threshold(self.circuit_breaker.failure_threshold)
            .recovery_timeout(secs(self.circuit_breaker.recovery_timeout_secs))
    }

    /// `None` when caching is disabled.
    pub fn cache_config(&self) -> Option<CacheConfig> {
        if !self.cache.enabled {
            return None;
        }
        let mut config = CacheConfig::new()
            .ttl(Duration::from_secs(self.cache.ttl_secs))
            .max_size_bytes(self.cache.max_size_mb.saturating_mul(1024 * 1024));
        if self.cache.persistent {
            if let Some(dir) = self.cache.resolved_dir() {
                config = config.persist_to(dir);
            }
        }
        Some(config)
    }

    /// `None` when the pre-check is disabled.
    pub fn network_check(&self) -> Option<NetworkCheck> {
        self.network_check.enabled.then(|| {
            NetworkCheck::new(
                self.network_check.host.clone(),
                self.network_check.port,
                secs(self.network_check.timeout_secs),
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.timeouts.request_secs)
    }

    pub fn long_request_timeout(&self) -> Duration {
        secs(self.timeouts.long_request_secs)
    }

    /// Built-in strategies with the configured entries layered on top.
    pub fn search_strategies(&self) -> SearchStrategies {
        let mut strategies = SearchStrategies::default();
        strategies.extend(self.strategies.clone());
        strategies
    }
}

/// Non-finite or negative values clamp to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

struct Overrides<'a, F> {
    lookup: &'a F,
}

impl<F> Overrides<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: FromStr>(&self, key: &str, target: &mut T) {
        if let Some(raw) = (self.lookup)(key) {
            match raw.trim().parse() {
                Ok(value) => *target = value,
                Err(_) => warn!(key, value = %raw, "ignoring unparsable override"),
            }
        }
    }

    fn flag(&self, key: &str, target: &mut bool) {
        if let Some(raw) = (self.lookup)(key) {
            match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => *target = true,
                "false" | "0" | "no" | "off" => *target = false,
                _ => warn!(key, value = %raw, "ignoring unparsable override"),
            }
        }
    }
}

/// Secrets (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub bioportal: Option<ApiKeySecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

const BIOPORTAL_ENV_VAR: &str = "BIOPORTAL_API_KEY";

/// Placeholder shipped in example env files; never a real key.
const PLACEHOLDER_KEY: &str = "your_api_key_here";

impl Secrets {
    /// Load `~/.ontomap/secrets.toml` if present. Returns empty secrets if
    /// no file exists (keys may come from the environment).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".ontomap").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }
        Ok(Secrets::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            OntomapError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            OntomapError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            OntomapError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(OntomapError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// BioPortal key from the secrets file, falling back to the environment.
    pub fn bioportal_api_key(&self) -> Option<String> {
        self.bioportal_api_key_with(|key| std::env::var(key).ok())
    }

    pub fn bioportal_api_key_with<F>(&self, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.bioportal
            .as_ref()
            .map(|s| s.api_key.clone())
            .or_else(|| env(BIOPORTAL_ENV_VAR))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && k != PLACEHOLDER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let config = Config::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.timeouts.long_request_secs, 120.0);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert_eq!(config.cache.max_size_mb, 100);
        assert_eq!(config.network_check.port, 53);
        assert_eq!(config.validation.max_mappings, 5);
        assert_eq!(config.services.ols.ontology_map["PRO"], "pr");
    }

    #[test]
    fn parse_partial_config_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [retry]
            max_retries = 1

            [services.ols]
            enabled = false

            [validation]
            min_confidence = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_secs, 1.0);
        assert!(!config.services.ols.enabled);
        assert!(config.services.bioportal.enabled);
        assert_eq!(config.validation.min_confidence, 0.7);
        assert_eq!(config.validation.max_mappings, 5);
    }

    #[test]
    fn configured_strategies_layer_over_builtin() {
        assert_eq!(Config::default().search_strategies(), SearchStrategies::default());

        let config = Config::from_toml(
            r#"
            [strategies.fatigue]
            variants = ["fatigue", "tiredness"]
            ontologies = ["HP"]

            [strategies.brain_fog]
            variants = ["brain fog", "cognitive dysfunction"]
            "#,
        )
        .unwrap();
        let strategies = config.search_strategies();
        assert_eq!(strategies.get("fatigue").unwrap().variants.len(), 2);
        assert!(strategies.get("brain_fog").is_some());
        assert!(strategies.get("Disease").is_some());
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        assert!(matches!(
            Config::from_toml("[retry\nmax_retries = 1"),
            Err(OntomapError::Configuration(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ERROR_MAX_RETRIES", "7"),
            ("ERROR_RETRY_JITTER", "off"),
            ("ERROR_CIRCUIT_BREAKER_TIMEOUT", "2.5"),
            ("CACHE_ENABLED", "no"),
            ("CACHE_DIR", "/tmp/ontomap-cache"),
            ("ERROR_INITIAL_DELAY", "soon"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.retry.max_retries, 7);
        assert!(!config.retry.jitter);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 2.5);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/ontomap-cache")));
        // unparsable value keeps the default
        assert_eq!(config.retry.initial_delay_secs, 1.0);
        assert!(config.cache_config().is_none());
    }

    #[test]
    fn disabled_sections_convert() {
        let mut config = Config::default();
        config.retry.enabled = false;
        config.circuit_breaker.enabled = false;
        config.network_check.enabled = false;
        assert_eq!(config.retry_config().max_retries, 0);
        assert_eq!(config.circuit_breaker_config().failure_threshold, u32::MAX);
        assert!(config.network_check().is_none());
    }

    #[test]
    fn cache_config_respects_persistence() {
        let mut config = Config::default();
        config.cache.dir = Some(PathBuf::from("/tmp/x"));
        let cache = config.cache_config().unwrap();
        assert_eq!(cache.persist_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(cache.max_size_bytes, 100 * 1024 * 1024);

        config.cache.persistent = false;
        assert!(config.cache_config().unwrap().persist_dir.is_none());
    }

    #[test]
    fn negative_durations_clamp_to_zero() {
        let mut config = Config::default();
        config.timeouts.request_secs = -1.0;
        assert_eq!(config.request_timeout(), Duration::ZERO);
    }

    #[test]
    fn bioportal_key_resolution() {
        let secrets: Secrets = toml::from_str(
            r#"
            [bioportal]
            api_key = "from-file"
            "#,
        )
        .unwrap();
        assert_eq!(
            secrets.bioportal_api_key_with(|_| Some("from-env".into())),
            Some("from-file".to_string())
        );

        let empty = Secrets::default();
        assert_eq!(
            empty.bioportal_api_key_with(|_| Some("from-env".into())),
            Some("from-env".to_string())
        );
        assert_eq!(
            empty.bioportal_api_key_with(|_| Some("your_api_key_here".into())),
            None
        );
        assert_eq!(empty.bioportal_api_key_with(|_| None), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let err = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
