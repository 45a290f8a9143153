//! Ontomap error types

use std::fmt;
use std::time::Duration;

/// Ontomap error types
#[derive(Debug, thiserror::Error)]
pub enum OntomapError {
    // Transport / service errors
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("service '{service}' unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    /// Rejected by an open circuit breaker without reaching the service.
    #[error("service '{service}' unavailable: circuit breaker open")]
    CircuitOpen { service: String },

    #[error("authentication failed for '{service}'")]
    AuthenticationFailed { service: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    // Local subsystems
    /// Never aborts a lookup; the cache logs it and degrades to a miss.
    #[error("cache error: {0}")]
    Cache(String),

    /// Raised by the document parser collaborator and passed through as-is.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    // Orchestration
    #[error("operation cancelled")]
    Cancelled,

    #[error("no service configured")]
    NoService,

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("all services failed: {}", format_failures(.failures))]
    AllServicesFailed { failures: Vec<ServiceFailure> },
}

/// One service's terminal failure inside an aggregate error.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServiceFailure {
    pub service: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl ServiceFailure {
    pub fn new(service: impl Into<String>, error: &OntomapError) -> Self {
        Self {
            service: service.into(),
            kind: error.kind(),
            reason: error.to_string(),
        }
    }
}

fn format_failures(failures: &[ServiceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.service, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Flat classification of [`OntomapError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    ServiceUnavailable,
    Authentication,
    InvalidRequest,
    InvalidResponse,
    Cache,
    Parse,
    Configuration,
    Cancelled,
    Aggregate,
}

impl ErrorKind {
    /// Whether errors of this kind are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimit
                | ErrorKind::ServiceUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Authentication => "authentication",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::Cache => "cache",
            ErrorKind::Parse => "parse",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Aggregate => "aggregate",
        };
        f.write_str(s)
    }
}

impl OntomapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OntomapError::Network(_) => ErrorKind::Network,
            OntomapError::Timeout(_) => ErrorKind::Timeout,
            OntomapError::RateLimited { .. } => ErrorKind::RateLimit,
            OntomapError::ServiceUnavailable { .. } | OntomapError::CircuitOpen { .. } => {
                ErrorKind::ServiceUnavailable
            }
            OntomapError::AuthenticationFailed { .. } => ErrorKind::Authentication,
            OntomapError::InvalidRequest(_) | OntomapError::UnknownService(_) => {
                ErrorKind::InvalidRequest
            }
            OntomapError::InvalidResponse(_) | OntomapError::Json(_) => ErrorKind::InvalidResponse,
            OntomapError::Cache(_) => ErrorKind::Cache,
            OntomapError::Parse(_) => ErrorKind::Parse,
            OntomapError::Configuration(_) | OntomapError::NoService => ErrorKind::Configuration,
            OntomapError::Cancelled => ErrorKind::Cancelled,
            OntomapError::AllServicesFailed { .. } => ErrorKind::Aggregate,
        }
    }

    /// Transient failures: network, timeout, rate limit, service unavailable.
    ///
    /// Everything else (authentication, malformed requests, bad payloads,
    /// local errors) fails on first occurrence.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Server-provided backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OntomapError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(service: &str, status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => OntomapError::AuthenticationFailed {
                service: service.to_string(),
            },
            429 => OntomapError::RateLimited { retry_after },
            500..=599 => OntomapError::ServiceUnavailable {
                service: service.to_string(),
                reason: format!("HTTP {status}"),
            },
            code => OntomapError::InvalidRequest(format!("{service} returned HTTP {code}")),
        }
    }

    /// Map a transport-level reqwest failure to an error.
    pub fn from_transport(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OntomapError::Timeout(format!("{service}: {err}"))
        } else if err.is_decode() {
            OntomapError::InvalidResponse(format!("{service}: {err}"))
        } else {
            OntomapError::Network(format!("{service}: {err}"))
        }
    }

    /// Short message for end users, with a hint on what to do next.
    ///
    /// Errors without an obvious remedy fall back to their `Display` text.
    pub fn user_message(&self) -> String {
        match self {
            OntomapError::Network(_) => {
                "Network connection failed. Please check your internet connection.".to_string()
            }
            OntomapError::Timeout(_) => "Request timed out. The service is taking too long to \
                 respond. Please try again."
                .to_string(),
            OntomapError::RateLimited { retry_after } => match retry_after {
                Some(after) => format!(
                    "API rate limit exceeded. Try again in {}s.",
                    after.as_secs_f64().ceil()
                ),
                None => "API rate limit exceeded.".to_string(),
            },
            OntomapError::ServiceUnavailable { service, .. }
            | OntomapError::CircuitOpen { service } => {
                format!("{service} is temporarily unavailable. Please try again later.")
            }
            OntomapError::AuthenticationFailed { service } => format!(
                "Authentication with {service} failed. Please check your API key configuration."
            ),
            OntomapError::AllServicesFailed { failures } => format!(
                "No terminology service could answer ({}). Please try again later.",
                failures
                    .iter()
                    .map(|f| f.service.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            OntomapError::Cancelled => "Lookup cancelled.".to_string(),
            other => other.to_string(),
        }
    }

    /// Names of the failed services in an aggregate error; empty otherwise.
    pub fn failed_services(&self) -> Vec<&str> {
        match self {
            OntomapError::AllServicesFailed { failures } => {
                failures.iter().map(|f| f.service.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Result type alias for Ontomap operations
pub type Result<T> = std::result::Result<T, OntomapError>;
