//! HTTP plumbing shared by the service clients.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::{OntomapError, Result};

/// Per-request deadline used when a client is built without one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("ontomap/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| OntomapError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Map a non-success response onto the error taxonomy.
pub(crate) fn check_status(service: &str, response: &Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    Err(OntomapError::from_status(service, status.as_u16(), retry_after))
}
