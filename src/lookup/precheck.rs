//! Optional connectivity probe run before the first service call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::{OntomapError, Result};

/// TCP connect probe. A successful probe is remembered for the lifetime of
/// the checker; a failed one is retried on the next call.
#[derive(Debug)]
pub struct NetworkCheck {
    host: String,
    port: u16,
    timeout: Duration,
    passed: AtomicBool,
}

impl Default for NetworkCheck {
    fn default() -> Self {
        Self::new("8.8.8.8", 53, Duration::from_secs(3))
    }
}

impl NetworkCheck {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            passed: AtomicBool::new(false),
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Probe unless an earlier probe already succeeded.
    pub async fn ensure(&self) -> Result<()> {
        if self.passed.load(Ordering::Acquire) {
            return Ok(());
        }
        let target = self.target();
        match tokio::time::timeout(self.timeout, TcpStream::connect(target.as_str())).await {
            Ok(Ok(_)) => {
                self.passed.store(true, Ordering::Release);
                debug!(target = %target, "network pre-check passed");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(target = %target, error = %e, "network pre-check failed");
                Err(OntomapError::Network(format!(
                    "no network connectivity ({target}): {e}"
                )))
            }
            Err(_) => {
                warn!(target = %target, "network pre-check timed out");
                Err(OntomapError::Network(format!(
                    "no network connectivity ({target}): timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let check = NetworkCheck::new("127.0.0.1", port, Duration::from_secs(1));
        check.ensure().await.unwrap();
        drop(listener);
        // Remembered; no second connect.
        check.ensure().await.unwrap();
    }

    #[tokio::test]
    async fn fails_when_nothing_listens() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let check = NetworkCheck::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(matches!(check.ensure().await, Err(OntomapError::Network(_))));
    }
}
