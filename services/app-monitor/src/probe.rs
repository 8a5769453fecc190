//! Probe trait, outcome types, and the HTTP probe

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ApplicationTarget;
use crate::io::HttpClient;

/// Upper bound on a single health check
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalized result of one health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy(u16),
    UnexpectedStatus { got: u16, expected: u16 },
    TransportFailure(String),
}

impl ProbeOutcome {
    /// Classify a received status code against the expected one
    pub fn from_status(got: u16, expected: u16) -> Self {
        if got == expected {
            ProbeOutcome::Healthy(got)
        } else {
            ProbeOutcome::UnexpectedStatus { got, expected }
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy(_))
    }

    /// Status code to report, 0 when no response was received
    pub fn status_code(&self) -> u16 {
        match self {
            ProbeOutcome::Healthy(code) => *code,
            ProbeOutcome::UnexpectedStatus { got, .. } => *got,
            ProbeOutcome::TransportFailure(_) => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProbeOutcome::TransportFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Healthy(code) => write!(f, "healthy (status {})", code),
            ProbeOutcome::UnexpectedStatus { got, expected } => {
                write!(f, "unexpected status {} (expected {})", got, expected)
            }
            ProbeOutcome::TransportFailure(err) => write!(f, "connection failed: {}", err),
        }
    }
}

/// Trait for checking one application's health
#[async_trait]
pub trait Probe: Send + Sync + std::fmt::Debug {
    /// Perform a single check; never retries
    async fn check(&self, target: &ApplicationTarget) -> ProbeOutcome;
}

/// Probe that issues one GET against the target URL
pub struct HttpProbe {
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, target: &ApplicationTarget) -> ProbeOutcome {
        tracing::debug!("Checking {} at {}", target.name, target.url);

        // Only the status decides health; the client discards the body.
        match tokio::time::timeout(self.timeout, self.http.get(&target.url)).await {
            Ok(Ok(response)) => ProbeOutcome::from_status(response.status, target.expected_code),
            Ok(Err(e)) => ProbeOutcome::TransportFailure(e.to_string()),
            Err(_) => ProbeOutcome::TransportFailure(format!(
                "GET {} timed out after {:?}",
                target.url, self.timeout
            )),
        }
    }
}
