//! Signed webhook notification channel

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::WebhookConfig;
use crate::io::HttpClient;
use crate::notifier::{Delivery, NotificationEvent, Notifier};

pub const SIGNATURE_HEADER: &str = "X-AppMonitor-Signature";
pub const USER_AGENT: &str = "AppMonitor/1.0";

/// JSON body posted to the webhook endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub application: String,
    pub url: String,
    pub timestamp: i64,
    pub status_code: u16,
    pub expected_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub failure_count: u32,
}

impl From<&NotificationEvent> for WebhookPayload {
    fn from(event: &NotificationEvent) -> Self {
        let application = event.application();
        let (status_code, error, failure_count) = match event {
            NotificationEvent::Alert {
                status_code,
                error,
                failure_count,
                ..
            } => (*status_code, error.clone(), *failure_count),
            // A healthy check means the expected code came back.
            NotificationEvent::Recovery { .. } => (application.expected_code, None, 0),
        };

        Self {
            event: event.kind().to_string(),
            application: application.name.clone(),
            url: application.url.clone(),
            timestamp: event.at().timestamp(),
            status_code,
            expected_code: application.expected_code,
            error,
            failure_count,
        }
    }
}

fn mac_for(secret: &str) -> crate::Result<Hmac<Sha256>> {
    Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| crate::AppMonitorError::Webhook(format!("Invalid signing key: {}", e)))
}

/// Compute the `sha256=<hex>` signature of a raw body
pub fn sign(secret: &str, body: &[u8]) -> crate::Result<String> {
    let mut mac = mac_for(secret)?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a received signature header against a raw body
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = mac_for(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&digest).is_ok()
}

/// Posts signed JSON payloads to the configured endpoint
pub struct WebhookNotifier {
    config: WebhookConfig,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("config", &self.config)
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!(
            "Created WebhookNotifier (enabled={}, url='{}')",
            config.enabled,
            config.url
        );
        Self {
            config: config.clone(),
            http,
        }
    }

    /// Serialize an event to the exact bytes that get signed and sent
    pub fn encode(event: &NotificationEvent) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&WebhookPayload::from(event))?)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &NotificationEvent) -> crate::Result<Delivery> {
        if !self.config.is_active() {
            return Ok(Delivery::Skipped);
        }

        let body = Self::encode(event)?;
        let signature = self
            .config
            .signing_secret()
            .map(|secret| sign(secret, &body))
            .transpose()?;

        let mut headers = vec![("User-Agent", USER_AGENT)];
        if let Some(signature) = &signature {
            headers.push((SIGNATURE_HEADER, signature.as_str()));
        }

        tracing::debug!(
            "Posting {} webhook for '{}' (signed={})",
            event.kind(),
            event.application().name,
            signature.is_some()
        );

        let response = self
            .http
            .post_json(&self.config.url, &body, &headers)
            .await
            .map_err(|e| crate::AppMonitorError::Webhook(e.to_string()))?;

        if !response.is_success() {
            return Err(crate::AppMonitorError::Webhook(format!(
                "endpoint returned status {}",
                response.status
            )));
        }

        Ok(Delivery::Sent)
    }
}
