//! Configuration types for the application monitor

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    #[serde(default)]
    pub applications: Vec<ApplicationTarget>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            applications: Vec::new(),
            email: None,
            webhook: WebhookConfig::default(),
        }
    }
}

impl Config {
    /// Applications that take part in each round
    pub fn enabled_applications(&self) -> impl Iterator<Item = &ApplicationTarget> {
        self.applications.iter().filter(|app| app.enabled)
    }

    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.check_interval.is_zero() {
            return Err(crate::AppMonitorError::Config(
                "check_interval must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for app in &self.applications {
            if app.name.trim().is_empty() {
                return Err(crate::AppMonitorError::Config(
                    "application name must not be empty".to_string(),
                ));
            }
            if !seen.insert(app.name.as_str()) {
                return Err(crate::AppMonitorError::Config(format!(
                    "duplicate application name '{}'",
                    app.name
                )));
            }
            if app.enabled && app.url.trim().is_empty() {
                return Err(crate::AppMonitorError::Config(format!(
                    "application '{}' is enabled but has no url",
                    app.name
                )));
            }
        }

        Ok(())
    }
}

/// A monitored HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTarget {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_expected_code")]
    pub expected_code: u16,
}

/// SMTP settings for the email channel
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub to_email: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("from_email", &self.from_email)
            .field("to_email", &self.to_email)
            .finish()
    }
}

/// Settings for the signed webhook channel
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl WebhookConfig {
    /// Whether a webhook request would actually be sent
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.is_empty()
    }

    /// The signing secret, treating an empty string as absent
    pub fn signing_secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("enabled", &self.enabled)
            .field("url", &self.url)
            .field("signed", &self.signing_secret().is_some())
            .finish()
    }
}

fn default_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_expected_code() -> u16 {
    200
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid smtp_port '{}'", text))),
    }
}

/// Load and validate configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::AppMonitorError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content).map_err(|e| {
        crate::AppMonitorError::Config(format!("Failed to parse config file {:?}: {}", path, e))
    })?;
    config.validate()?;
    Ok(config)
}
