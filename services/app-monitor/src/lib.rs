//! App Monitor - HTTP application health monitor
//!
//! Probes configured applications on a fixed interval, tracks consecutive
//! failures, and sends email and signed webhook notifications when an
//! application goes down or recovers.

pub mod config;
pub mod email;
pub mod engine;
pub mod error;
pub mod io;
pub mod notifier;
pub mod probe;
pub mod tracker;
pub mod webhook;

pub use config::{load_config, Config};
pub use error::{AppMonitorError, Result};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::email::{EmailNotifier, Mailer, SmtpMailer};
use crate::engine::Engine;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::notifier::{NotificationEvent, Notifier};
use crate::probe::{HttpProbe, Probe, PROBE_TIMEOUT};
use crate::tracker::StateTracker;
use crate::webhook::WebhookNotifier;

/// Assembles an [`AppMonitor`] from configuration, with optional overrides
pub struct AppMonitorBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    mailer: Option<Arc<dyn Mailer>>,
    probe: Option<Arc<dyn Probe>>,
    notifiers: Option<Vec<Arc<dyn Notifier>>>,
    cancel: Option<CancellationToken>,
}

impl AppMonitorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            mailer: None,
            probe: None,
            notifiers: None,
            cancel: None,
        }
    }

    /// HTTP client shared by the probe and the webhook channel
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Mail submission used by the email channel
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace the channels built from configuration
    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = Some(notifiers);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn build(self) -> Result<AppMonitor> {
        self.config.validate()?;

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::with_timeout(PROBE_TIMEOUT)?),
        };

        let notifiers = match self.notifiers {
            Some(notifiers) => notifiers,
            None => build_notifiers(&self.config, self.mailer, &http)?,
        };

        let probe: Arc<dyn Probe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpProbe::new(Arc::clone(&http))),
        };
        let tracker = Arc::new(StateTracker::new(notifiers));
        let cancel = self.cancel.unwrap_or_default();

        let engine = Engine::new(
            self.config.enabled_applications().cloned().collect(),
            probe,
            Arc::clone(&tracker),
            self.config.check_interval,
            cancel.clone(),
        );

        Ok(AppMonitor {
            config: self.config,
            engine,
            tracker,
            cancel,
        })
    }
}

fn build_notifiers(
    config: &Config,
    mailer: Option<Arc<dyn Mailer>>,
    http: &Arc<dyn HttpClient>,
) -> Result<Vec<Arc<dyn Notifier>>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    match &config.email {
        Some(email) => {
            let mailer: Arc<dyn Mailer> = match mailer {
                Some(mailer) => mailer,
                None => Arc::new(SmtpMailer::new(email)?),
            };
            notifiers.push(Arc::new(EmailNotifier::new(email, mailer)));
        }
        None => tracing::warn!("No email section configured, email alerts are disabled"),
    }

    notifiers.push(Arc::new(WebhookNotifier::new(
        &config.webhook,
        Arc::clone(http),
    )));

    Ok(notifiers)
}

/// A fully assembled monitor, ready to start
#[derive(Debug)]
pub struct AppMonitor {
    config: Config,
    engine: Engine,
    tracker: Arc<StateTracker>,
    cancel: CancellationToken,
}

impl AppMonitor {
    pub fn tracker(&self) -> &Arc<StateTracker> {
        &self.tracker
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run a single round outside the timer loop
    pub async fn run_round(&self) -> Vec<NotificationEvent> {
        self.engine.run_round().await
    }

    /// Run check rounds until the cancellation token fires
    pub async fn start(self) -> Result<()> {
        tracing::info!(
            "Starting app monitor with {} enabled applications",
            self.engine.targets().len()
        );
        tracing::info!(
            "Check interval: {}",
            humantime::format_duration(self.config.check_interval)
        );
        match &self.config.email {
            Some(email) => tracing::info!("Alert email: {}", email.to_email),
            None => tracing::info!("Alert email: disabled"),
        }
        if self.config.webhook.is_active() {
            tracing::info!("Webhook notifications: enabled ({})", self.config.webhook.url);
        } else {
            tracing::info!("Webhook notifications: disabled");
        }

        self.engine.run().await;

        tracing::info!("App monitor stopped");
        Ok(())
    }
}
