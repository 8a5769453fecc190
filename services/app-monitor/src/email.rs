//! Email notification channel over authenticated SMTP

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::notifier::{Delivery, NotificationEvent, Notifier};

/// Port on which SMTP servers expect TLS from the first byte
const SMTPS_PORT: u16 = 465;

/// A rendered message ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Abstraction over mail submission for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> crate::Result<()>;
}

/// Production mailer using lettre's async SMTP transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> crate::Result<Self> {
        let builder = if config.smtp_port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host).map_err(|e| {
                crate::AppMonitorError::Config(format!(
                    "Invalid SMTP host '{}': {}",
                    config.smtp_host, e
                ))
            })?
        } else {
            // STARTTLS when the server offers it, plain otherwise (local relays).
            let tls = TlsParameters::new(config.smtp_host.clone()).map_err(|e| {
                crate::AppMonitorError::Config(format!(
                    "Invalid SMTP host '{}': {}",
                    config.smtp_host, e
                ))
            })?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .tls(Tls::Opportunistic(tls))
        };

        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        tracing::debug!(
            "Created SMTP mailer for {}:{}",
            config.smtp_host,
            config.smtp_port
        );
        Ok(Self { transport })
    }
}

fn parse_mailbox(address: &str) -> crate::Result<Mailbox> {
    address.parse().map_err(|e| {
        crate::AppMonitorError::Email(format!("Invalid address '{}': {}", address, e))
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> crate::Result<()> {
        let message = Message::builder()
            .from(parse_mailbox(&email.from)?)
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| crate::AppMonitorError::Email(format!("Building message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| crate::AppMonitorError::Email(format!("SMTP submission: {}", e)))?;
        Ok(())
    }
}

/// Sends alert and recovery emails to a single recipient
pub struct EmailNotifier {
    from: String,
    to: String,
    mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("to", &self.to)
            .finish()
    }
}

impl EmailNotifier {
    pub fn new(config: &EmailConfig, mailer: Arc<dyn Mailer>) -> Self {
        tracing::debug!("Created EmailNotifier for '{}'", config.to_email);
        Self {
            from: config.from_email.clone(),
            to: config.to_email.clone(),
            mailer,
        }
    }

    /// Render the subject and body for an event
    pub fn render(&self, event: &NotificationEvent) -> OutgoingEmail {
        let (subject, body) = render_message(event);
        OutgoingEmail {
            from: self.from.clone(),
            to: self.to.clone(),
            subject,
            body,
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        "email"
    }

    async fn notify(&self, event: &NotificationEvent) -> crate::Result<Delivery> {
        let email = self.render(event);
        tracing::debug!("Sending email to '{}': {}", email.to, email.subject);
        self.mailer.send(&email).await?;
        Ok(Delivery::Sent)
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn render_message(event: &NotificationEvent) -> (String, String) {
    match event {
        NotificationEvent::Alert {
            application,
            status_code,
            error,
            failure_count,
            at,
        } => {
            let subject = format!("ALERT: {} is DOWN", application.name);
            let status_lines = match error {
                Some(error) => format!("Status: Connection Failed\nError: {}", error),
                None => format!(
                    "Expected Status: {}\nActual Status: {}",
                    application.expected_code, status_code
                ),
            };
            let body = format!(
                "Service Alert - {name}\n\n\
                 Application: {name}\n\
                 URL: {url}\n\
                 {status_lines}\n\
                 Time: {time}\n\
                 Failed Attempts: {failure_count}\n\n\
                 Please investigate immediately.\n",
                name = application.name,
                url = application.url,
                time = format_time(*at),
            );
            (subject, body)
        }
        NotificationEvent::Recovery { application, at } => {
            let subject = format!("RECOVERY: {} is back online", application.name);
            let body = format!(
                "Service Recovery - {name}\n\n\
                 Application: {name}\n\
                 URL: {url}\n\
                 Status: OK\n\
                 Time: {time}\n\n\
                 Service has recovered and is responding normally.\n",
                name = application.name,
                url = application.url,
                time = format_time(*at),
            );
            (subject, body)
        }
    }
}
