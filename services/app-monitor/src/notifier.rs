//! Notification events and the channel trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ApplicationTarget;

/// A decision made by the state tracker that someone should hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Alert {
        application: ApplicationTarget,
        status_code: u16,
        error: Option<String>,
        failure_count: u32,
        at: DateTime<Utc>,
    },
    Recovery {
        application: ApplicationTarget,
        at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn application(&self) -> &ApplicationTarget {
        match self {
            NotificationEvent::Alert { application, .. }
            | NotificationEvent::Recovery { application, .. } => application,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            NotificationEvent::Alert { at, .. } | NotificationEvent::Recovery { at, .. } => *at,
        }
    }

    /// Event name used on the wire and in logs
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::Alert { .. } => "application_down",
            NotificationEvent::Recovery { .. } => "application_recovery",
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, NotificationEvent::Alert { .. })
    }
}

/// What a channel did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The channel is switched off in configuration
    Skipped,
}

/// Trait for a notification delivery channel
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Channel name (e.g. "email")
    fn channel(&self) -> &str;

    /// Deliver one event; no retries
    async fn notify(&self, event: &NotificationEvent) -> crate::Result<Delivery>;
}
