//! Per-application alert state and the alert/recovery decisions made from it

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::ApplicationTarget;
use crate::notifier::{Delivery, NotificationEvent, Notifier};
use crate::probe::ProbeOutcome;

/// Consecutive failures required before an alert goes out
pub const ALERT_THRESHOLD: u32 = 2;

/// Where an application stands in its current failure episode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlertState {
    #[default]
    Healthy,
    /// Failing, below the alert threshold
    Degraded { failures: u32 },
    /// An alert was attempted for this episode; failures keep counting
    Alerted { failures: u32 },
}

/// Notification decision produced by one state step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Quiet,
    Alert { failure_count: u32 },
    Recover,
}

impl AlertState {
    /// Apply one check result
    pub fn advance(self, healthy: bool) -> (AlertState, Transition) {
        if healthy {
            let transition = match self {
                AlertState::Alerted { .. } => Transition::Recover,
                _ => Transition::Quiet,
            };
            return (AlertState::Healthy, transition);
        }

        match self {
            AlertState::Alerted { failures } => (
                AlertState::Alerted {
                    failures: failures.saturating_add(1),
                },
                Transition::Quiet,
            ),
            AlertState::Healthy | AlertState::Degraded { .. } => {
                let failures = self.consecutive_failures().saturating_add(1);
                if failures >= ALERT_THRESHOLD {
                    (
                        AlertState::Alerted { failures },
                        Transition::Alert {
                            failure_count: failures,
                        },
                    )
                } else {
                    (AlertState::Degraded { failures }, Transition::Quiet)
                }
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match self {
            AlertState::Healthy => 0,
            AlertState::Degraded { failures } | AlertState::Alerted { failures } => *failures,
        }
    }

    pub fn alert_sent(&self) -> bool {
        matches!(self, AlertState::Alerted { .. })
    }
}

/// Owns every application's alert state and drives notifications from it.
///
/// A single lock covers the state update and the notification attempt, so
/// deliveries are serialized process-wide.
#[derive(Debug)]
pub struct StateTracker {
    states: Mutex<HashMap<String, AlertState>>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl StateTracker {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            notifiers,
        }
    }

    /// Feed one probe result for `target`, notifying if it crosses a boundary.
    ///
    /// Returns the event that was dispatched, if any.
    pub async fn record(
        &self,
        target: &ApplicationTarget,
        outcome: &ProbeOutcome,
    ) -> Option<NotificationEvent> {
        let mut states = self.states.lock().await;
        let previous = states.get(&target.name).copied().unwrap_or_default();
        let (next, transition) = previous.advance(outcome.is_healthy());

        tracing::debug!(
            "State '{}': {:?} -> {:?} ({:?})",
            target.name,
            previous,
            next,
            transition
        );

        let event = match transition {
            Transition::Quiet => None,
            Transition::Alert { failure_count } => Some(NotificationEvent::Alert {
                application: target.clone(),
                status_code: outcome.status_code(),
                error: outcome.error().map(str::to_string),
                failure_count,
                at: Utc::now(),
            }),
            Transition::Recover => Some(NotificationEvent::Recovery {
                application: target.clone(),
                at: Utc::now(),
            }),
        };

        if let Some(event) = &event {
            self.dispatch(event).await;
        }

        // Records are created on the first failure and kept once they exist.
        if next != AlertState::Healthy || states.contains_key(&target.name) {
            states.insert(target.name.clone(), next);
        }

        event
    }

    /// Current state for an application, if it has ever failed
    pub async fn state_of(&self, name: &str) -> Option<AlertState> {
        self.states.lock().await.get(name).copied()
    }

    async fn dispatch(&self, event: &NotificationEvent) {
        let name = &event.application().name;
        for notifier in &self.notifiers {
            match notifier.notify(event).await {
                Ok(Delivery::Sent) => {
                    tracing::info!(
                        "{} '{}' sent via {}",
                        event.kind(),
                        name,
                        notifier.channel()
                    );
                }
                Ok(Delivery::Skipped) => {
                    tracing::debug!("{} channel disabled, skipped '{}'", notifier.channel(), name);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to send {} for '{}' via {}: {}",
                        event.kind(),
                        name,
                        notifier.channel(),
                        e
                    );
                }
            }
        }
    }
}
