//! Engine: runs check rounds on a fixed interval

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ApplicationTarget;
use crate::notifier::NotificationEvent;
use crate::probe::Probe;
use crate::tracker::StateTracker;

/// The engine fans probes out per round and feeds results to the tracker
#[derive(Debug)]
pub struct Engine {
    targets: Vec<ApplicationTarget>,
    probe: Arc<dyn Probe>,
    tracker: Arc<StateTracker>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Engine {
    /// Every target given here is probed each round.
    pub fn new(
        targets: Vec<ApplicationTarget>,
        probe: Arc<dyn Probe>,
        tracker: Arc<StateTracker>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            targets,
            probe,
            tracker,
            interval,
            cancel,
        }
    }

    pub fn targets(&self) -> &[ApplicationTarget] {
        &self.targets
    }

    /// Run a round now and then once per interval until cancelled.
    ///
    /// Ticks that fire while a round is still running are dropped.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_round().await;
                }
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Engine loop cancelled");
                    break;
                }
            }
        }
    }

    /// Check every enabled target concurrently and wait for all of them.
    ///
    /// Returns the notification events raised during the round.
    pub async fn run_round(&self) -> Vec<NotificationEvent> {
        tracing::info!(
            "Running health checks for {} applications",
            self.targets.len()
        );

        let mut tasks = JoinSet::new();
        for target in &self.targets {
            let target = target.clone();
            let probe = Arc::clone(&self.probe);
            let tracker = Arc::clone(&self.tracker);
            tasks.spawn(async move { check_target(&target, probe.as_ref(), &tracker).await });
        }

        let mut events = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => tracing::error!("Health check task failed: {}", e),
            }
        }
        events
    }
}

async fn check_target(
    target: &ApplicationTarget,
    probe: &dyn Probe,
    tracker: &StateTracker,
) -> Option<NotificationEvent> {
    let outcome = probe.check(target).await;

    if outcome.is_healthy() {
        tracing::info!("OK - {} is {}", target.name, outcome);
    } else {
        tracing::warn!("{} ({}) {}", target.name, target.url, outcome);
    }

    tracker.record(target, &outcome).await
}
