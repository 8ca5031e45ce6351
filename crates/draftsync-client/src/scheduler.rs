//! Periodic autosave driver
//!
//! Ticks a coordinator on a fixed interval and, optionally, pulses the
//! session so expiry is noticed even while the user is not typing. A tick
//! that overruns its period delays the next one instead of bunching them up.

use crate::coordinator::{AutosaveCoordinator, TickOutcome};
use draftsync_core::SyncConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Spawns the autosave loop for one coordinator
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    coordinator: Arc<AutosaveCoordinator>,
    interval: Duration,
    pulse: Option<Duration>,
}

impl AutosaveScheduler {
    /// Tick every `interval`, no session pulse
    #[must_use]
    pub fn new(coordinator: Arc<AutosaveCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            pulse: None,
        }
    }

    /// Intervals taken from the sync configuration
    #[must_use]
    pub fn from_config(coordinator: Arc<AutosaveCoordinator>, config: &SyncConfig) -> Self {
        Self {
            coordinator,
            interval: config.autosave_interval(),
            pulse: config.session_pulse_interval(),
        }
    }

    /// Also ping the session every `every`
    #[inline]
    #[must_use]
    pub fn with_pulse(mut self, every: Duration) -> Self {
        self.pulse = Some(every);
        self
    }

    /// Start the loop on the current runtime
    #[must_use]
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SchedulerHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Without a pulse the second arm never fires
        let pulse_period = self.pulse.unwrap_or(Duration::from_secs(86_400 * 365));
        let mut pulses = interval_at(Instant::now() + pulse_period, pulse_period);
        pulses.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Autosave started for draft {} every {:?}",
            self.coordinator.draft_id(),
            period
        );

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    match self.coordinator.tick().await {
                        TickOutcome::Closed => break,
                        TickOutcome::RetryLater(err) => {
                            tracing::debug!("Autosave will retry: {}", err);
                        }
                        outcome => tracing::trace!("Autosave tick: {:?}", outcome),
                    }
                }
                _ = pulses.tick(), if self.pulse.is_some() => {
                    let guard = &self.coordinator.context().guard;
                    if let Err(err) = guard.pulse(self.coordinator.context().api.as_ref()).await {
                        tracing::debug!("Session pulse: {}", err);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Autosave stopped for draft {}", self.coordinator.draft_id());
    }
}

/// Handle to a running autosave loop
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the current tick to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.task.await {
            tracing::error!("Autosave task failed: {}", err);
        }
    }

    /// Whether the loop has exited on its own
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
