//! Periodic status polling for one run identity.
//!
//! The poller is single-flight: it issues one status request at a time and
//! only schedules the next tick once the previous one has resolved. It stops
//! itself once the service reports a terminal status, and keeps going
//! through fetch failures at a slightly longer interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::RunApi;
use crate::domain::{RunId, RunStatus};

use super::session::{ChannelEvent, ChannelMessage};

/// Result of one poll tick, as far as scheduling is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service answered with this status
    Status(RunStatus),

    /// The fetch failed
    Failed,
}

/// Poll intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay after a successful tick
    pub interval: Duration,

    /// Delay after a failed tick
    pub error_interval: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            error_interval: Duration::from_millis(2500),
        }
    }
}

impl PollSchedule {
    /// Delay before the next tick, or `None` to stop polling
    pub fn next_delay(&self, outcome: PollOutcome) -> Option<Duration> {
        match outcome {
            PollOutcome::Status(status) if status.is_terminal() => None,
            PollOutcome::Status(_) => Some(self.interval),
            PollOutcome::Failed => Some(self.error_interval),
        }
    }
}

/// Spawn the poller for `run_id`
///
/// Every tick is reported to the session through `tx`, tagged with
/// `generation` so the session can drop ticks from a previous identity.
pub(crate) fn spawn_poller(
    api: Arc<dyn RunApi>,
    run_id: RunId,
    generation: u64,
    schedule: PollSchedule,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (event, outcome) = match api.run_status(&run_id).await {
                Ok(snapshot) => {
                    debug!(%run_id, status = %snapshot.status, "Polled run status");
                    let outcome = PollOutcome::Status(snapshot.status);
                    (ChannelEvent::Snapshot(snapshot), outcome)
                }
                Err(e) => {
                    warn!(%run_id, error = %e, "Status poll failed");
                    (ChannelEvent::PollFailed(e.to_string()), PollOutcome::Failed)
                }
            };

            if tx.send(ChannelMessage { generation, event }).is_err() {
                debug!(%run_id, "Session gone, poller exiting");
                return;
            }

            match schedule.next_delay(outcome) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    info!(%run_id, "Run reached a terminal status, polling stopped");
                    return;
                }
            }
        }
    })
}
