//! Event stream subscription for one run identity.
//!
//! The subscriber keeps a server-push connection open, resuming from its
//! cursor whenever the connection drops, until the run is terminal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::RunApi;
use crate::domain::{RunEvent, RunId, RunStatus};

use super::cursor::EventCursor;
use super::session::{ChannelEvent, ChannelMessage};

/// When to reopen a dropped stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reopening, or `None` when the run is terminal
    ///
    /// There is no retry limit; polling independently reports the terminal
    /// status even while streaming is degraded.
    pub fn next_attempt(&self, status: RunStatus) -> Option<Duration> {
        if status.is_terminal() {
            None
        } else {
            Some(self.delay)
        }
    }
}

/// Spawn the subscriber for `run_id`, starting at `start`
pub(crate) fn spawn_subscriber(
    api: Arc<dyn RunApi>,
    run_id: RunId,
    generation: u64,
    start: u64,
    policy: ReconnectPolicy,
    status: watch::Receiver<RunStatus>,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = EventCursor::new(start);

        loop {
            debug!(%run_id, start = cursor.position(), "Opening event stream");
            let reason = match api.open_events(&run_id, cursor.position()).await {
                Ok(mut stream) => {
                    let mut reason = "stream closed".to_string();
                    while let Some(item) = stream.next().await {
                        let message = match item {
                            Ok(message) => message,
                            Err(e) => {
                                reason = e.to_string();
                                break;
                            }
                        };
                        if message.data.is_empty() {
                            continue;
                        }

                        let Some(position) = cursor.advance(message.sequence()) else {
                            debug!(%run_id, id = ?message.id, "Skipping redelivered event");
                            continue;
                        };

                        let event = RunEvent::from_payload(&message.data);
                        let sent = tx.send(ChannelMessage {
                            generation,
                            event: ChannelEvent::Streamed {
                                cursor: position,
                                event,
                            },
                        });
                        if sent.is_err() {
                            debug!(%run_id, "Session gone, subscriber exiting");
                            return;
                        }
                    }
                    reason
                }
                Err(e) => e.to_string(),
            };

            let current = *status.borrow();
            let retry_in = policy.next_attempt(current);
            let dropped = tx.send(ChannelMessage {
                generation,
                event: ChannelEvent::StreamDropped {
                    reason: reason.clone(),
                    retry_in,
                },
            });
            if dropped.is_err() {
                return;
            }

            match retry_in {
                Some(delay) => {
                    warn!(%run_id, %reason, delay_ms = delay.as_millis() as u64, "Event stream dropped, reconnecting");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    info!(%run_id, status = %current, "Event stream closed for terminal run");
                    return;
                }
            }
        }
    })
}
