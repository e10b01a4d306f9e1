//! Run session: owns run identity and merges the two progress channels.
//!
//! The poller and the stream subscriber never touch the [`Run`] directly.
//! They send tagged messages into one queue; [`RunSession::next_update`]
//! applies them through the run's reducer one at a time. Messages tagged
//! with an older generation belong to a previous identity and are dropped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{ExportFormat, RunApi};
use crate::domain::{
    Run, RunAction, RunEvent, RunId, RunStatus, StatusSnapshot, StepName, DEFAULT_EVENT_LIMIT,
};
use crate::export::{
    markdown_to_notebook, notebook_file_name, Download, DownloadSink, MemoryDownloadSink,
    NOTEBOOK_MIME_TYPE,
};
use crate::store::{IdeaStore, MemoryIdeaStore};

use super::error::SessionError;
use super::poller::{spawn_poller, PollSchedule};
use super::stream::{spawn_subscriber, ReconnectPolicy};

/// Timing and retention settings for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub poll: PollSchedule,
    pub reconnect: ReconnectPolicy,
    pub event_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll: PollSchedule::default(),
            reconnect: ReconnectPolicy::default(),
            event_limit: DEFAULT_EVENT_LIMIT,
        }
    }
}

/// Message from a channel task to the session
#[derive(Debug)]
pub(crate) struct ChannelMessage {
    pub generation: u64,
    pub event: ChannelEvent,
}

#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Snapshot(StatusSnapshot),
    PollFailed(String),
    Streamed { cursor: u64, event: RunEvent },
    StreamDropped {
        reason: String,
        retry_in: Option<Duration>,
    },
}

/// What changed after a channel message was applied
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A status snapshot replaced status, steps and artifacts
    Snapshot { status: RunStatus },

    /// A poll failed; polling continues
    PollFailed(String),

    /// A stream event was added to the log
    Event(RunEvent),

    /// The stream connection dropped
    StreamDropped {
        reason: String,
        retry_in: Option<Duration>,
    },
}

/// Handles of the two channel tasks for one identity
struct RunChannels {
    poller: JoinHandle<()>,
    stream: JoinHandle<()>,
}

impl RunChannels {
    /// Either task has stopped on its own
    fn any_finished(&self) -> bool {
        self.poller.is_finished() || self.stream.is_finished()
    }
}

impl Drop for RunChannels {
    fn drop(&mut self) {
        self.poller.abort();
        self.stream.abort();
    }
}

/// Client-side owner of one run at a time
///
/// Channel messages queue up until the caller drains them with
/// [`next_update`](Self::next_update) or
/// [`drain_updates`](Self::drain_updates). The queue is unbounded, and the
/// stream subscriber's terminal check reads the status published while
/// draining: a caller that never drains grows the queue, and the stream
/// keeps reconnecting after the run has ended until the session is cleared
/// or dropped.
pub struct RunSession {
    api: Arc<dyn RunApi>,
    ideas: Arc<dyn IdeaStore>,
    downloads: Arc<dyn DownloadSink>,
    settings: SessionSettings,
    run: Run,
    generation: u64,
    channels: Option<RunChannels>,
    tx: mpsc::UnboundedSender<ChannelMessage>,
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
    status_tx: watch::Sender<RunStatus>,
}

impl RunSession {
    /// Create an idle session using in-memory idea and download stores
    pub fn new(api: Arc<dyn RunApi>, settings: SessionSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(RunStatus::Idle);
        Self {
            api,
            ideas: Arc::new(MemoryIdeaStore::new()),
            downloads: Arc::new(MemoryDownloadSink::new()),
            settings,
            run: Run::new(settings.event_limit),
            generation: 0,
            channels: None,
            tx,
            rx,
            status_tx,
        }
    }

    pub fn with_idea_store(mut self, ideas: Arc<dyn IdeaStore>) -> Self {
        self.ideas = ideas;
        self
    }

    pub fn with_download_sink(mut self, downloads: Arc<dyn DownloadSink>) -> Self {
        self.downloads = downloads;
        self
    }

    /// Current view of the run
    pub fn run(&self) -> &Run {
        &self.run
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Last cached idea, for seeding an idea buffer
    pub fn cached_idea(&self) -> Option<String> {
        self.ideas.load()
    }

    /// Subscribe to status changes
    pub fn watch_status(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// Check whether either channel task is still alive
    pub fn has_active_channels(&self) -> bool {
        self.channels
            .as_ref()
            .map(|c| !c.poller.is_finished() || !c.stream.is_finished())
            .unwrap_or(false)
    }

    /// Submit an idea and start tracking the new run
    #[instrument(skip(self, idea), fields(idea_len = idea.len()))]
    pub async fn start(&mut self, idea: &str) -> Result<RunId, SessionError> {
        let idea = idea.trim();
        if idea.is_empty() {
            return Err(self.fail(SessionError::Validation));
        }

        self.run.apply(RunAction::OperationStarted);
        let created = match self.api.create_run(idea).await {
            Ok(created) => created,
            Err(e) => return Err(self.fail(SessionError::RunCreation(e.to_string()))),
        };

        let status = created.status.unwrap_or(RunStatus::Queued);
        let id = created.id;

        self.teardown();
        self.run.apply(RunAction::Created {
            id: id.clone(),
            status,
        });
        self.publish_status();
        self.ideas.save(idea);
        info!(run_id = %id, %status, "Run created");

        if !status.is_terminal() {
            self.arm();
        }
        Ok(id)
    }

    /// Track an existing run
    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    pub async fn attach(&mut self, run_id: RunId) -> Result<RunStatus, SessionError> {
        self.run.apply(RunAction::OperationStarted);
        let snapshot = match self.api.run_status(&run_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(SessionError::StatusFetch(e.to_string()))),
        };

        let status = snapshot.status;
        self.teardown();
        self.run.apply(RunAction::Created {
            id: run_id.clone(),
            status,
        });
        self.run.apply(RunAction::StatusSnapshot(snapshot));
        self.publish_status();
        info!(%status, "Attached to run");

        if !status.is_terminal() {
            self.arm();
        }
        Ok(status)
    }

    /// Stop tracking and return to idle
    pub fn clear(&mut self) {
        self.teardown();
        self.run = Run::new(self.settings.event_limit);
        self.publish_status();
    }

    /// Ask the service to cancel the run
    ///
    /// No-op (`Ok(None)`) without an identity or once the run is past
    /// `queued`/`running`.
    #[instrument(skip(self))]
    pub async fn cancel(&mut self) -> Result<Option<RunStatus>, SessionError> {
        let Some(id) = self.run.id.clone() else {
            return Ok(None);
        };
        if !self.run.status.is_cancellable() {
            debug!(status = %self.run.status, "Run not cancellable");
            return Ok(None);
        }

        self.run.apply(RunAction::OperationStarted);
        match self.api.cancel_run(&id).await {
            Ok(reply) => {
                let status = reply.status.unwrap_or(RunStatus::Cancelled);
                self.run.apply(RunAction::StatusReported(status));
                self.publish_status();
                info!(run_id = %id, %status, "Cancel accepted");
                Ok(Some(status))
            }
            Err(e) => Err(self.fail(SessionError::Cancel(e.to_string()))),
        }
    }

    /// Ask the service to rerun one step
    ///
    /// No-op without an identity, and for `review` once the service has
    /// marked it skipped.
    #[instrument(skip(self, step), fields(step = %step))]
    pub async fn regenerate_step(
        &mut self,
        step: StepName,
    ) -> Result<Option<RunStatus>, SessionError> {
        let Some(id) = self.run.id.clone() else {
            return Ok(None);
        };
        if !self.run.can_regenerate(step) {
            debug!("Step excluded from regeneration");
            return Ok(None);
        }

        self.run.apply(RunAction::OperationStarted);
        let reply = match self.api.regenerate_step(&id, step).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(SessionError::Regenerate(e.to_string()))),
        };

        let status = reply.status.unwrap_or(RunStatus::Queued);
        self.run.apply(RunAction::StepRegenerated { step, status });
        self.publish_status();
        info!(run_id = %id, %status, "Regeneration accepted");

        // A terminal status stops the poller, the stream, or both; track
        // the rerun again with a fresh pair
        let channel_stopped = self
            .channels
            .as_ref()
            .map(RunChannels::any_finished)
            .unwrap_or(true);
        if !status.is_terminal() && channel_stopped {
            self.teardown();
            self.arm();
        }
        Ok(Some(status))
    }

    /// Fetch the rendered Markdown document of a completed run
    #[instrument(skip(self))]
    pub async fn fetch_export(&mut self) -> Result<Option<String>, SessionError> {
        let Some(id) = self.completed_run_id() else {
            return Ok(None);
        };

        self.run.apply(RunAction::OperationStarted);
        match self.api.export_run(&id, ExportFormat::Markdown).await {
            Ok(document) => {
                self.run.apply(RunAction::ExportFetched(document.clone()));
                Ok(Some(document))
            }
            Err(e) => Err(self.fail(SessionError::Export(e.to_string()))),
        }
    }

    /// Convert the export to a notebook and hand it to the download sink
    ///
    /// Uses the cached export when present. Returns where the file went.
    #[instrument(skip(self))]
    pub async fn download_notebook(&mut self) -> Result<Option<PathBuf>, SessionError> {
        let Some(id) = self.completed_run_id() else {
            return Ok(None);
        };

        self.run.apply(RunAction::OperationStarted);
        let markdown = match self.run.exported_document.clone() {
            Some(document) => document,
            None => match self.api.export_run(&id, ExportFormat::Markdown).await {
                Ok(document) => document,
                Err(e) => return Err(self.fail(SessionError::NotebookExport(e.to_string()))),
            },
        };
        self.run.apply(RunAction::ExportFetched(markdown.clone()));

        let mut metadata = Map::new();
        metadata.insert(
            "teamflow".to_string(),
            json!({
                "runId": id.as_str(),
                "exportedAt": Utc::now().to_rfc3339(),
            }),
        );
        let notebook = markdown_to_notebook(&markdown, metadata);
        let contents = match notebook.to_pretty_json() {
            Ok(contents) => contents,
            Err(e) => return Err(self.fail(SessionError::NotebookExport(e.to_string()))),
        };

        let download = Download {
            file_name: notebook_file_name(&id),
            mime_type: NOTEBOOK_MIME_TYPE,
            contents,
        };
        match self.downloads.deliver(&download).await {
            Ok(location) => {
                info!(run_id = %id, cells = notebook.cells.len(), location = %location.display(), "Notebook delivered");
                Ok(Some(location))
            }
            Err(e) => Err(self.fail(SessionError::NotebookExport(format!("{:#}", e)))),
        }
    }

    /// Wait for the next channel message and apply it
    ///
    /// Stale messages from previous identities are skipped. Only returns
    /// `None` if the queue is closed, which cannot happen while the session
    /// is alive.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let message = self.rx.recv().await?;
            if let Some(update) = self.apply_message(message) {
                return Some(update);
            }
        }
    }

    /// Apply every message already queued without waiting
    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Some(update) = self.apply_message(message) {
                updates.push(update);
            }
        }
        updates
    }

    fn apply_message(&mut self, message: ChannelMessage) -> Option<SessionUpdate> {
        if message.generation != self.generation {
            debug!(
                generation = message.generation,
                current = self.generation,
                "Dropping message from a previous run"
            );
            return None;
        }

        let update = match message.event {
            ChannelEvent::Snapshot(snapshot) => {
                let before = self.run.status;
                self.run.apply(RunAction::StatusSnapshot(snapshot));
                if self.run.status != before {
                    info!(from = %before, to = %self.run.status, "Run status changed");
                    self.publish_status();
                }
                SessionUpdate::Snapshot {
                    status: self.run.status,
                }
            }
            ChannelEvent::PollFailed(message) => {
                self.run.apply(RunAction::PollFailed(message.clone()));
                SessionUpdate::PollFailed(message)
            }
            ChannelEvent::Streamed { cursor, event } => {
                self.run.apply(RunAction::StreamEvent {
                    cursor,
                    event: event.clone(),
                });
                SessionUpdate::Event(event)
            }
            ChannelEvent::StreamDropped { reason, retry_in } => {
                SessionUpdate::StreamDropped { reason, retry_in }
            }
        };
        Some(update)
    }

    fn completed_run_id(&self) -> Option<RunId> {
        if self.run.can_export() {
            self.run.id.clone()
        } else {
            None
        }
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(kind = err.kind(), error = %err, "Run operation failed");
        self.run.apply(RunAction::OperationFailed(err.to_string()));
        err
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.run.status);
    }

    /// Start both channels for the current identity
    fn arm(&mut self) {
        let Some(id) = self.run.id.clone() else {
            return;
        };

        let poller = spawn_poller(
            Arc::clone(&self.api),
            id.clone(),
            self.generation,
            self.settings.poll,
            self.tx.clone(),
        );
        let stream = spawn_subscriber(
            Arc::clone(&self.api),
            id.clone(),
            self.generation,
            self.run.cursor,
            self.settings.reconnect,
            self.status_tx.subscribe(),
            self.tx.clone(),
        );
        debug!(run_id = %id, generation = self.generation, cursor = self.run.cursor, "Channels armed");
        self.channels = Some(RunChannels { poller, stream });
    }

    /// Stop both channels and invalidate anything they already queued
    fn teardown(&mut self) {
        if let Some(channels) = self.channels.take() {
            drop(channels);
            debug!(generation = self.generation, "Channels torn down");
        }
        self.generation += 1;
    }
}
