//! Run state and the reducer that both progress channels feed.
//!
//! A Run mirrors one lifecycle of a submitted idea on the remote service.
//! The client never invents transitions: every change comes from a creation,
//! poll, stream, cancel, regenerate or export response applied through
//! [`Run::apply`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::events::{EventLog, RunEvent, DEFAULT_EVENT_LIMIT};

/// Opaque run identifier assigned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Overall status of a run
///
/// `Idle` is the pre-creation state. Statuses the client does not recognise
/// are kept as `Unknown` rather than failing the response that carried them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// No further transitions, polling or streaming after these
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses from which a cancel request makes sense
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "idle" => Self::Idle,
            "queued" => Self::Queued,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of agent steps a run goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Pm,
    Tech,
    Qa,
    Principal,
    Review,
}

impl StepName {
    /// Every step, in the order the service runs them
    pub const ALL: [StepName; 5] = [
        StepName::Pm,
        StepName::Tech,
        StepName::Qa,
        StepName::Principal,
        StepName::Review,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pm => "pm",
            Self::Tech => "tech",
            Self::Qa => "qa",
            Self::Principal => "principal",
            Self::Review => "review",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepName::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown step '{}' (expected one of pm, tech, qa, principal, review)", s))
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepStatus {
    /// Not yet started
    #[default]
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Excluded by the service for this run
    Skipped,

    /// Failed
    Failed,

    /// Stopped by a run cancellation
    Cancelled,

    /// Anything else the service reports
    Unknown,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Skipped | Self::Failed | Self::Cancelled
        )
    }
}

impl From<String> for StepStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" | "queued" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "skipped" => Self::Skipped,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Unknown,
        }
    }
}

impl From<StepStatus> for String {
    fn from(value: StepStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub name: StepName,
    pub status: StepStatus,
}

/// Authoritative status report returned by `GET /runs/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: RunStatus,

    #[serde(default, deserialize_with = "known_steps")]
    pub steps: Vec<StepState>,

    #[serde(default)]
    pub artifacts: BTreeMap<String, bool>,
}

/// Step list from the service, dropping entries for steps this client
/// does not know
fn known_steps<'de, D>(deserializer: D) -> Result<Vec<StepState>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct RawStep {
        name: String,
        #[serde(default)]
        status: StepStatus,
    }

    let raw = Vec::<RawStep>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|step| match step.name.parse::<StepName>() {
            Ok(name) => Some(StepState {
                name,
                status: step.status,
            }),
            Err(_) => {
                debug!(step = %step.name, "Ignoring unknown step");
                None
            }
        })
        .collect())
}

/// A reducer action over [`Run`]
#[derive(Debug, Clone)]
pub enum RunAction {
    /// The service assigned an identity to a freshly submitted idea
    Created { id: RunId, status: RunStatus },

    /// Full replace of status, steps and artifacts from a poll
    StatusSnapshot(StatusSnapshot),

    /// A poll failed; recorded but not fatal
    PollFailed(String),

    /// One message delivered by the event stream
    StreamEvent { cursor: u64, event: RunEvent },

    /// Status adopted from a cancel response
    StatusReported(RunStatus),

    /// A step regeneration was accepted
    StepRegenerated { step: StepName, status: RunStatus },

    /// The rendered document was fetched
    ExportFetched(String),

    /// A user-initiated operation failed
    OperationFailed(String),

    /// A user-initiated operation began
    OperationStarted,
}

/// Client-side view of a run
#[derive(Debug, Clone)]
pub struct Run {
    /// Identity assigned by the service (None while idle)
    pub id: Option<RunId>,

    /// Current overall status
    pub status: RunStatus,

    /// Steps in the order the service reported them
    pub steps: Vec<StepState>,

    /// Artifact name -> presence flag
    pub artifacts: BTreeMap<String, bool>,

    /// Newest-first capped event log
    pub events: EventLog,

    /// Next stream position to request
    pub cursor: u64,

    /// Last fetched export, cleared whenever it becomes stale
    pub exported_document: Option<String>,

    /// Current error from a user-initiated operation
    pub error: Option<String>,

    /// Last poll failure, cleared by the next successful poll
    pub poll_error: Option<String>,
}

impl Default for Run {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LIMIT)
    }
}

impl Run {
    /// Create an idle run with the given event retention cap
    pub fn new(event_limit: usize) -> Self {
        Self {
            id: None,
            status: RunStatus::Idle,
            steps: Vec::new(),
            artifacts: BTreeMap::new(),
            events: EventLog::new(event_limit),
            cursor: 0,
            exported_document: None,
            error: None,
            poll_error: None,
        }
    }

    /// Apply a single action to update run state
    pub fn apply(&mut self, action: RunAction) {
        match action {
            RunAction::Created { id, status } => {
                let event_limit = self.events.capacity();
                *self = Self::new(event_limit);
                self.id = Some(id);
                self.status = status;
            }
            RunAction::StatusSnapshot(snapshot) => {
                // A late snapshot must not pull a finished run back
                if self.status.is_terminal() && !snapshot.status.is_terminal() {
                    return;
                }
                self.status = snapshot.status;
                self.steps = snapshot.steps;
                self.artifacts = snapshot.artifacts;
                self.poll_error = None;
            }
            RunAction::PollFailed(message) => {
                self.poll_error = Some(message);
            }
            RunAction::StreamEvent { cursor, event } => {
                self.cursor = self.cursor.max(cursor);
                self.events.push(event);
            }
            RunAction::StatusReported(status) => {
                self.status = status;
            }
            RunAction::StepRegenerated { step, status } => {
                self.status = status;
                self.exported_document = None;
                if let Some(state) = self.steps.iter_mut().find(|s| s.name == step) {
                    state.status = StepStatus::Pending;
                }
            }
            RunAction::ExportFetched(document) => {
                self.exported_document = Some(document);
            }
            RunAction::OperationFailed(message) => {
                self.error = Some(message);
            }
            RunAction::OperationStarted => {
                self.error = None;
            }
        }
    }

    /// Check if the service has assigned an identity yet
    pub fn has_identity(&self) -> bool {
        self.id.is_some()
    }

    /// Status of a step, `pending` when the service has not reported it
    pub fn step_status(&self, step: StepName) -> StepStatus {
        self.steps
            .iter()
            .find(|s| s.name == step)
            .map(|s| s.status)
            .unwrap_or_default()
    }

    pub fn can_cancel(&self) -> bool {
        self.has_identity() && self.status.is_cancellable()
    }

    /// The service excludes `review` from regeneration once it is skipped
    pub fn can_regenerate(&self, step: StepName) -> bool {
        if !self.has_identity() {
            return false;
        }
        !(step == StepName::Review && self.step_status(step) == StepStatus::Skipped)
    }

    pub fn can_export(&self) -> bool {
        self.has_identity() && self.status == RunStatus::Completed
    }

    /// Names of artifacts currently flagged present
    pub fn present_artifacts(&self) -> impl Iterator<Item = &str> {
        self.artifacts
            .iter()
            .filter(|(_, present)| **present)
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: RunStatus) -> StatusSnapshot {
        StatusSnapshot {
            status,
            steps: vec![
                StepState {
                    name: StepName::Pm,
                    status: StepStatus::Completed,
                },
                StepState {
                    name: StepName::Review,
                    status: StepStatus::Skipped,
                },
            ],
            artifacts: [("prd".to_string(), true), ("arch".to_string(), false)]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn test_run_starts_idle() {
        let run = Run::default();
        assert_eq!(run.status, RunStatus::Idle);
        assert!(!run.has_identity());
        assert!(!run.can_cancel());
        assert!(!run.can_regenerate(StepName::Pm));
    }

    #[test]
    fn test_created_resets_previous_state() {
        let mut run = Run::default();
        run.apply(RunAction::Created {
            id: RunId::new("run_a"),
            status: RunStatus::Queued,
        });
        run.apply(RunAction::StreamEvent {
            cursor: 4,
            event: RunEvent::new("step_started"),
        });
        run.apply(RunAction::ExportFetched("# Doc".to_string()));
        run.apply(RunAction::OperationFailed("boom".to_string()));

        run.apply(RunAction::Created {
            id: RunId::new("run_b"),
            status: RunStatus::Queued,
        });

        assert_eq!(run.id, Some(RunId::new("run_b")));
        assert!(run.events.is_empty());
        assert_eq!(run.cursor, 0);
        assert!(run.exported_document.is_none());
        assert!(run.error.is_none());
    }

    #[test]
    fn test_snapshot_is_full_replace() {
        let mut run = Run::default();
        run.apply(RunAction::Created {
            id: RunId::new("run_a"),
            status: RunStatus::Queued,
        });
        run.apply(RunAction::StatusSnapshot(snapshot(RunStatus::Running)));
        assert_eq!(run.steps.len(), 2);

        run.apply(RunAction::StatusSnapshot(StatusSnapshot {
            status: RunStatus::Running,
            steps: vec![],
            artifacts: BTreeMap::new(),
        }));
        assert!(run.steps.is_empty());
        assert!(run.artifacts.is_empty());
    }

    #[test]
    fn test_late_snapshot_does_not_revive_terminal_run() {
        let mut run = Run::default();
        run.apply(RunAction::Created {
            id: RunId::new("run_a"),
            status: RunStatus::Running,
        });
        run.apply(RunAction::StatusReported(RunStatus::Cancelled));
        run.apply(RunAction::StatusSnapshot(snapshot(RunStatus::Running)));
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[test]
    fn test_regenerate_clears_export_and_resets_step() {
        let mut run = Run::default();
        run.apply(RunAction::Created {
            id: RunId::new("run_a"),
            status: RunStatus::Queued,
        });
        run.apply(RunAction::StatusSnapshot(snapshot(RunStatus::Completed)));
        run.apply(RunAction::ExportFetched("# Doc".to_string()));

        run.apply(RunAction::StepRegenerated {
            step: StepName::Pm,
            status: RunStatus::Queued,
        });

        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.exported_document.is_none());
        assert_eq!(run.step_status(StepName::Pm), StepStatus::Pending);
    }

    #[test]
    fn test_review_regeneration_excluded_when_skipped() {
        let mut run = Run::default();
        run.apply(RunAction::Created {
            id: RunId::new("run_a"),
            status: RunStatus::Queued,
        });
        run.apply(RunAction::StatusSnapshot(snapshot(RunStatus::Running)));
        assert!(!run.can_regenerate(StepName::Review));
        assert!(run.can_regenerate(StepName::Tech));
    }

    #[test]
    fn test_status_parsing_tolerates_unknown_values() {
        let parsed: StatusSnapshot = serde_json::from_str(
            r#"{"status":"paused","steps":[{"name":"qa","status":"cancelled"}],"artifacts":{"PRD":true}}"#,
        )
        .unwrap();
        assert_eq!(parsed.status, RunStatus::Unknown);
        assert_eq!(parsed.steps[0].status, StepStatus::Cancelled);
        assert_eq!(parsed.artifacts.get("PRD"), Some(&true));
    }

    #[test]
    fn test_step_name_parsing() {
        assert_eq!("Principal".parse::<StepName>().unwrap(), StepName::Principal);
        assert!("design".parse::<StepName>().is_err());
    }

    #[test]
    fn test_present_artifacts() {
        let mut run = Run::default();
        run.apply(RunAction::Created {
            id: RunId::new("run_a"),
            status: RunStatus::Queued,
        });
        run.apply(RunAction::StatusSnapshot(snapshot(RunStatus::Running)));
        let present: Vec<&str> = run.present_artifacts().collect();
        assert_eq!(present, vec!["prd"]);
    }

    #[test]
    fn test_snapshot_skips_unknown_steps() {
        let payload = r#"{
            "status": "running",
            "steps": [
                {"name": "pm", "status": "completed"},
                {"name": "design", "status": "running"},
                {"name": "tech", "status": "queued"}
            ],
            "artifacts": {"PRD": true}
        }"#;

        let snapshot: StatusSnapshot = serde_json::from_str(payload).unwrap();

        assert_eq!(snapshot.status, RunStatus::Running);
        assert_eq!(
            snapshot.steps,
            vec![
                StepState {
                    name: StepName::Pm,
                    status: StepStatus::Completed,
                },
                StepState {
                    name: StepName::Tech,
                    status: StepStatus::Pending,
                },
            ]
        );
        assert_eq!(snapshot.artifacts.get("PRD"), Some(&true));
    }
}
