//! Event records delivered by the run's event stream.
//!
//! The stream carries one JSON object per message. Records are kept in a
//! capped, newest-first log so the shell always shows the latest activity.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How many events a run keeps by default
pub const DEFAULT_EVENT_LIMIT: usize = 12;

/// Event type synthesized for stream payloads that are not valid records
pub const PARSE_ERROR_KIND: &str = "event_parse_error";

/// A single structured event from the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Type discriminant (`agent_to`, `step_completed`, ...)
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Undecodable payload, only set on parse-error records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,

    /// Fields this client does not interpret (timestamps and the like)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunEvent {
    /// Create a bare event of the given type
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            step: None,
            iteration: None,
            reason: None,
            preview: None,
            error: None,
            from: None,
            to: None,
            raw: None,
            extra: Map::new(),
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_iteration(mut self, iteration: u64) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Parse a stream payload, keeping malformed input visible as a
    /// parse-error record instead of dropping it
    pub fn from_payload(payload: &str) -> Self {
        match serde_json::from_str::<RunEvent>(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "Undecodable stream payload");
                Self::parse_error(payload)
            }
        }
    }

    pub fn parse_error(raw: impl Into<String>) -> Self {
        let mut event = Self::new(PARSE_ERROR_KIND);
        event.raw = Some(raw.into());
        event
    }

    pub fn is_parse_error(&self) -> bool {
        self.kind == PARSE_ERROR_KIND
    }

    /// Check whether the event belongs to `step`
    pub fn is_for_step(&self, step: &str) -> bool {
        self.step.as_deref() == Some(step)
    }

    /// One-line human-readable description
    pub fn summary(&self) -> String {
        let iteration = self
            .iteration
            .map(|i| format!(" (iter {})", i))
            .unwrap_or_default();

        let (head, details) = match self.kind.as_str() {
            "agent_to" => (
                format!(
                    "Orchestrator → {}{}",
                    self.to.as_deref().unwrap_or("?"),
                    iteration
                ),
                vec![self.step.as_deref(), self.reason.as_deref()],
            ),
            "agent_from" => (
                format!(
                    "{} → Orchestrator{}",
                    self.from.as_deref().unwrap_or("?"),
                    iteration
                ),
                vec![self.step.as_deref(), self.preview.as_deref()],
            ),
            "revision_started" | "revision_completed" => {
                let verb = if self.kind == "revision_started" {
                    "started"
                } else {
                    "completed"
                };
                let cycle = self
                    .iteration
                    .map(|i| format!("Revision cycle {} {}", i, verb))
                    .unwrap_or_else(|| format!("Revision cycle {}", verb));
                (cycle, vec![self.step.as_deref()])
            }
            _ => (
                self.kind.clone(),
                vec![
                    self.step.as_deref(),
                    self.error.as_deref(),
                    self.raw.as_deref(),
                ],
            ),
        };

        details
            .into_iter()
            .flatten()
            .filter(|d| !d.is_empty())
            .fold(head, |acc, d| format!("{} • {}", acc, d))
    }
}

/// Capped newest-first event log
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<RunEvent>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LIMIT)
    }
}

impl EventLog {
    /// Create an empty log retaining at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Prepend an event, evicting the oldest past the cap
    pub fn push(&mut self, event: RunEvent) {
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Newest event, if any
    pub fn latest(&self) -> Option<&RunEvent> {
        self.entries.front()
    }

    /// Iterate newest-first
    pub fn iter(&self) -> impl Iterator<Item = &RunEvent> {
        self.entries.iter()
    }

    /// Events for one step, newest-first
    pub fn for_step<'a>(&'a self, step: &'a str) -> impl Iterator<Item = &'a RunEvent> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.is_for_step(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parsing_keeps_unknown_fields() {
        let event = RunEvent::from_payload(
            r#"{"type":"agent_to","to":"tech","step":"tech","iteration":2,"timestamp":1700000000}"#,
        );
        assert_eq!(event.kind, "agent_to");
        assert_eq!(event.iteration, Some(2));
        assert_eq!(event.extra.get("timestamp"), Some(&Value::from(1700000000)));
    }

    #[test]
    fn test_malformed_payload_becomes_parse_error() {
        let event = RunEvent::from_payload("{not json");
        assert!(event.is_parse_error());
        assert_eq!(event.raw.as_deref(), Some("{not json"));

        // Valid JSON without a type is not a record either
        let event = RunEvent::from_payload(r#"{"step":"pm"}"#);
        assert!(event.is_parse_error());
    }

    #[test]
    fn test_log_cap_evicts_oldest() {
        let mut log = EventLog::new(3);
        for i in 0..4 {
            log.push(RunEvent::new(format!("e{}", i)));
        }

        let kinds: Vec<&str> = log.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["e3", "e2", "e1"]);
        assert_eq!(log.latest().map(|e| e.kind.as_str()), Some("e3"));
    }

    #[test]
    fn test_step_filter() {
        let mut log = EventLog::default();
        log.push(RunEvent::new("step_started").with_step("pm"));
        log.push(RunEvent::new("step_started").with_step("qa"));
        log.push(RunEvent::new("step_completed").with_step("pm"));

        let pm: Vec<&str> = log.for_step("pm").map(|e| e.kind.as_str()).collect();
        assert_eq!(pm, vec!["step_completed", "step_started"]);
    }

    #[test]
    fn test_summaries() {
        let mut to = RunEvent::new("agent_to").with_step("tech").with_iteration(2);
        to.to = Some("tech".to_string());
        to.reason = Some("revise".to_string());
        assert_eq!(to.summary(), "Orchestrator → tech (iter 2) • tech • revise");

        let mut from = RunEvent::new("agent_from");
        from.from = Some("qa".to_string());
        from.preview = Some("Looks good".to_string());
        assert_eq!(from.summary(), "qa → Orchestrator • Looks good");

        let revision = RunEvent::new("revision_completed").with_iteration(1);
        assert_eq!(revision.summary(), "Revision cycle 1 completed");

        let mut failed = RunEvent::new("step_failed").with_step("pm");
        failed.error = Some("timeout".to_string());
        assert_eq!(failed.summary(), "step_failed • pm • timeout");
    }
}
