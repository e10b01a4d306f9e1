//! Plain-text rendering of run state for the terminal.

use crate::core::SessionUpdate;
use crate::domain::{Run, RunEvent, StepName};

/// Multi-line run overview (status, steps, artifacts, errors)
pub fn run_overview(run: &Run) -> String {
    let mut lines = Vec::new();

    if let Some(id) = &run.id {
        lines.push(format!("Run ID: {}", id));
    }
    lines.push(format!("Status: {}", run.status));

    lines.push("Steps:".to_string());
    for step in StepName::ALL {
        lines.push(format!("  {:<10} {}", step.as_str(), run.step_status(step)));
    }

    let artifacts: Vec<&str> = run.present_artifacts().collect();
    if artifacts.is_empty() {
        lines.push("Artifacts: (none yet)".to_string());
    } else {
        lines.push(format!("Artifacts: {}", artifacts.join(", ")));
    }

    if let Some(err) = &run.poll_error {
        lines.push(format!("Last poll error: {}", err));
    }
    if let Some(err) = &run.error {
        lines.push(format!("Error: {}", err));
    }

    lines.join("\n")
}

/// One event line, marking parse failures
pub fn event_line(event: &RunEvent) -> String {
    if event.is_parse_error() {
        format!("  ! {}", event.summary())
    } else {
        format!("  • {}", event.summary())
    }
}

/// Retained events for one step, newest first
pub fn step_events(run: &Run, step: StepName) -> String {
    let lines: Vec<String> = run.events.for_step(step.as_str()).map(event_line).collect();
    if lines.is_empty() {
        format!("No recent events for {}", step)
    } else {
        format!("Recent events for {}:\n{}", step, lines.join("\n"))
    }
}

/// Line for a session update, or `None` when it should stay quiet
///
/// `step` hides events for other steps.
pub fn update_line(update: &SessionUpdate, step: Option<StepName>) -> Option<String> {
    match update {
        SessionUpdate::Snapshot { .. } => None,
        SessionUpdate::Event(event) => {
            let wanted = match step {
                Some(step) => event.is_for_step(step.as_str()),
                None => true,
            };
            wanted.then(|| event_line(event))
        }
        SessionUpdate::PollFailed(err) => Some(format!("[status check failed: {}]", err)),
        SessionUpdate::StreamDropped { reason, retry_in } => Some(match retry_in {
            Some(delay) => format!(
                "[event stream dropped: {}; reconnecting in {}ms]",
                reason,
                delay.as_millis()
            ),
            None => format!("[event stream closed: {}]", reason),
        }),
    }
}
