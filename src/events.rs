//! Delegation audit log.
//!
//! Append-only NDJSON log (one JSON object per line) of delegation
//! activity, written only when an event log path is configured.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The action performed (delegate, subprocess_complete, etc.)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `agent`: Optional agent type for delegation-specific events
//! - `details`: Freeform object with action-specific details
//!
//! # Usage
//!
//! ```no_run
//! use conductor::events::{Event, EventAction, append_event};
//! use serde_json::json;
//! use std::path::Path;
//!
//! let event = Event::new(EventAction::Delegate)
//!     .with_agent("engineer")
//!     .with_details(json!({"task": "implement retries"}));
//! append_event(Path::new("events.ndjson"), &event)?;
//! # Ok::<(), conductor::error::ConductorError>(())
//! ```

use crate::error::{ConductorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Delegation requested
    Delegate,
    /// Context bundle prepared for a delegation
    ContextPrepared,
    /// Agent subprocess spawned
    SubprocessStart,
    /// Agent subprocess finished
    SubprocessComplete,
    /// Task handled on the fallback path (delegation disabled)
    FallbackExecution,
    /// Agent subprocess killed after exceeding its timeout
    Timeout,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Delegate => write!(f, "delegate"),
            EventAction::ContextPrepared => write!(f, "context_prepared"),
            EventAction::SubprocessStart => write!(f, "subprocess_start"),
            EventAction::SubprocessComplete => write!(f, "subprocess_complete"),
            EventAction::FallbackExecution => write!(f, "fallback_execution"),
            EventAction::Timeout => write!(f, "timeout"),
        }
    }
}

/// An event record for the audit log.
///
/// Events are serialized as single-line JSON objects and appended to
/// the configured NDJSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// Optional agent type for delegation-specific events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event with the given action.
    ///
    /// The timestamp is set to the current time, and the actor is
    /// determined from the environment (USER@HOSTNAME).
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            agent: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the agent type for this event.
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            ConductorError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// Get the actor string for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append an event to the log at `path`.
///
/// The file and its parent directory are created if missing. Each append
/// results in one line with a trailing newline, synced to disk.
pub fn append_event(path: &Path, event: &Event) -> Result<()> {
    let json_line = event.to_ndjson_line()?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            ConductorError::UserError(format!(
                "failed to create events directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            ConductorError::UserError(format!(
                "failed to open events file '{}': {}",
                path.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        ConductorError::UserError(format!(
            "failed to write event to '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        ConductorError::UserError(format!(
            "failed to sync events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read all events from the log at `path`.
///
/// Used by tooling and tests; the orchestrator itself only appends.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let content = fs::read_to_string(path).map_err(|e| {
        ConductorError::UserError(format!(
            "failed to read events file '{}': {}",
            path.display(),
            e
        ))
    })?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                ConductorError::UserError(format!(
                    "malformed event line in '{}': {}",
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_creation_sets_timestamp_and_actor() {
        let event = Event::new(EventAction::Delegate);

        assert_eq!(event.action, EventAction::Delegate);
        assert!(!event.actor.is_empty());
        assert!(event.agent.is_none());
        let age = Utc::now().signed_duration_since(event.ts);
        assert!(age.num_minutes() < 1);
    }

    #[test]
    fn test_event_with_agent_and_details() {
        let event = Event::new(EventAction::SubprocessComplete)
            .with_agent("engineer")
            .with_details(json!({"exit_code": 0, "elapsed_ms": 120}));

        assert_eq!(event.agent, Some("engineer".to_string()));
        assert_eq!(event.details["exit_code"], 0);
        assert_eq!(event.details["elapsed_ms"], 120);
    }

    #[test]
    fn test_event_serializes_to_single_line_snake_case() {
        let event = Event::new(EventAction::FallbackExecution).with_agent("qa");

        let json_line = event.to_ndjson_line().unwrap();
        assert!(!json_line.contains('\n'));
        assert!(json_line.contains("\"fallback_execution\""));

        let parsed: Event = serde_json::from_str(&json_line).unwrap();
        assert_eq!(parsed.action, EventAction::FallbackExecution);
        assert_eq!(parsed.agent, Some("qa".to_string()));
    }

    #[test]
    fn test_event_without_agent_omits_field() {
        let event = Event::new(EventAction::Delegate);
        let json_line = event.to_ndjson_line().unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json_line).unwrap();
        assert!(parsed.get("agent").is_none());
    }

    #[test]
    fn test_append_creates_file_and_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit").join("events.ndjson");
        assert!(!path.exists());

        let event = Event::new(EventAction::Delegate).with_agent("architect");
        append_event(&path, &event).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_appended_events_accumulate_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.ndjson");

        append_event(&path, &Event::new(EventAction::Delegate)).unwrap();
        append_event(
            &path,
            &Event::new(EventAction::SubprocessComplete).with_agent("engineer"),
        )
        .unwrap();

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, EventAction::Delegate);
        assert_eq!(events[1].action, EventAction::SubprocessComplete);
        assert_eq!(events[1].agent, Some("engineer".to_string()));
    }

    #[test]
    fn test_actor_string_contains_host_separator() {
        let actor = get_actor_string();
        assert!(actor.contains('@'));
    }

    #[test]
    fn test_event_action_display() {
        assert_eq!(format!("{}", EventAction::Delegate), "delegate");
        assert_eq!(format!("{}", EventAction::ContextPrepared), "context_prepared");
        assert_eq!(format!("{}", EventAction::SubprocessStart), "subprocess_start");
        assert_eq!(
            format!("{}", EventAction::SubprocessComplete),
            "subprocess_complete"
        );
        assert_eq!(
            format!("{}", EventAction::FallbackExecution),
            "fallback_execution"
        );
        assert_eq!(format!("{}", EventAction::Timeout), "timeout");
    }
}
