//! Remote-origin data model.
//!
//! These types mirror what the agent reports through its status surface. The
//! synchronizer only reads and renders them; snapshots are replaced wholesale
//! on every successful poll.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Placeholder the remote uses for "no current task".
const NO_TASK_PLACEHOLDER: &str = "None";

/// Tool name of the action the agent records when it asks the operator something.
const ASK_USER_ACTION: &str = "ask_user";

/// Remote-reported lifecycle status.
///
/// Only a handful of values carry meaning for the synchronizer. Anything else
/// (e.g. `executing_plan`) is kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentStatus {
    Idle,
    Planning,
    Completed,
    Aborted,
    QuotaExceeded,
    Other(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Planning => "planning",
            AgentStatus::Completed => "completed",
            AgentStatus::Aborted => "aborted",
            AgentStatus::QuotaExceeded => "quota_exceeded",
            AgentStatus::Other(raw) => raw,
        }
    }

    /// True for the natural end states in which a new task may be assigned.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            AgentStatus::Idle | AgentStatus::Completed | AgentStatus::Aborted
        )
    }
}

impl From<&str> for AgentStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "idle" => AgentStatus::Idle,
            "planning" => AgentStatus::Planning,
            "completed" => AgentStatus::Completed,
            "aborted" => AgentStatus::Aborted,
            "quota_exceeded" => AgentStatus::QuotaExceeded,
            other => AgentStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for AgentStatus {
    fn from(raw: String) -> Self {
        AgentStatus::from(raw.as_str())
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AgentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AgentStatus::from(raw.as_str()))
    }
}

/// One step of the agent's current plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: String,
    /// Tool parameters (`file`, `command`, ...), kept opaque.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// One executed action from the agent's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl ActionRecord {
    /// Tool name, whether the record stores a bare name or a full action object.
    pub fn name(&self) -> Option<&str> {
        match &self.action {
            Value::String(name) => Some(name),
            Value::Object(fields) => fields.get("action").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// The agent's reported state at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub status: AgentStatus,
    #[serde(default, deserialize_with = "deserialize_task")]
    pub current_task: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_plan: Vec<PlanStep>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plan_step: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub history: Vec<ActionRecord>,
    /// Question embedded in the status report by agents without a question endpoint.
    #[serde(
        default,
        deserialize_with = "deserialize_question",
        skip_serializing_if = "Option::is_none"
    )]
    pub pending_user_question: Option<String>,
}

impl AgentSnapshot {
    /// Snapshot carrying only a status, as reported by a freshly started agent.
    pub fn with_status(status: impl Into<AgentStatus>) -> Self {
        Self {
            status: status.into(),
            current_task: None,
            current_plan: Vec::new(),
            plan_step: 0,
            history: Vec::new(),
            pending_user_question: None,
        }
    }

    /// The plan step at `plan_step`, when the plan is non-empty and the index is in range.
    pub fn current_step(&self) -> Option<&PlanStep> {
        self.current_plan.get(self.plan_step)
    }

    /// How many times the agent has asked the operator a question so far.
    pub fn ask_count(&self) -> usize {
        self.history
            .iter()
            .filter(|record| record.name() == Some(ASK_USER_ACTION))
            .count()
    }
}

/// A blocking question raised by the remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingInterjection {
    pub question: String,
}

fn deserialize_task<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|task| {
        let trimmed = task.trim();
        !trimmed.is_empty() && trimmed != NO_TASK_PLACEHOLDER
    }))
}

fn deserialize_question<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|question| !question.trim().is_empty()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_round_trip_through_strings() {
        for raw in ["idle", "planning", "completed", "aborted", "quota_exceeded"] {
            let status = AgentStatus::from(raw);
            assert!(!matches!(status, AgentStatus::Other(_)), "{raw}");
            assert_eq!(status.as_str(), raw);
        }
    }

    #[test]
    fn unknown_status_is_preserved_for_display() {
        let snapshot: AgentSnapshot =
            serde_json::from_str(r#"{"status":"executing_plan"}"#).expect("parse");
        assert_eq!(
            snapshot.status,
            AgentStatus::Other("executing_plan".to_string())
        );
        assert!(!snapshot.status.is_ready());
        assert_eq!(snapshot.status.to_string(), "executing_plan");
    }

    #[test]
    fn ready_set_is_idle_completed_aborted() {
        assert!(AgentStatus::Idle.is_ready());
        assert!(AgentStatus::Completed.is_ready());
        assert!(AgentStatus::Aborted.is_ready());
        assert!(!AgentStatus::Planning.is_ready());
        assert!(!AgentStatus::QuotaExceeded.is_ready());
    }

    #[test]
    fn missing_and_null_fields_default_to_empty() {
        let snapshot: AgentSnapshot = serde_json::from_str(
            r#"{"status":"idle","current_plan":null,"history":null,"plan_step":null,"last_feedback":"x"}"#,
        )
        .expect("parse");
        assert_eq!(snapshot, AgentSnapshot::with_status("idle"));
        assert!(snapshot.current_step().is_none());
    }

    #[test]
    fn none_placeholder_task_is_absent() {
        let snapshot: AgentSnapshot =
            serde_json::from_str(r#"{"status":"idle","current_task":"None"}"#).expect("parse");
        assert_eq!(snapshot.current_task, None);
    }

    #[test]
    fn plan_steps_keep_tool_parameters() {
        let snapshot: AgentSnapshot = serde_json::from_str(
            r#"{
                "status": "executing_plan",
                "current_task": "Open the calculator app",
                "current_plan": [
                    {"action": "execute_shell_command", "command": "calc", "background": true, "description": "Launch it"},
                    {"action": "task_complete", "description": "Done"}
                ],
                "plan_step": 1,
                "history": [{"timestamp": 1700000000.5, "action": {"action": "execute_shell_command", "command": "calc"}}]
            }"#,
        )
        .expect("parse");

        assert_eq!(
            snapshot.current_task.as_deref(),
            Some("Open the calculator app")
        );
        let first = &snapshot.current_plan[0];
        assert_eq!(first.action, "execute_shell_command");
        assert_eq!(first.params.get("command"), Some(&Value::from("calc")));
        assert!(!first.params.contains_key("description"));
        assert_eq!(
            snapshot.current_step().map(|step| step.action.as_str()),
            Some("task_complete")
        );
        assert_eq!(snapshot.history[0].name(), Some("execute_shell_command"));
        assert_eq!(snapshot.history[0].timestamp, Some(1700000000.5));
    }

    #[test]
    fn embedded_question_and_asks_are_read_from_status() {
        let snapshot: AgentSnapshot = serde_json::from_str(
            r#"{
                "status": "executing_plan",
                "pending_user_question": "Which file should I open?",
                "history": [
                    {"timestamp": 1.0, "action": {"action": "ask_user", "question": "Which file should I open?"}},
                    {"timestamp": 2.0, "action": {"action": "read_file", "file": "notes.txt"}}
                ]
            }"#,
        )
        .expect("parse");
        assert_eq!(
            snapshot.pending_user_question.as_deref(),
            Some("Which file should I open?")
        );
        assert_eq!(snapshot.ask_count(), 1);

        let blank: AgentSnapshot =
            serde_json::from_str(r#"{"status":"idle","pending_user_question":"  "}"#).expect("parse");
        assert_eq!(blank.pending_user_question, None);
    }

    #[test]
    fn out_of_range_plan_step_has_no_current_step() {
        let mut snapshot = AgentSnapshot::with_status("planning");
        snapshot.plan_step = 3;
        assert!(snapshot.current_step().is_none());
    }
}
