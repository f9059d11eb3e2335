//! Read-only projection of [`SynchronizerState`] for presentation layers.

use serde::Serialize;

use crate::core::lifecycle::ResetPlan;
use crate::core::state::{Alert, SynchronizerState};
use crate::core::types::{AgentSnapshot, PendingInterjection};

/// Lifecycle and in-flight flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LifecycleFlags {
    pub fresh: bool,
    pub quota_exceeded: bool,
    pub planning_stuck: bool,
    pub loading: bool,
    pub killing: bool,
}

/// Which operator actions are currently enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Controls {
    pub submit_task: bool,
    pub submit_answer: bool,
    /// Only offered when a remote teardown is needed; a fresh session has nothing to reset.
    pub reset: bool,
    pub kill: bool,
}

/// Everything a presentation layer may render. Cloned out of the owning task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub snapshot: Option<AgentSnapshot>,
    pub logs: Vec<String>,
    pub show_logs: bool,
    pub directive: String,
    pub editing: bool,
    pub task_draft: String,
    pub answer_draft: String,
    /// Rendered with priority over the directive input when present.
    pub interjection: Option<PendingInterjection>,
    pub screenshot: Option<String>,
    pub flags: LifecycleFlags,
    pub controls: Controls,
    pub alert: Option<Alert>,
    /// Advances on every kill; presentation layers reinitialize when it changes.
    pub presentation_epoch: u64,
}

impl SynchronizerState {
    pub fn view(&self) -> View {
        View {
            snapshot: self.snapshot.clone(),
            logs: self.logs.clone(),
            show_logs: self.show_logs,
            directive: self.directive.clone(),
            editing: self.edit_guard.is_editing(),
            task_draft: self.task_draft.clone(),
            answer_draft: self.answer_draft.clone(),
            interjection: self.interjection.clone(),
            screenshot: self.screenshot.clone(),
            flags: LifecycleFlags {
                fresh: self.fresh,
                quota_exceeded: self.quota_exceeded,
                planning_stuck: self.stall.is_stuck(),
                loading: self.loading,
                killing: self.killing,
            },
            controls: Controls {
                submit_task: self.task_gate().is_ok(),
                submit_answer: self.interjection.is_some(),
                reset: self.reset_gate() == Ok(ResetPlan::Teardown),
                kill: self.kill_gate().is_ok(),
            },
            alert: self.alert.clone(),
            presentation_epoch: self.presentation_epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn fresh_view_offers_task_and_kill_only() {
        let view = SynchronizerState::new(Duration::from_secs(30)).view();
        assert!(view.flags.fresh);
        assert!(view.controls.submit_task);
        assert!(view.controls.kill);
        assert!(!view.controls.reset);
        assert!(!view.controls.submit_answer);
        assert!(view.snapshot.is_none());
    }

    #[test]
    fn view_serializes_status_as_plain_string() {
        let mut state = SynchronizerState::attached(Duration::from_secs(30));
        state.snapshot = Some(AgentSnapshot::with_status("executing_plan"));
        let json = serde_json::to_value(state.view()).expect("serialize");
        assert_eq!(json["snapshot"]["status"], "executing_plan");
        assert_eq!(json["flags"]["fresh"], false);
    }

    #[test]
    fn reset_is_offered_once_a_submitted_task_finished() {
        let mut state = SynchronizerState::attached(Duration::from_secs(30));
        state.snapshot = Some(AgentSnapshot::with_status("planning"));
        assert!(!state.view().controls.reset);

        state.snapshot = Some(AgentSnapshot::with_status("completed"));
        assert!(state.view().controls.reset);
    }
}
