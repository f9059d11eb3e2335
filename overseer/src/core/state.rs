//! The single owned record of reconciled state and its poll transitions.
//!
//! Channel operations live in [`crate::core::channels`] and lifecycle
//! operations in [`crate::core::lifecycle`]; both are `impl` blocks on
//! [`SynchronizerState`] so every write path goes through one type.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::core::edit_guard::EditGuard;
use crate::core::stall::StallDetector;
use crate::core::types::{AgentSnapshot, AgentStatus, PendingInterjection};
use crate::error::ClientError;

/// Category of an operator-visible alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// Network or endpoint failure.
    Transport,
    /// The remote explicitly refused a request.
    Rejected,
    /// Reset or kill could not be confirmed by the remote.
    Lifecycle,
}

/// Non-blocking message for the operator. Each new alert replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Operator requests that round-trip to the remote agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Task,
    Directive,
    Answer,
    Reset,
    Kill,
    ClearLogs,
}

impl RequestKind {
    /// Whether the outcome only makes sense for the session the request started in.
    ///
    /// A kill is the teardown itself and always lands. A directive changes
    /// nothing local on completion.
    pub fn is_session_bound(self) -> bool {
        !matches!(self, RequestKind::Kill | RequestKind::Directive)
    }
}

/// A question the operator already answered.
///
/// The agent keeps reporting a question after it was answered, so polls that
/// still carry it are ignored until the remote drops it or the agent asks again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnsweredQuestion {
    pub(crate) question: String,
    /// Asks recorded in the first snapshot seen after answering.
    asks_baseline: Option<usize>,
}

impl AnsweredQuestion {
    pub(crate) fn new(question: String) -> Self {
        Self {
            question,
            asks_baseline: None,
        }
    }

    /// True once a snapshot records more asks than the first one seen after answering.
    fn asked_again(&mut self, asks: usize) -> bool {
        match self.asks_baseline {
            Some(baseline) => asks > baseline,
            None => {
                self.asks_baseline = Some(asks);
                false
            }
        }
    }
}

/// Results of one main poll cycle, applied together once the cycle resolves.
#[derive(Debug, Clone)]
pub struct PollCycle {
    /// Teardown generation the cycle was started in.
    pub generation: u64,
    pub status: Result<AgentSnapshot, ClientError>,
    /// `None` when the cycle stopped after a failed status fetch.
    pub logs: Option<Result<Vec<String>, ClientError>>,
    /// `None` when the fetch was skipped because the operator was editing.
    pub mirrored_input: Option<Result<String, ClientError>>,
    pub screenshot: Option<String>,
}

/// Result of one interjection poll.
#[derive(Debug, Clone)]
pub struct QuestionFetch {
    pub generation: u64,
    pub question: Result<Option<String>, ClientError>,
}

/// Everything the synchronizer knows, owned by exactly one task.
#[derive(Debug, Clone)]
pub struct SynchronizerState {
    pub(crate) snapshot: Option<AgentSnapshot>,
    pub(crate) logs: Vec<String>,
    pub(crate) show_logs: bool,
    pub(crate) directive: String,
    pub(crate) edit_guard: EditGuard,
    pub(crate) task_draft: String,
    pub(crate) answer_draft: String,
    pub(crate) interjection: Option<PendingInterjection>,
    /// Question cleared optimistically by an answer still in flight.
    pub(crate) answering: Option<PendingInterjection>,
    pub(crate) answered_question: Option<AnsweredQuestion>,
    pub(crate) screenshot: Option<String>,
    pub(crate) screenshot_nonce: u64,
    pub(crate) fresh: bool,
    pub(crate) quota_exceeded: bool,
    pub(crate) stall: StallDetector,
    pub(crate) loading: bool,
    pub(crate) killing: bool,
    pub(crate) alert: Option<Alert>,
    pub(crate) generation: u64,
    pub(crate) presentation_epoch: u64,
}

impl SynchronizerState {
    /// State of a session in which no task has been submitted yet.
    pub fn new(stall_threshold: Duration) -> Self {
        Self {
            snapshot: None,
            logs: Vec::new(),
            show_logs: false,
            directive: String::new(),
            edit_guard: EditGuard::default(),
            task_draft: String::new(),
            answer_draft: String::new(),
            interjection: None,
            answering: None,
            answered_question: None,
            screenshot: None,
            screenshot_nonce: 0,
            fresh: true,
            quota_exceeded: false,
            stall: StallDetector::new(stall_threshold),
            loading: false,
            killing: false,
            alert: None,
            generation: 0,
            presentation_epoch: 0,
        }
    }

    /// State for observing an agent whose task was assigned elsewhere.
    pub fn attached(stall_threshold: Duration) -> Self {
        Self {
            fresh: false,
            ..Self::new(stall_threshold)
        }
    }

    /// The main poll loop runs only while a task has been submitted and quota remains.
    pub fn polling_active(&self) -> bool {
        !self.fresh && !self.quota_exceeded
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_editing(&self) -> bool {
        self.edit_guard.is_editing()
    }

    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    pub fn last_status(&self) -> Option<&AgentStatus> {
        self.snapshot.as_ref().map(|snapshot| &snapshot.status)
    }

    pub fn stall_deadline(&self) -> Option<Instant> {
        self.stall.deadline()
    }

    /// Cache-buster for the next screenshot reference.
    pub fn next_screenshot_nonce(&mut self) -> u64 {
        self.screenshot_nonce += 1;
        self.screenshot_nonce
    }

    /// Apply a completed poll cycle.
    ///
    /// Cycles started before the latest teardown are discarded. Status is
    /// applied first; logs, mirrored input and screenshot only when status
    /// succeeded.
    pub fn apply_poll(&mut self, cycle: PollCycle, now: Instant) -> bool {
        if cycle.generation != self.generation || self.fresh {
            return false;
        }

        let mut changed = match cycle.status {
            Ok(snapshot) => self.apply_snapshot(snapshot, now),
            Err(err) => {
                return self.raise(Alert::new(
                    AlertKind::Transport,
                    format!("Lost contact with the agent: {err}"),
                ));
            }
        };

        if let Some(Ok(logs)) = cycle.logs
            && logs != self.logs
        {
            self.logs = logs;
            changed = true;
        }

        if let Some(Ok(remote)) = cycle.mirrored_input {
            changed |= self.edit_guard.reconcile(&mut self.directive, remote);
        }

        if let Some(screenshot) = cycle.screenshot {
            self.screenshot = Some(screenshot);
            changed = true;
        }

        changed
    }

    fn apply_snapshot(&mut self, snapshot: AgentSnapshot, now: Instant) -> bool {
        let mut changed = self.stall.observe(&snapshot.status, now);
        self.quota_exceeded = snapshot.status == AgentStatus::QuotaExceeded;

        if self
            .alert
            .as_ref()
            .is_some_and(|alert| alert.kind == AlertKind::Transport)
        {
            // Contact restored.
            self.alert = None;
            changed = true;
        }

        let asked_again = self
            .answered_question
            .as_mut()
            .is_some_and(|answered| answered.asked_again(snapshot.ask_count()));
        if asked_again {
            // The next question poll may show the same text again.
            self.answered_question = None;
        }

        if self.snapshot.as_ref() != Some(&snapshot) {
            self.snapshot = Some(snapshot);
            changed = true;
        }
        changed
    }

    /// Apply the result of an interjection poll.
    pub fn apply_question(&mut self, fetch: QuestionFetch) -> bool {
        if fetch.generation != self.generation {
            return false;
        }
        let question = match fetch.question {
            Ok(question) => question,
            // Transport failures on this channel are logged by the driver and retried next tick.
            Err(_) => return false,
        };

        let Some(question) = question else {
            self.answered_question = None;
            return self.interjection.take().is_some();
        };

        if self
            .answered_question
            .as_ref()
            .is_some_and(|answered| answered.question == question)
        {
            return false;
        }
        self.answered_question = None;

        if self
            .interjection
            .as_ref()
            .is_some_and(|pending| pending.question == question)
        {
            return false;
        }
        self.answer_draft.clear();
        self.interjection = Some(PendingInterjection { question });
        true
    }

    /// Timer callback for the stall detector.
    pub fn fire_stall_timer(&mut self, now: Instant) -> bool {
        self.stall.fire(now)
    }

    pub fn dismiss_alert(&mut self) -> bool {
        self.alert.take().is_some()
    }

    /// Replace the current alert. Returns false when the same alert is already shown.
    pub(crate) fn raise(&mut self, alert: Alert) -> bool {
        if self.alert.as_ref() == Some(&alert) {
            return false;
        }
        self.alert = Some(alert);
        true
    }
}
