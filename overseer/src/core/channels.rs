//! Task, directive and interjection channels.
//!
//! Each channel operation is split into a `begin_*` transition (gate check,
//! in-flight bookkeeping, payload to send) and a `finish_*` transition that
//! applies the remote outcome. The network call happens in between.

use crate::core::state::{Alert, AlertKind, AnsweredQuestion, SynchronizerState};
use crate::core::types::PendingInterjection;
use crate::error::{ActionError, ClientError, Unavailable};

pub(crate) const TASK_FAILED: &str = "Failed to submit task.";
pub(crate) const DIRECTIVE_FAILED: &str = "Failed to send direction to the agent.";
pub(crate) const ANSWER_FAILED: &str = "Failed to send answer. Please try again.";

impl SynchronizerState {
    pub fn set_task_draft(&mut self, text: String) -> bool {
        if self.task_draft == text {
            return false;
        }
        self.task_draft = text;
        true
    }

    /// Whether a new task may be assigned right now.
    ///
    /// Permitted when nothing was submitted yet, or the last known status is a
    /// ready state, and never while quota is exhausted.
    pub fn task_gate(&self) -> Result<(), Unavailable> {
        if self.quota_exceeded {
            return Err(Unavailable::QuotaExceeded);
        }
        // Stays set until the submission resolves, even across a kill.
        if self.loading {
            return Err(Unavailable::InFlight);
        }
        // No snapshot yet counts as idle.
        let ready = self.last_status().is_none_or(|status| status.is_ready());
        if !self.fresh && !ready {
            return Err(Unavailable::Busy);
        }
        Ok(())
    }

    /// Start a task submission. Returns the trimmed task text to send.
    pub fn begin_task(&mut self) -> Result<String, Unavailable> {
        self.task_gate()?;
        let task = self.task_draft.trim();
        if task.is_empty() {
            return Err(Unavailable::EmptyText);
        }
        let task = task.to_string();
        self.loading = true;
        Ok(task)
    }

    /// Apply the outcome of a task submission.
    ///
    /// Success clears the task field and leaves `fresh`, which starts polling.
    /// The draft survives any failure so the operator can retry.
    pub fn finish_task(&mut self, result: Result<(), ClientError>) -> Result<(), ActionError> {
        self.loading = false;
        match result {
            Ok(()) => {
                self.task_draft.clear();
                self.fresh = false;
                self.alert = None;
                Ok(())
            }
            Err(err) => Err(self.request_failure(TASK_FAILED, err)),
        }
    }

    /// Operator keystrokes in the directive input.
    pub fn edit_directive(&mut self, text: String) -> bool {
        if self.directive == text {
            return false;
        }
        self.directive = text;
        true
    }

    /// Directive input focus changes.
    pub fn set_editing(&mut self, editing: bool) -> bool {
        if self.edit_guard.is_editing() == editing {
            return false;
        }
        self.edit_guard.set(editing);
        true
    }

    /// Start a directive submission. Always available, regardless of agent status.
    pub fn begin_directive(&self) -> String {
        self.directive.clone()
    }

    /// Apply the outcome of a directive submission. The buffer is never cleared.
    pub fn finish_directive(&mut self, result: Result<(), ClientError>) -> Result<(), ActionError> {
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.raise(Alert::new(AlertKind::Transport, DIRECTIVE_FAILED));
                Err(ActionError::Transport(format!("{DIRECTIVE_FAILED} {err}")))
            }
        }
    }

    pub fn set_answer_draft(&mut self, text: String) -> bool {
        if self.answer_draft == text {
            return false;
        }
        self.answer_draft = text;
        true
    }

    /// Start answering the pending question.
    ///
    /// The question is cleared optimistically; [`Self::finish_answer`] restores
    /// it if the submission fails.
    pub fn begin_answer(&mut self) -> Result<String, Unavailable> {
        if self.interjection.is_none() {
            return Err(Unavailable::NoQuestion);
        }
        let answer = self.answer_draft.trim();
        if answer.is_empty() {
            return Err(Unavailable::EmptyText);
        }
        let answer = answer.to_string();
        let pending = self.interjection.take();
        self.answered_question = pending
            .as_ref()
            .map(|p| AnsweredQuestion::new(p.question.clone()));
        self.answering = pending;
        Ok(answer)
    }

    /// Apply the outcome of an answer submission.
    pub fn finish_answer(&mut self, result: Result<(), ClientError>) -> Result<(), ActionError> {
        let answered = self.answering.take();
        match result {
            Ok(()) => {
                self.answer_draft.clear();
                Ok(())
            }
            Err(err) => {
                self.restore_question(answered);
                Err(self.request_failure(ANSWER_FAILED, err))
            }
        }
    }

    /// Alert for a failed request. An explicit refusal carries the remote's own message.
    pub(crate) fn request_failure(&mut self, summary: &str, err: ClientError) -> ActionError {
        match err {
            ClientError::Rejected(message) => {
                self.raise(Alert::new(AlertKind::Rejected, message.clone()));
                ActionError::Rejected(message)
            }
            other => {
                self.raise(Alert::new(AlertKind::Transport, summary));
                ActionError::Transport(format!("{summary} {other}"))
            }
        }
    }

    fn restore_question(&mut self, answered: Option<PendingInterjection>) {
        self.answered_question = None;
        // A newer question that arrived meanwhile wins.
        if self.interjection.is_none() {
            self.interjection = answered;
        }
    }
}
