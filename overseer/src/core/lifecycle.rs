//! Reset (soft) and kill (hard) transitions, plus log housekeeping.
//!
//! Both teardowns call the same remote primitive by default and clear the same
//! local state. They differ in availability and in what survives a failure.

use crate::core::channels::{ANSWER_FAILED, DIRECTIVE_FAILED, TASK_FAILED};
use crate::core::state::{Alert, AlertKind, RequestKind, SynchronizerState};
use crate::error::{ActionError, ClientError, Unavailable};

const RESET_FAILED: &str = "Failed to reset agent.";
const KILL_FAILED: &str = "Failed to kill agent.";
const CLEAR_LOGS_FAILED: &str = "Failed to clear logs.";

/// What a reset needs from the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPlan {
    /// Nothing was ever submitted; resetting is a local no-op.
    AlreadyFresh,
    /// The remote teardown must be requested.
    Teardown,
}

impl SynchronizerState {
    /// Whether a soft reset may be requested right now.
    ///
    /// Requires a finished agent (or exhausted quota) and no other request in flight.
    pub fn reset_gate(&self) -> Result<ResetPlan, Unavailable> {
        if self.loading || self.killing {
            return Err(Unavailable::InFlight);
        }
        if self.fresh {
            return Ok(ResetPlan::AlreadyFresh);
        }
        let finished = self.last_status().is_none_or(|status| status.is_ready());
        if !finished && !self.quota_exceeded {
            return Err(Unavailable::NotFinished);
        }
        Ok(ResetPlan::Teardown)
    }

    pub fn begin_reset(&mut self) -> Result<ResetPlan, Unavailable> {
        let plan = self.reset_gate()?;
        if plan == ResetPlan::Teardown {
            self.loading = true;
        }
        Ok(plan)
    }

    /// Apply the outcome of a reset teardown. On failure local state is left untouched.
    pub fn finish_reset(&mut self, result: Result<(), ClientError>) -> Result<(), ActionError> {
        self.loading = false;
        match result {
            Ok(()) => {
                self.clear_session();
                self.alert = None;
                Ok(())
            }
            Err(err) => Err(self.lifecycle_failure(RESET_FAILED, err)),
        }
    }

    /// Whether a kill may be requested. Only a kill already in flight blocks it.
    pub fn kill_gate(&self) -> Result<(), Unavailable> {
        if self.killing {
            return Err(Unavailable::InFlight);
        }
        Ok(())
    }

    pub fn begin_kill(&mut self) -> Result<(), Unavailable> {
        self.kill_gate()?;
        self.killing = true;
        Ok(())
    }

    /// Apply the outcome of a kill.
    ///
    /// The presentation epoch always advances so views rebuild from scratch.
    /// On failure the session data is kept but the lifecycle flags are reset so
    /// the operator can retry. `loading` belongs to a task or reset request that
    /// may still be outstanding and is cleared when that request resolves.
    pub fn finish_kill(&mut self, result: Result<(), ClientError>) -> Result<(), ActionError> {
        self.killing = false;
        self.presentation_epoch += 1;
        match result {
            Ok(()) => {
                self.clear_session();
                self.alert = None;
                Ok(())
            }
            Err(err) => {
                self.fresh = true;
                self.quota_exceeded = false;
                self.stall.reset();
                self.generation += 1;
                Err(self.lifecycle_failure(KILL_FAILED, err))
            }
        }
    }

    /// Apply the outcome of a log clear request.
    pub fn finish_clear_logs(&mut self, result: Result<(), ClientError>) -> Result<(), ActionError> {
        match result {
            Ok(()) => {
                self.logs.clear();
                Ok(())
            }
            Err(err) => Err(self.request_failure(CLEAR_LOGS_FAILED, err)),
        }
    }

    /// Settle a request whose session was torn down while it was in flight.
    ///
    /// The caller still gets the remote outcome and a failure still raises an
    /// alert. Nothing else is applied: the session the request belonged to is
    /// gone, so `fresh`, drafts and the question stay as the teardown left them.
    pub fn finish_stale(
        &mut self,
        kind: RequestKind,
        result: Result<(), ClientError>,
    ) -> Result<(), ActionError> {
        match kind {
            RequestKind::Task | RequestKind::Reset => self.loading = false,
            RequestKind::Answer => self.answering = None,
            RequestKind::Directive | RequestKind::Kill | RequestKind::ClearLogs => {}
        }
        let Err(err) = result else {
            return Ok(());
        };
        match kind {
            RequestKind::Reset => Err(self.lifecycle_failure(RESET_FAILED, err)),
            RequestKind::Kill => Err(self.lifecycle_failure(KILL_FAILED, err)),
            RequestKind::Task => Err(self.request_failure(TASK_FAILED, err)),
            RequestKind::Answer => Err(self.request_failure(ANSWER_FAILED, err)),
            RequestKind::Directive => Err(self.request_failure(DIRECTIVE_FAILED, err)),
            RequestKind::ClearLogs => Err(self.request_failure(CLEAR_LOGS_FAILED, err)),
        }
    }

    pub fn toggle_logs(&mut self) {
        self.show_logs = !self.show_logs;
    }

    /// Drop every remote-origin entity and return to the never-started state.
    ///
    /// Bumps the generation so results of requests started earlier are ignored.
    fn clear_session(&mut self) {
        self.snapshot = None;
        self.logs.clear();
        self.show_logs = false;
        self.directive.clear();
        self.interjection = None;
        self.answering = None;
        self.answered_question = None;
        self.answer_draft.clear();
        self.screenshot = None;
        self.fresh = true;
        self.quota_exceeded = false;
        self.stall.reset();
        self.generation += 1;
    }

    fn lifecycle_failure(&mut self, summary: &str, err: ClientError) -> ActionError {
        let message = match err.rejection() {
            Some(reason) => format!("{summary} {reason}"),
            None => summary.to_string(),
        };
        self.raise(Alert::new(AlertKind::Lifecycle, message.clone()));
        match err {
            ClientError::Rejected(_) => ActionError::Rejected(message),
            other => ActionError::Transport(format!("{message} ({other})")),
        }
    }
}
