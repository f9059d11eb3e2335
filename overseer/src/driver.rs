//! Cooperative polling driver for the synchronizer.
//!
//! One task owns the [`SynchronizerState`]. It multiplexes operator commands,
//! the main poll interval, the interjection poll interval, the stall deadline
//! and every in-flight network request in a single `select!` loop, so state is
//! only ever written from one place.
//!
//! Poll cycles are serialized: at most one cycle is in flight and ticks that
//! elapse meanwhile are skipped. Reset and kill drop any in-flight poll and bump
//! the state generation. Every poll and request is tagged with the generation
//! it started in; a late poll result is discarded and a late task, answer,
//! reset or log-clear completion only answers its caller.
//! Dropping the [`SynchronizerHandle`] cancels the task and with it every timer
//! and pending request.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, OptionFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::lifecycle::ResetPlan;
use crate::core::state::{PollCycle, QuestionFetch, RequestKind, SynchronizerState};
use crate::core::types::AgentStatus;
use crate::core::view::View;
use crate::error::{ActionError, ClientError};
use crate::io::client::ControlSurface;
use crate::io::config::{SynchronizerConfig, Teardown};

const COMMAND_BUFFER: usize = 32;

type Reply = oneshot::Sender<Result<(), ActionError>>;

enum Command {
    SetTaskDraft(String),
    SubmitTask(Reply),
    EditDirective(String),
    SetEditing(bool),
    SubmitDirective(Reply),
    SetAnswerDraft(String),
    SubmitAnswer(Reply),
    Reset(Reply),
    Kill(Reply),
    ClearLogs(Reply),
    ToggleLogs,
    DismissAlert,
}

struct Completion {
    request: RequestKind,
    /// State generation at dispatch.
    generation: u64,
    result: Result<(), ClientError>,
    reply: Reply,
}

/// Network work owned by the loop. Dropping a slot cancels its request.
#[derive(Default)]
struct InFlight {
    poll: Option<BoxFuture<'static, PollCycle>>,
    question: Option<BoxFuture<'static, QuestionFetch>>,
    requests: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl InFlight {
    /// Cancel polls belonging to a session that was just torn down.
    fn drop_session_polls(&mut self) {
        self.poll = None;
        self.question = None;
    }

    fn dispatch<F>(&mut self, request: RequestKind, generation: u64, reply: Reply, call: F)
    where
        F: Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        self.requests.push(Box::pin(async move {
            let result = call.await;
            Completion {
                request,
                generation,
                result,
                reply,
            }
        }));
    }
}

/// The synchronizer task. Construct it with [`Synchronizer::spawn`] or [`Synchronizer::attach`].
pub struct Synchronizer<C> {
    surface: Arc<C>,
    config: SynchronizerConfig,
    state: SynchronizerState,
    view_tx: watch::Sender<View>,
}

impl<C: ControlSurface> Synchronizer<C> {
    /// Start a fresh session: nothing is polled until a task is submitted.
    pub fn spawn(surface: C, config: SynchronizerConfig) -> SynchronizerHandle {
        let state = SynchronizerState::new(config.stall_threshold());
        Self::start(surface, config, state)
    }

    /// Start observing an agent that is already running a task assigned elsewhere.
    pub fn attach(surface: C, config: SynchronizerConfig) -> SynchronizerHandle {
        let state = SynchronizerState::attached(config.stall_threshold());
        Self::start(surface, config, state)
    }

    fn start(surface: C, config: SynchronizerConfig, state: SynchronizerState) -> SynchronizerHandle {
        let (view_tx, view_rx) = watch::channel(state.view());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel = CancellationToken::new();

        let driver = Self {
            surface: Arc::new(surface),
            config,
            state,
            view_tx,
        };
        tokio::spawn(driver.run(command_rx, cancel.clone()));

        SynchronizerHandle {
            commands: command_tx,
            view: view_rx,
            cancel,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        let poll_period = self.config.poll_interval();
        let mut poll_tick = interval_at(Instant::now() + poll_period, poll_period);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut question_tick = interval(self.config.question_poll_interval());
        question_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = InFlight::default();

        info!(
            poll_ms = self.config.poll_interval_ms,
            fresh = self.state.is_fresh(),
            "synchronizer started"
        );

        loop {
            let polling = self.state.polling_active();
            let stall_deadline = self.state.stall_deadline();

            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command, &mut in_flight);
                }
                _ = poll_tick.tick(), if polling && in_flight.poll.is_none() => {
                    in_flight.poll = Some(self.start_poll_cycle());
                }
                Some(cycle) = OptionFuture::from(in_flight.poll.as_mut()), if in_flight.poll.is_some() => {
                    in_flight.poll = None;
                    self.finish_poll_cycle(cycle);
                }
                _ = question_tick.tick(), if in_flight.question.is_none() => {
                    in_flight.question = Some(self.start_question_fetch());
                }
                Some(fetch) = OptionFuture::from(in_flight.question.as_mut()), if in_flight.question.is_some() => {
                    in_flight.question = None;
                    self.finish_question_fetch(fetch);
                }
                _ = sleep_until(stall_deadline.unwrap_or_else(Instant::now)), if stall_deadline.is_some() => {
                    if self.state.fire_stall_timer(Instant::now()) {
                        warn!(
                            threshold_ms = self.config.stall_threshold_ms,
                            "agent appears stuck in planning"
                        );
                        self.publish();
                    }
                }
                Some(completion) = in_flight.requests.next(), if !in_flight.requests.is_empty() => {
                    self.finish_request(completion, &mut in_flight, &mut poll_tick);
                }
            }
        }

        debug!("synchronizer stopped");
    }

    fn handle_command(&mut self, command: Command, in_flight: &mut InFlight) {
        let generation = self.state.generation();
        let changed = match command {
            Command::SetTaskDraft(text) => self.state.set_task_draft(text),
            Command::EditDirective(text) => self.state.edit_directive(text),
            Command::SetEditing(editing) => self.state.set_editing(editing),
            Command::SetAnswerDraft(text) => self.state.set_answer_draft(text),
            Command::ToggleLogs => {
                self.state.toggle_logs();
                true
            }
            Command::DismissAlert => self.state.dismiss_alert(),
            Command::SubmitTask(reply) => match self.state.begin_task() {
                Ok(task) => {
                    info!(task = %task, "submitting task");
                    let surface = Arc::clone(&self.surface);
                    in_flight.dispatch(RequestKind::Task, generation, reply, async move {
                        surface.submit_task(&task).await
                    });
                    true
                }
                Err(reason) => {
                    let _ = reply.send(Err(reason.into()));
                    false
                }
            },
            Command::SubmitDirective(reply) => {
                let text = self.state.begin_directive();
                debug!(len = text.len(), "sending directive");
                let surface = Arc::clone(&self.surface);
                in_flight.dispatch(RequestKind::Directive, generation, reply, async move {
                    surface.submit_directive(&text).await
                });
                false
            }
            Command::SubmitAnswer(reply) => match self.state.begin_answer() {
                Ok(answer) => {
                    let surface = Arc::clone(&self.surface);
                    in_flight.dispatch(RequestKind::Answer, generation, reply, async move {
                        surface.submit_answer(&answer).await
                    });
                    true
                }
                Err(reason) => {
                    let _ = reply.send(Err(reason.into()));
                    false
                }
            },
            Command::Reset(reply) => match self.state.begin_reset() {
                Ok(ResetPlan::AlreadyFresh) => {
                    let _ = reply.send(Ok(()));
                    false
                }
                Ok(ResetPlan::Teardown) => {
                    info!(route = ?self.config.teardown, "resetting agent");
                    let surface = Arc::clone(&self.surface);
                    let teardown = self.config.teardown;
                    in_flight.dispatch(RequestKind::Reset, generation, reply, async move {
                        match teardown {
                            Teardown::Kill => surface.request_kill().await,
                            Teardown::Split => surface.request_reset().await,
                        }
                    });
                    true
                }
                Err(reason) => {
                    let _ = reply.send(Err(reason.into()));
                    false
                }
            },
            Command::Kill(reply) => match self.state.begin_kill() {
                Ok(()) => {
                    warn!("kill switch engaged");
                    let surface = Arc::clone(&self.surface);
                    in_flight.dispatch(RequestKind::Kill, generation, reply, async move {
                        surface.request_kill().await
                    });
                    true
                }
                Err(reason) => {
                    let _ = reply.send(Err(reason.into()));
                    false
                }
            },
            Command::ClearLogs(reply) => {
                let surface = Arc::clone(&self.surface);
                in_flight.dispatch(RequestKind::ClearLogs, generation, reply, async move {
                    surface.clear_logs().await
                });
                false
            }
        };

        if changed {
            self.publish();
        }
    }

    fn finish_request(
        &mut self,
        completion: Completion,
        in_flight: &mut InFlight,
        poll_tick: &mut Interval,
    ) {
        let Completion {
            request,
            generation,
            result,
            reply,
        } = completion;
        if let Err(err) = &result {
            warn!(?request, error = %err, "request failed");
        }

        if request.is_session_bound() && generation != self.state.generation() {
            debug!(?request, generation, "request outlived its session");
            let outcome = self.state.finish_stale(request, result);
            self.publish();
            let _ = reply.send(outcome);
            return;
        }

        let outcome = match request {
            RequestKind::Task => {
                let outcome = self.state.finish_task(result);
                if outcome.is_ok() {
                    // First status poll lands one interval after acceptance.
                    poll_tick.reset();
                    info!("task accepted, polling started");
                }
                outcome
            }
            RequestKind::Directive => self.state.finish_directive(result),
            RequestKind::Answer => self.state.finish_answer(result),
            RequestKind::Reset => {
                let outcome = self.state.finish_reset(result);
                if outcome.is_ok() {
                    in_flight.drop_session_polls();
                    info!("agent reset, polling stopped");
                }
                outcome
            }
            RequestKind::Kill => {
                let outcome = self.state.finish_kill(result);
                // Local flags are reset even when the remote call failed.
                in_flight.drop_session_polls();
                info!(ok = outcome.is_ok(), "kill finished, polling stopped");
                outcome
            }
            RequestKind::ClearLogs => self.state.finish_clear_logs(result),
        };

        self.publish();
        let _ = reply.send(outcome);
    }

    fn start_poll_cycle(&mut self) -> BoxFuture<'static, PollCycle> {
        let surface = Arc::clone(&self.surface);
        let generation = self.state.generation();
        let fetch_input = !self.state.is_editing();
        let nonce = self.state.next_screenshot_nonce();

        Box::pin(async move {
            let status = surface.status().await;
            if status.is_err() {
                return PollCycle {
                    generation,
                    status,
                    logs: None,
                    mirrored_input: None,
                    screenshot: None,
                };
            }
            let logs = surface.logs().await;
            let mirrored_input = if fetch_input {
                Some(surface.mirrored_input().await)
            } else {
                None
            };
            PollCycle {
                generation,
                status,
                logs: Some(logs),
                mirrored_input,
                screenshot: Some(surface.screenshot_reference(nonce)),
            }
        })
    }

    fn finish_poll_cycle(&mut self, cycle: PollCycle) {
        if let Err(err) = &cycle.status {
            warn!(error = %err, "status poll failed, retrying next tick");
        }
        if let Some(Err(err)) = &cycle.logs {
            warn!(error = %err, "log poll failed, retrying next tick");
        }
        if let Some(Err(err)) = &cycle.mirrored_input {
            warn!(error = %err, "mirrored input poll failed, retrying next tick");
        }

        let previous = self.state.last_status().cloned();
        let changed = self.state.apply_poll(cycle, Instant::now());

        if let Some(status) = self.state.last_status()
            && previous.as_ref() != Some(status)
        {
            if *status == AgentStatus::QuotaExceeded {
                warn!("agent quota exceeded, main poll halted");
            } else {
                info!(status = %status, "agent status changed");
            }
        }

        if changed {
            self.publish();
        }
    }

    fn start_question_fetch(&self) -> BoxFuture<'static, QuestionFetch> {
        let surface = Arc::clone(&self.surface);
        let generation = self.state.generation();
        Box::pin(async move {
            QuestionFetch {
                generation,
                question: surface.pending_question().await,
            }
        })
    }

    fn finish_question_fetch(&mut self, fetch: QuestionFetch) {
        if let Err(err) = &fetch.question {
            warn!(error = %err, "question poll failed, retrying next tick");
        }
        if self.state.apply_question(fetch) {
            if let Some(pending) = &self.state.interjection {
                info!(question = %pending.question, "agent is waiting for an answer");
            }
            self.publish();
        }
    }

    fn publish(&self) {
        let view = self.state.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}

/// Presentation-side handle: read access to the reconciled [`View`] plus the
/// narrow set of operator actions. Dropping it stops the synchronizer.
pub struct SynchronizerHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<View>,
    cancel: CancellationToken,
}

impl SynchronizerHandle {
    /// Latest published view.
    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    /// Receiver notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.view.clone()
    }

    pub async fn set_task_draft(&self, text: impl Into<String>) -> Result<(), ActionError> {
        self.send(Command::SetTaskDraft(text.into())).await
    }

    /// Submit the current task draft.
    pub async fn submit_task(&self) -> Result<(), ActionError> {
        self.request(Command::SubmitTask).await
    }

    /// Replace the task draft and submit it.
    pub async fn assign_task(&self, task: impl Into<String>) -> Result<(), ActionError> {
        self.set_task_draft(task).await?;
        self.submit_task().await
    }

    pub async fn edit_directive(&self, text: impl Into<String>) -> Result<(), ActionError> {
        self.send(Command::EditDirective(text.into())).await
    }

    /// Directive input focus (`true`) or blur (`false`).
    pub async fn set_editing(&self, editing: bool) -> Result<(), ActionError> {
        self.send(Command::SetEditing(editing)).await
    }

    pub async fn submit_directive(&self) -> Result<(), ActionError> {
        self.request(Command::SubmitDirective).await
    }

    pub async fn set_answer_draft(&self, text: impl Into<String>) -> Result<(), ActionError> {
        self.send(Command::SetAnswerDraft(text.into())).await
    }

    /// Submit the current answer draft for the pending question.
    pub async fn submit_answer(&self) -> Result<(), ActionError> {
        self.request(Command::SubmitAnswer).await
    }

    /// Replace the answer draft and submit it.
    pub async fn answer(&self, text: impl Into<String>) -> Result<(), ActionError> {
        self.set_answer_draft(text).await?;
        self.submit_answer().await
    }

    pub async fn reset(&self) -> Result<(), ActionError> {
        self.request(Command::Reset).await
    }

    pub async fn kill(&self) -> Result<(), ActionError> {
        self.request(Command::Kill).await
    }

    pub async fn clear_logs(&self) -> Result<(), ActionError> {
        self.request(Command::ClearLogs).await
    }

    pub async fn toggle_logs(&self) -> Result<(), ActionError> {
        self.send(Command::ToggleLogs).await
    }

    pub async fn dismiss_alert(&self) -> Result<(), ActionError> {
        self.send(Command::DismissAlert).await
    }

    /// Stop the synchronizer. In-flight requests and timers are dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the synchronizer task has exited.
    pub async fn stopped(&self) {
        self.commands.closed().await;
    }

    async fn send(&self, command: Command) -> Result<(), ActionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ActionError::Stopped)
    }

    async fn request(&self, command: fn(Reply) -> Command) -> Result<(), ActionError> {
        let (reply, outcome) = oneshot::channel();
        self.send(command(reply)).await?;
        outcome.await.map_err(|_| ActionError::Stopped)?
    }
}

impl Drop for SynchronizerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
