//! Test-only helpers: snapshot builders and a scripted control surface.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::core::types::AgentSnapshot;
use crate::error::ClientError;
use crate::io::client::ControlSurface;

/// Create a snapshot with the given status and no plan or history.
pub fn snapshot(status: &str) -> AgentSnapshot {
    AgentSnapshot::with_status(status)
}

/// Control surface operations, as recorded by [`ScriptedSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Status,
    Logs,
    MirroredInput,
    PendingQuestion,
    SubmitTask,
    SubmitDirective,
    SubmitAnswer,
    Kill,
    Reset,
    ClearLogs,
}

/// One recorded call. `payload` carries the submitted text, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    pub payload: Option<String>,
}

#[derive(Debug)]
struct Script {
    status: AgentSnapshot,
    logs: Vec<String>,
    mirrored_input: String,
    question: Option<String>,
    failures: HashMap<Op, VecDeque<ClientError>>,
    delays: HashMap<Op, Duration>,
    calls: Vec<Call>,
}

/// In-memory agent whose responses are set by the test.
///
/// Responses are persistent until changed; failures queued with
/// [`ScriptedSurface::fail_next`] are consumed one per call. Clones share the
/// same script, so a test can keep one copy while the synchronizer owns another.
#[derive(Debug, Clone)]
pub struct ScriptedSurface {
    script: Arc<Mutex<Script>>,
}

impl Default for ScriptedSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSurface {
    /// An idle agent with empty logs, no mirrored input and no question.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                status: snapshot("idle"),
                logs: Vec::new(),
                mirrored_input: String::new(),
                question: None,
                failures: HashMap::new(),
                delays: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    pub fn set_status(&self, status: &str) {
        self.lock().status = snapshot(status);
    }

    pub fn set_snapshot(&self, snapshot: AgentSnapshot) {
        self.lock().status = snapshot;
    }

    pub fn set_logs(&self, logs: &[&str]) {
        self.lock().logs = logs.iter().map(|line| line.to_string()).collect();
    }

    pub fn set_mirrored_input(&self, text: &str) {
        self.lock().mirrored_input = text.to_string();
    }

    pub fn set_question(&self, question: Option<&str>) {
        self.lock().question = question.map(str::to_string);
    }

    /// Make the next call of `op` fail with `err`. Calls queue up in order.
    pub fn fail_next(&self, op: Op, err: ClientError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Delay every call of `op` by `delay` before it answers.
    pub fn delay(&self, op: Op, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|call| call.op == op).count()
    }

    /// Payloads submitted through `op`, oldest first.
    pub fn payloads(&self, op: Op) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op == op)
            .filter_map(|call| call.payload.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }

    async fn respond<T>(
        &self,
        op: Op,
        payload: Option<&str>,
        value: impl FnOnce(&Script) -> T,
    ) -> Result<T, ClientError> {
        let delay = {
            let mut script = self.lock();
            script.calls.push(Call {
                op,
                payload: payload.map(str::to_string),
            });
            script.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut script = self.lock();
        if let Some(err) = script.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(value(&script))
    }
}

impl ControlSurface for ScriptedSurface {
    async fn status(&self) -> Result<AgentSnapshot, ClientError> {
        self.respond(Op::Status, None, |script| script.status.clone())
            .await
    }

    async fn logs(&self) -> Result<Vec<String>, ClientError> {
        self.respond(Op::Logs, None, |script| script.logs.clone())
            .await
    }

    async fn mirrored_input(&self) -> Result<String, ClientError> {
        self.respond(Op::MirroredInput, None, |script| {
            script.mirrored_input.clone()
        })
        .await
    }

    fn screenshot_reference(&self, nonce: u64) -> String {
        format!("scripted://screenshot?t={nonce}")
    }

    async fn pending_question(&self) -> Result<Option<String>, ClientError> {
        self.respond(Op::PendingQuestion, None, |script| script.question.clone())
            .await
    }

    async fn submit_task(&self, task: &str) -> Result<(), ClientError> {
        self.respond(Op::SubmitTask, Some(task), |_| ()).await
    }

    async fn submit_directive(&self, text: &str) -> Result<(), ClientError> {
        self.respond(Op::SubmitDirective, Some(text), |_| ()).await
    }

    async fn submit_answer(&self, answer: &str) -> Result<(), ClientError> {
        self.respond(Op::SubmitAnswer, Some(answer), |_| ()).await
    }

    async fn request_kill(&self) -> Result<(), ClientError> {
        self.respond(Op::Kill, None, |_| ()).await
    }

    async fn request_reset(&self) -> Result<(), ClientError> {
        self.respond(Op::Reset, None, |_| ()).await
    }

    async fn clear_logs(&self) -> Result<(), ClientError> {
        self.respond(Op::ClearLogs, None, |_| ()).await
    }
}
