//! Control surface abstraction for the remote agent.
//!
//! The [`ControlSurface`] trait decouples the synchronizer from the actual
//! transport. [`HttpControlSurface`] talks to the agent's HTTP endpoints; tests
//! use scripted surfaces that return predetermined responses.
//!
//! Wrappers are stateless and never retry. Retry happens in the driver, which
//! simply polls again on its next tick.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::types::AgentSnapshot;
use crate::error::ClientError;

/// Request/response operations exposed by the remote agent.
pub trait ControlSurface: Send + Sync + 'static {
    fn status(&self) -> impl Future<Output = Result<AgentSnapshot, ClientError>> + Send;

    /// Tail of the agent log, oldest line first.
    fn logs(&self) -> impl Future<Output = Result<Vec<String>, ClientError>> + Send;

    /// Directive text as currently mirrored by the remote side.
    fn mirrored_input(&self) -> impl Future<Output = Result<String, ClientError>> + Send;

    /// Locator for the latest screen capture, made unique by `nonce` to defeat caches.
    fn screenshot_reference(&self, nonce: u64) -> String;

    fn pending_question(&self) -> impl Future<Output = Result<Option<String>, ClientError>> + Send;

    fn submit_task(&self, task: &str) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn submit_directive(&self, text: &str) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn submit_answer(&self, answer: &str) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn request_kill(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn request_reset(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn clear_logs(&self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

#[derive(Debug, Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UserInputResponse {
    #[serde(default)]
    user_input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionResponse {
    #[serde(default)]
    question: Option<String>,
}

/// Error body shapes used by the agent (`{"error": ..}`) and its framework (`{"detail": ..}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    detail: Option<String>,
}

#[derive(Serialize)]
struct TaskRequest<'a> {
    task: &'a str,
}

#[derive(Serialize)]
struct UserInputRequest<'a> {
    user_input: &'a str,
}

#[derive(Serialize)]
struct AnswerRequest<'a> {
    answer: &'a str,
}

/// HTTP implementation of [`ControlSurface`].
#[derive(Debug, Clone)]
pub struct HttpControlSurface {
    base_url: String,
    http: Client,
}

impl HttpControlSurface {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|err| ClientError::Request(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|err| ClientError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| ClientError::Decode(err.to_string()))
    }

    async fn post(&self, path: &str, payload: Option<&(impl Serialize + Sync)>) -> Result<(), ClientError> {
        let mut request = self.http.post(self.endpoint(path));
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ClientError::Request(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), body))
    }
}

/// Map a non-success response to a rejection when the body explains it.
fn classify_failure(status: u16, body: String) -> ClientError {
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.error.or(parsed.detail))
        .filter(|message| !message.trim().is_empty());
    match message {
        Some(message) => ClientError::Rejected(message),
        None => ClientError::Http { status, body },
    }
}

fn trim_line(line: String) -> String {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.len() == line.len() {
        line
    } else {
        trimmed.to_string()
    }
}

impl ControlSurface for HttpControlSurface {
    #[instrument(skip_all)]
    async fn status(&self) -> Result<AgentSnapshot, ClientError> {
        let snapshot: AgentSnapshot = self.get_json("status").await?;
        debug!(status = %snapshot.status, plan_len = snapshot.current_plan.len(), "status fetched");
        Ok(snapshot)
    }

    #[instrument(skip_all)]
    async fn logs(&self) -> Result<Vec<String>, ClientError> {
        let response: LogsResponse = self.get_json("logs").await?;
        Ok(response.logs.into_iter().map(trim_line).collect())
    }

    #[instrument(skip_all)]
    async fn mirrored_input(&self) -> Result<String, ClientError> {
        let response: UserInputResponse = self.get_json("user_input").await?;
        Ok(response.user_input.unwrap_or_default())
    }

    fn screenshot_reference(&self, nonce: u64) -> String {
        format!("{}?t={nonce}", self.endpoint("screenshot"))
    }

    #[instrument(skip_all)]
    async fn pending_question(&self) -> Result<Option<String>, ClientError> {
        let response = match self.get_json::<QuestionResponse>("pending_question").await {
            Ok(response) => response,
            Err(ClientError::Http { status: 404, .. }) => {
                // Agents without a question endpoint embed the question in their status.
                let snapshot: AgentSnapshot = self.get_json("status").await?;
                return Ok(snapshot.pending_user_question);
            }
            Err(err) => return Err(err),
        };
        Ok(response
            .question
            .filter(|question| !question.trim().is_empty()))
    }

    #[instrument(skip_all, fields(task_len = task.len()))]
    async fn submit_task(&self, task: &str) -> Result<(), ClientError> {
        let result = self.post("task", Some(&TaskRequest { task })).await;
        if let Err(err) = &result {
            warn!(error = %err, "task submission failed");
        }
        result
    }

    #[instrument(skip_all)]
    async fn submit_directive(&self, text: &str) -> Result<(), ClientError> {
        self.post("user_input", Some(&UserInputRequest { user_input: text }))
            .await
    }

    #[instrument(skip_all)]
    async fn submit_answer(&self, answer: &str) -> Result<(), ClientError> {
        self.post("pending_answer", Some(&AnswerRequest { answer }))
            .await
    }

    #[instrument(skip_all)]
    async fn request_kill(&self) -> Result<(), ClientError> {
        self.post("kill", None::<&()>).await
    }

    #[instrument(skip_all)]
    async fn request_reset(&self) -> Result<(), ClientError> {
        self.post("reset", None::<&()>).await
    }

    #[instrument(skip_all)]
    async fn clear_logs(&self) -> Result<(), ClientError> {
        self.post("clear_logs", None::<&()>).await
    }
}
