//! HTTP route handlers for the operator API.
//!
//! Request/response actions answer with the view as published after the
//! action completed. Input-only updates (keystrokes, focus, toggles) are
//! queued and answer `202 Accepted`; their effect arrives over `/events`.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use overseer::core::view::View;
use overseer::error::ActionError;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/view", get(get_view))
        .route("/task", post(submit_task))
        .route("/directive", post(submit_directive).put(edit_directive))
        .route("/editing", post(set_editing))
        .route("/answer", post(submit_answer))
        .route("/reset", post(reset))
        .route("/kill", post(kill))
        .route("/clear-logs", post(clear_logs))
        .route("/logs/toggle", post(toggle_logs))
        .route("/alert", delete(dismiss_alert))
}

/// Operator action failure, rendered as `{"error": ..}`.
#[derive(Debug)]
pub struct ApiError(ActionError);

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ActionError::Unavailable(_) => StatusCode::CONFLICT,
            ActionError::Transport(_) => StatusCode::BAD_GATEWAY,
            ActionError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ActionError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<View>, ApiError>;

#[derive(Deserialize)]
struct TaskRequest {
    task: String,
}

#[derive(Deserialize)]
struct DirectiveRequest {
    text: String,
}

#[derive(Deserialize)]
struct EditingRequest {
    editing: bool,
}

#[derive(Deserialize)]
struct AnswerRequest {
    answer: String,
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/view - current reconciled view.
async fn get_view(State(state): State<AppState>) -> Json<View> {
    Json(state.sync.view())
}

/// POST /api/task - replace the task draft and submit it.
async fn submit_task(State(state): State<AppState>, Json(request): Json<TaskRequest>) -> ApiResult {
    state.sync.assign_task(request.task).await?;
    Ok(Json(state.sync.view()))
}

/// PUT /api/directive - operator keystrokes in the directive input.
async fn edit_directive(
    State(state): State<AppState>,
    Json(request): Json<DirectiveRequest>,
) -> Result<StatusCode, ApiError> {
    state.sync.edit_directive(request.text).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/directive - send the current directive buffer.
async fn submit_directive(State(state): State<AppState>) -> ApiResult {
    state.sync.submit_directive().await?;
    Ok(Json(state.sync.view()))
}

/// POST /api/editing - directive input focus or blur.
async fn set_editing(
    State(state): State<AppState>,
    Json(request): Json<EditingRequest>,
) -> Result<StatusCode, ApiError> {
    state.sync.set_editing(request.editing).await?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/answer - answer the pending question.
async fn submit_answer(State(state): State<AppState>, Json(request): Json<AnswerRequest>) -> ApiResult {
    state.sync.answer(request.answer).await?;
    Ok(Json(state.sync.view()))
}

async fn reset(State(state): State<AppState>) -> ApiResult {
    state.sync.reset().await?;
    Ok(Json(state.sync.view()))
}

async fn kill(State(state): State<AppState>) -> ApiResult {
    state.sync.kill().await?;
    Ok(Json(state.sync.view()))
}

async fn clear_logs(State(state): State<AppState>) -> ApiResult {
    state.sync.clear_logs().await?;
    Ok(Json(state.sync.view()))
}

async fn toggle_logs(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.sync.toggle_logs().await?;
    Ok(StatusCode::ACCEPTED)
}

async fn dismiss_alert(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.sync.dismiss_alert().await?;
    Ok(StatusCode::ACCEPTED)
}
