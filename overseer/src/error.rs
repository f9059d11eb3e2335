//! Error taxonomy for the control surface and operator actions.
//!
//! Transport failures and explicit remote rejections are kept apart so that
//! rejection messages can be shown verbatim. Stalls and quota exhaustion are
//! state, not errors, and never appear here.

use thiserror::Error;

/// Failure of a single request against the remote control surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("request failed: {0}")]
    Request(String),
    /// Non-success status without a usable error message.
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    /// The response body did not match the expected shape.
    #[error("decode failed: {0}")]
    Decode(String),
    /// The remote answered with an explicit `{"error": ...}` message.
    #[error("{0}")]
    Rejected(String),
}

impl ClientError {
    /// Remote-provided rejection message, if any.
    pub fn rejection(&self) -> Option<&str> {
        match self {
            ClientError::Rejected(message) => Some(message),
            _ => None,
        }
    }
}

/// Why an operator action is not currently permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unavailable {
    #[error("agent is busy with another task")]
    Busy,
    #[error("agent quota exceeded")]
    QuotaExceeded,
    #[error("another request is already in flight")]
    InFlight,
    #[error("agent has not reached a finished state")]
    NotFinished,
    #[error("no pending question")]
    NoQuestion,
    #[error("nothing to submit")]
    EmptyText,
}

/// Outcome of a failed operator action, as reported to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Rejected locally before any request was sent.
    #[error("unavailable: {0}")]
    Unavailable(#[from] Unavailable),
    /// The request failed in transit or with an unexplained status.
    #[error("{0}")]
    Transport(String),
    /// The remote explicitly rejected the request.
    #[error("{0}")]
    Rejected(String),
    /// The synchronizer task is no longer running.
    #[error("synchronizer stopped")]
    Stopped,
}
