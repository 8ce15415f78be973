use serde_json::{json, Value};

use crate::details::ChangeDetails;

/// Marker the caller reports when the step should carry on without a change.
pub const CREATION_TIMEOUT_CONTINUE_MARKER: &str = "ChangeCreationFailure_DontFailTheStep";

/// Result of a single change-status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Change is approved and in its implement state.
    Approved,
    /// Awaiting a decision (or awaiting creation); poll again.
    Pending { details: ChangeDetails },
    /// Change was rejected or canceled by a user.
    Stopped,
    /// Change creation or processing failed on the service side.
    Failed { details: Value },
    /// Service answered 201 with a state this gate does not know.
    UnexpectedState { state: Option<String> },
    /// No change was created in time and policy says abort.
    TimeoutAbort { message: String },
    /// No change was created in time and policy says carry on.
    TimeoutContinue { timeout_secs: u64 },
    /// The request itself did not produce a usable response.
    Transport(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    NoResponse { reason: String },
    DisallowedStatus(u16),
    Server,
    /// `message` carries `result.errorMessage` as sent, string or structured.
    BadRequest { message: Option<Value> },
    Unauthorized,
    Forbidden,
    NotFound,
    MalformedResponse { reason: String },
}

impl TransportError {
    /// HTTP-derived code reported to the caller.
    pub fn code(&self) -> u16 {
        match self {
            TransportError::BadRequest { .. } => 400,
            TransportError::Unauthorized => 401,
            TransportError::Forbidden => 403,
            TransportError::NotFound => 404,
            TransportError::NoResponse { .. }
            | TransportError::DisallowedStatus(_)
            | TransportError::Server
            | TransportError::MalformedResponse { .. } => 500,
        }
    }

    pub fn marker(&self) -> String {
        match self {
            TransportError::BadRequest {
                message: Some(message),
            } => error_payload(message.clone()),
            other => other.code().to_string(),
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NoResponse { reason } => write!(f, "no response received: {reason}"),
            TransportError::DisallowedStatus(status) => {
                write!(f, "unexpected HTTP status {status}")
            }
            TransportError::Server => write!(f, "internal server error"),
            TransportError::BadRequest {
                message: Some(Value::String(m)),
            } => write!(f, "bad request: {m}"),
            TransportError::BadRequest { message: Some(m) } => write!(f, "bad request: {m}"),
            TransportError::BadRequest { message: None } => write!(f, "bad request"),
            TransportError::Unauthorized => write!(f, "unauthorized"),
            TransportError::Forbidden => write!(f, "forbidden"),
            TransportError::NotFound => write!(f, "not found"),
            TransportError::MalformedResponse { reason } => {
                write!(f, "could not read change status from response: {reason}")
            }
        }
    }
}

impl PollOutcome {
    /// Whether the outer loop must stop polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollOutcome::Pending { .. })
    }

    /// Whether the pipeline step must fail.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PollOutcome::Failed { .. }
                | PollOutcome::UnexpectedState { .. }
                | PollOutcome::TimeoutAbort { .. }
                | PollOutcome::Transport(_)
        )
    }

    /// Compact string form of the outcome, as reported to the CI host.
    pub fn marker(&self) -> String {
        match self {
            PollOutcome::Approved => "true".to_string(),
            PollOutcome::Pending { details } => {
                json!({ "statusCode": "201", "details": details }).to_string()
            }
            PollOutcome::Stopped => "202".to_string(),
            PollOutcome::Failed { details } => error_payload(details.clone()),
            PollOutcome::UnexpectedState { .. } => "201".to_string(),
            PollOutcome::TimeoutAbort { message } => error_payload(Value::String(message.clone())),
            PollOutcome::TimeoutContinue { .. } => CREATION_TIMEOUT_CONTINUE_MARKER.to_string(),
            PollOutcome::Transport(err) => err.marker(),
        }
    }
}

fn error_payload(details: Value) -> String {
    json!({ "status": "error", "details": details }).to_string()
}
