use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::details::ChangeDetails;
use crate::outcome::{PollOutcome, TransportError};
use crate::sink::{OutputSink, Reporter, CHANGE_REQUEST_NUMBER, CHANGE_REQUEST_SYS_ID};
use crate::transport::HttpResult;

const ALLOWED_STATUSES: [u16; 7] = [200, 201, 400, 401, 403, 404, 500];

/// Continuation state the caller threads from one poll to the next.
#[derive(Debug, Clone)]
pub struct PollContext {
    /// Fixed at the first poll.
    pub change_creation_start: DateTime<Utc>,
    pub change_creation_timeout_secs: u64,
    pub abort_on_change_creation_failure: bool,
    /// Snapshot seen on the previous poll, only used to decide what to print.
    pub prev_poll_details: ChangeDetails,
}

impl PollContext {
    pub fn new(
        change_creation_start: DateTime<Utc>,
        change_creation_timeout_secs: u64,
        abort_on_change_creation_failure: bool,
    ) -> Self {
        Self {
            change_creation_start,
            change_creation_timeout_secs,
            abort_on_change_creation_failure,
            prev_poll_details: ChangeDetails::default(),
        }
    }

    fn creation_timed_out(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = now
            .signed_duration_since(self.change_creation_start)
            .num_milliseconds();
        i128::from(elapsed_ms) > i128::from(self.change_creation_timeout_secs) * 1000
    }
}

/// Turns one HTTP result into a [`PollOutcome`].
pub struct Interpreter {
    outputs: Arc<dyn OutputSink>,
    reporter: Arc<dyn Reporter>,
}

impl Interpreter {
    pub fn new(outputs: Arc<dyn OutputSink>, reporter: Arc<dyn Reporter>) -> Self {
        Self { outputs, reporter }
    }

    pub fn interpret(
        &self,
        result: HttpResult,
        ctx: &PollContext,
        now: DateTime<Utc>,
    ) -> PollOutcome {
        let (status, body) = match result {
            HttpResult::NoResponse { reason } => {
                return PollOutcome::Transport(TransportError::NoResponse { reason });
            }
            HttpResult::Response { status, body } => (status, body),
        };

        if let Err(err) = classify_status(status, body.as_ref()) {
            tracing::debug!(status = status, error = %err, "Change status request rejected");
            return PollOutcome::Transport(err);
        }

        tracing::debug!("Polling started to fetch change info");

        let details = match read_change_details(body.as_ref()) {
            Ok(details) => details,
            Err(reason) => {
                tracing::error!(reason = %reason, "Could not read change status details from API response");
                return PollOutcome::Transport(TransportError::MalformedResponse { reason });
            }
        };

        if details.is_empty() && ctx.creation_timed_out(now) {
            let timeout_secs = ctx.change_creation_timeout_secs;
            if ctx.abort_on_change_creation_failure {
                return PollOutcome::TimeoutAbort {
                    message: format!(
                        "Timeout after {timeout_secs} seconds. Workflow execution is aborted since abortOnChangeCreationFailure flag is true"
                    ),
                };
            }
            self.reporter.creation_timeout_continue(timeout_secs);
            return PollOutcome::TimeoutContinue { timeout_secs };
        }

        self.emit_outputs(&details);

        let changed = details.has_changed_since(&ctx.prev_poll_details);

        if status == 200 {
            if changed {
                self.reporter.change_updated(&details);
            }
            self.reporter.approved();
            return PollOutcome::Approved;
        }

        let state = details.status().map(str::to_string);
        match state.as_deref() {
            Some("pending_decision") => {
                if changed {
                    self.reporter.change_updated(&details);
                }
                PollOutcome::Pending { details }
            }
            Some("failed") | Some("error") => PollOutcome::Failed {
                details: details.details(),
            },
            Some("rejected") | Some("canceled_by_user") => {
                if changed {
                    self.reporter.change_updated(&details);
                }
                PollOutcome::Stopped
            }
            // Change request not created yet; keep waiting until the creation timeout.
            _ if details.is_empty() => PollOutcome::Pending { details },
            _ => PollOutcome::UnexpectedState { state },
        }
    }

    fn emit_outputs(&self, details: &ChangeDetails) {
        let fields = [
            (CHANGE_REQUEST_NUMBER, details.number()),
            (CHANGE_REQUEST_SYS_ID, details.sys_id()),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                if let Err(e) = self.outputs.set_output(name, &value) {
                    tracing::warn!(name = name, error = %e, "Failed to set step output");
                }
            }
        }
    }
}

/// Everything except 200 and 201 ends the poll here.
fn classify_status(status: u16, body: Option<&Value>) -> Result<(), TransportError> {
    if !ALLOWED_STATUSES.contains(&status) {
        return Err(TransportError::DisallowedStatus(status));
    }
    match status {
        200 | 201 => Ok(()),
        400 => Err(TransportError::BadRequest {
            message: body
                .and_then(|b| b.pointer("/result/errorMessage"))
                .filter(|m| is_truthy(m))
                .cloned(),
        }),
        401 => Err(TransportError::Unauthorized),
        403 => Err(TransportError::Forbidden),
        404 => Err(TransportError::NotFound),
        _ => Err(TransportError::Server),
    }
}

/// Falsy values (`null`, `false`, `0`, `""`) count as no message at all.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn read_change_details(body: Option<&Value>) -> Result<ChangeDetails, String> {
    let result = body
        .and_then(|b| b.get("result"))
        .ok_or_else(|| "response has no result".to_string())?;
    match result.get("details") {
        Some(Value::Object(fields)) => Ok(ChangeDetails::new(fields.clone())),
        Some(other) => Err(format!("result.details is not an object: {other}")),
        None => Err("result has no details".to_string()),
    }
}
