use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::interpret::{Interpreter, PollContext};
use crate::outcome::PollOutcome;
use crate::request::ChangeStatusRequest;
use crate::transport::ChangeStatusSource;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Change request still pending after {waited_secs} seconds")]
    WaitExceeded { waited_secs: u64 },
}

/// Timing of the outer poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_wait: Option<Duration>,
}

/// Polls one change request until the interpreter reaches a terminal outcome.
pub struct ChangeGate<S> {
    source: S,
    request: ChangeStatusRequest,
    interpreter: Interpreter,
    context: PollContext,
    polls: u64,
}

impl<S: ChangeStatusSource> ChangeGate<S> {
    pub fn new(
        source: S,
        request: ChangeStatusRequest,
        interpreter: Interpreter,
        context: PollContext,
    ) -> Self {
        Self {
            source,
            request,
            interpreter,
            context,
            polls: 0,
        }
    }

    pub fn context(&self) -> &PollContext {
        &self.context
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// One request, one interpretation.
    ///
    /// The previous-poll snapshot is replaced whenever the service reports a
    /// pending change; the creation start time is never touched.
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.polls += 1;
        tracing::debug!(poll = self.polls, request = ?self.request, "Polling change status");

        let result = self.source.fetch(&self.request).await;
        let outcome = self.interpreter.interpret(result, &self.context, Utc::now());

        if let PollOutcome::Pending { details } = &outcome {
            self.context.prev_poll_details = details.clone();
        }

        tracing::debug!(poll = self.polls, outcome = ?outcome, "Poll finished");
        outcome
    }

    /// Poll until a terminal outcome, sleeping `schedule.interval` between polls.
    pub async fn run(&mut self, schedule: PollSchedule) -> Result<PollOutcome, GateError> {
        let started = tokio::time::Instant::now();

        loop {
            let outcome = self.poll_once().await;
            if outcome.is_terminal() {
                tracing::info!(polls = self.polls, outcome = ?outcome, "Change gate finished");
                return Ok(outcome);
            }

            if let Some(max_wait) = schedule.max_wait {
                if started.elapsed() + schedule.interval > max_wait {
                    return Err(GateError::WaitExceeded {
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            tracing::info!(
                interval_secs = schedule.interval.as_secs(),
                "Change request pending, polling again"
            );
            tokio::time::sleep(schedule.interval).await;
        }
    }
}
