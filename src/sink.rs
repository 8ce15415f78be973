use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::details::ChangeDetails;
use crate::error::{AppError, Result};

pub const CHANGE_REQUEST_NUMBER: &str = "change-request-number";
pub const CHANGE_REQUEST_SYS_ID: &str = "change-request-sys-id";

/// Destination for named step outputs.
pub trait OutputSink: Send + Sync {
    fn set_output(&self, name: &str, value: &str) -> Result<()>;
}

/// Console feedback for humans watching the pipeline log.
pub trait Reporter: Send + Sync {
    /// The change record differs from the previous poll.
    fn change_updated(&self, details: &ChangeDetails);
    fn approved(&self);
    fn creation_timeout_continue(&self, timeout_secs: u64);
}

/// GitHub Actions step outputs, appended to the `GITHUB_OUTPUT` file.
pub struct GithubOutputFile {
    path: PathBuf,
}

impl GithubOutputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Sink for the current step, if running under GitHub Actions.
    pub fn from_env() -> Option<Self> {
        std::env::var_os("GITHUB_OUTPUT")
            .filter(|p| !p.is_empty())
            .map(Self::new)
    }
}

impl OutputSink for GithubOutputFile {
    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                AppError::Output(format!(
                    "Failed to open output file {}: {e}",
                    self.path.display()
                ))
            })?;

        let entry = if value.contains('\n') {
            let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
            let delimiter = format!("ghadelimiter_{nanos}");
            format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
        } else {
            format!("{name}={value}\n")
        };

        file.write_all(entry.as_bytes())?;
        tracing::debug!(name = name, value = value, "Set step output");
        Ok(())
    }
}

/// Fallback sink when no CI host is present: outputs only reach the log.
pub struct LogOutputSink;

impl OutputSink for LogOutputSink {
    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        tracing::info!(name = name, value = value, "Step output");
        Ok(())
    }
}

/// Records outputs in the order they were set.
#[derive(Default)]
pub struct MemorySink {
    outputs: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<(String, String)> {
        self.outputs
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.outputs()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

impl OutputSink for MemorySink {
    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        self.outputs
            .lock()
            .map_err(|e| AppError::Internal(format!("Output sink lock poisoned: {e}")))?
            .push((name.to_string(), value.to_string()));
        Ok(())
    }
}

const GREEN_BOLD: &str = "\x1b[1m\x1b[32m";
const ORANGE: &str = "\x1b[38;5;214m";
const RESET: &str = "\x1b[0m";

/// Colored console lines in the style of the DevOps change actions.
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn change_updated(&self, details: &ChangeDetails) {
        tracing::info!(
            number = details.number().as_deref().unwrap_or(""),
            status = details.status().unwrap_or(""),
            "Change request updated"
        );
        println!("\n {GREEN_BOLD}{}{RESET}", details.to_json());
    }

    fn approved(&self) {
        tracing::info!("Change is approved");
        println!("\n****Change is Approved.");
    }

    fn creation_timeout_continue(&self, timeout_secs: u64) {
        tracing::warn!(timeout_secs = timeout_secs, "Change creation timed out, continuing");
        eprintln!(
            "\n    {ORANGE} Timeout occurred after {timeout_secs} seconds but pipeline will continue since abortOnChangeCreationFailure flag is false {RESET}"
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    ChangeUpdated(ChangeDetails),
    Approved,
    CreationTimeoutContinue(u64),
}

/// Keeps every report for later inspection.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Reporter for RecordingReporter {
    fn change_updated(&self, details: &ChangeDetails) {
        self.push(ReportEvent::ChangeUpdated(details.clone()));
    }

    fn approved(&self) {
        self.push(ReportEvent::Approved);
    }

    fn creation_timeout_continue(&self, timeout_secs: u64) {
        self.push(ReportEvent::CreationTimeoutContinue(timeout_secs));
    }
}
