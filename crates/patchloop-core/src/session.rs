use crate::files::ProjectFileSet;
use crate::fix::FixSuggestion;
use crate::patch::apply_fix;
use crate::runner::{ExecutionOutcome, RunnerKind, UNDEFINED_RUNTIME_ERROR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Repair cycles allowed per run unless configured otherwise.
pub const DEFAULT_MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Idle,
    Analyzing,
    Running,
    Fixing,
    Testing,
    Success,
    Failed,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Success | Status::Failed)
    }

    /// A run is in flight: every status except idle and the terminal ones.
    pub fn is_busy(self) -> bool {
        !matches!(self, Status::Idle | Status::Success | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "IDLE",
            Status::Analyzing => "ANALYZING",
            Status::Running => "RUNNING",
            Status::Fixing => "FIXING",
            Status::Testing => "TESTING",
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Ai,
    Warning,
    Error,
    Success,
}

/// Category of a session log entry. Program failures (`Fault`, `Exhausted`)
/// and repair-machinery failures (`ProviderFailure`, `RunnerFailure`) are
/// separate variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Startup,
    Attempt,
    Output,
    Fault,
    FixRequested,
    FixApplied,
    PatchSkipped,
    Success,
    Exhausted,
    ProviderFailure,
    RunnerFailure,
    Cancelled,
}

impl LogKind {
    pub fn level(self) -> LogLevel {
        match self {
            LogKind::Startup | LogKind::Output => LogLevel::Info,
            LogKind::Attempt | LogKind::FixRequested => LogLevel::Ai,
            LogKind::PatchSkipped | LogKind::Cancelled => LogLevel::Warning,
            LogKind::Fault
            | LogKind::Exhausted
            | LogKind::ProviderFailure
            | LogKind::RunnerFailure => LogLevel::Error,
            LogKind::FixApplied | LogKind::Success => LogLevel::Success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Inputs of the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    AttemptStarted(RunnerKind),
    ExecutionFinished(ExecutionOutcome),
    FixApplied(FixSuggestion),
    ProviderFailed(String),
    RunnerFailed(String),
    Cancelled,
    Reset,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::AttemptStarted(_) => "attempt_started",
            Event::ExecutionFinished(_) => "execution_finished",
            Event::FixApplied(_) => "fix_applied",
            Event::ProviderFailed(_) => "provider_failed",
            Event::RunnerFailed(_) => "runner_failed",
            Event::Cancelled => "cancelled",
            Event::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event {event} is not valid while {status}")]
pub struct TransitionError {
    pub status: Status,
    pub event: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a repair run is already in progress ({0})")]
    Busy(Status),
    #[error("session finished with {0}; reset it before running again")]
    ResetRequired(Status),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Everything one repair run reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    files: ProjectFileSet,
    status: Status,
    retry_count: usize,
    max_retries: usize,
    logs: Vec<LogEntry>,
    last_fix: Option<FixSuggestion>,
}

impl SessionState {
    pub fn new(files: ProjectFileSet, max_retries: usize) -> Self {
        Self {
            files,
            status: Status::Idle,
            retry_count: 0,
            max_retries,
            logs: Vec::new(),
            last_fix: None,
        }
    }

    pub fn files(&self) -> &ProjectFileSet {
        &self.files
    }

    /// Editing access for callers outside a run.
    pub fn files_mut(&mut self) -> Result<&mut ProjectFileSet, SessionError> {
        if self.status.is_busy() {
            return Err(SessionError::Busy(self.status));
        }
        Ok(&mut self.files)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Repair cycles completed in the current run.
    pub fn retry_count(&self) -> usize {
        self.retry_count
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn last_fix(&self) -> Option<&FixSuggestion> {
        self.last_fix.as_ref()
    }

    fn log(&mut self, kind: LogKind, message: impl Into<String>, at: DateTime<Utc>) {
        self.logs.push(LogEntry {
            kind,
            level: kind.level(),
            message: message.into(),
            timestamp: at,
        });
    }

    /// Applies one event. Every accepted event appends at least one log entry
    /// except `Reset`, which clears the log. Rejected events leave the state
    /// untouched.
    pub fn apply(&mut self, event: Event, at: DateTime<Utc>) -> Result<(), TransitionError> {
        match (self.status, event) {
            (Status::Idle, Event::Start) => {
                self.logs.clear();
                self.retry_count = 0;
                self.status = Status::Analyzing;
                self.log(
                    LogKind::Startup,
                    format!(
                        "Session initialized. Scanning {} project file(s)...",
                        self.files.len()
                    ),
                    at,
                );
            }
            (Status::Analyzing | Status::Testing, Event::AttemptStarted(kind)) => {
                let attempt = self.retry_count + 1;
                let message = match kind {
                    RunnerKind::Local => format!("Attempt #{attempt}: local sandbox execution..."),
                    RunnerKind::Remote => format!("Attempt #{attempt}: remote AI simulation..."),
                };
                self.log(LogKind::Attempt, message, at);
                self.status = Status::Running;
            }
            (Status::Running, Event::ExecutionFinished(outcome)) => {
                let (success, output, error) = outcome.into_parts();
                for line in output {
                    self.log(LogKind::Output, line, at);
                }
                if success {
                    self.log(
                        LogKind::Success,
                        format!(
                            "Execution successful after {} repair cycle(s).",
                            self.retry_count
                        ),
                        at,
                    );
                    self.status = Status::Success;
                    return Ok(());
                }

                let error = error.unwrap_or_else(|| UNDEFINED_RUNTIME_ERROR.to_string());
                self.log(LogKind::Fault, format!("Fault identified: {error}"), at);
                if self.retry_count >= self.max_retries {
                    self.log(
                        LogKind::Exhausted,
                        format!(
                            "Maximum autonomous repair attempts reached ({}).",
                            self.max_retries
                        ),
                        at,
                    );
                    self.status = Status::Failed;
                } else {
                    self.log(
                        LogKind::FixRequested,
                        "Routing fault to the fix provider...",
                        at,
                    );
                    self.status = Status::Fixing;
                }
            }
            (Status::Fixing, Event::FixApplied(fix)) => {
                let (files, summary) = apply_fix(&self.files, &fix);
                self.files = files;
                self.log(
                    LogKind::FixApplied,
                    format!(
                        "Patch applied: {} ({} updated, {} created)",
                        fix.explanation,
                        summary.updated.len(),
                        summary.created.len()
                    ),
                    at,
                );
                if !summary.skipped.is_empty() {
                    self.log(
                        LogKind::PatchSkipped,
                        format!(
                            "Ignored patch entries without a usable path: {}",
                            summary.skipped.join(", ")
                        ),
                        at,
                    );
                }
                self.last_fix = Some(fix);
                self.retry_count += 1;
                self.status = Status::Testing;
            }
            (Status::Fixing, Event::ProviderFailed(message)) => {
                self.log(
                    LogKind::ProviderFailure,
                    format!("Repair provider failed: {message}"),
                    at,
                );
                self.status = Status::Failed;
            }
            (Status::Running, Event::RunnerFailed(message)) => {
                self.log(
                    LogKind::RunnerFailure,
                    format!("Execution backend failed: {message}"),
                    at,
                );
                self.status = Status::Failed;
            }
            (status, Event::Cancelled) if status.is_busy() => {
                self.log(LogKind::Cancelled, format!("Run cancelled while {status}."), at);
                self.status = Status::Failed;
            }
            (status, Event::Reset) if !status.is_busy() => {
                self.logs.clear();
                self.retry_count = 0;
                self.last_fix = None;
                self.status = Status::Idle;
            }
            (status, event) => {
                return Err(TransitionError {
                    status,
                    event: event.name(),
                });
            }
        }
        Ok(())
    }
}

/// Pure reducer form of [`SessionState::apply`].
pub fn reduce(
    state: &SessionState,
    event: Event,
    at: DateTime<Utc>,
) -> Result<SessionState, TransitionError> {
    let mut next = state.clone();
    next.apply(event, at)?;
    Ok(next)
}
