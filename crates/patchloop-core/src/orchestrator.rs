use crate::cancel::CancelToken;
use crate::fix::FixProvider;
use crate::runner::{LocalRunner, RemoteSimulator, UNDEFINED_RUNTIME_ERROR, dispatch, select_runner};
use crate::session::{Event, LogEntry, SessionError, SessionState, Status};
use chrono::Utc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const SETTLE_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// Pause between applying a fix and the next attempt. May be zero.
    pub settle_delay: Duration,
    /// Free-form context forwarded with every fix request.
    pub hint: Option<String>,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            hint: None,
        }
    }
}

/// Drives attempt, fix request, patch and retry until the session reaches a
/// terminal status.
pub struct RepairLoop<L, R, F>
where
    L: LocalRunner,
    R: RemoteSimulator,
    F: FixProvider,
{
    pub local: L,
    pub remote: R,
    pub fixer: F,
    pub options: RepairOptions,
}

impl<L, R, F> RepairLoop<L, R, F>
where
    L: LocalRunner,
    R: RemoteSimulator,
    F: FixProvider,
{
    /// Runs one repair loop over `session`, which must be idle.
    ///
    /// `observer` sees every log entry as soon as it is recorded. Cancellation
    /// is checked before and after each attempt, after each fix request, and
    /// during the settling pause.
    pub fn run(
        &mut self,
        session: &mut SessionState,
        cancel: &CancelToken,
        observer: &mut dyn FnMut(&LogEntry),
    ) -> Result<Status, SessionError> {
        let status = session.status();
        if status.is_busy() {
            return Err(SessionError::Busy(status));
        }
        if status.is_terminal() {
            return Err(SessionError::ResetRequired(status));
        }

        info!(
            files = session.files().len(),
            max_retries = session.max_retries(),
            "starting repair run"
        );
        record(session, observer, Event::Start)?;

        loop {
            if cancel.is_cancelled() {
                record(session, observer, Event::Cancelled)?;
                break;
            }

            let kind = select_runner(session.files());
            record(session, observer, Event::AttemptStarted(kind))?;
            let attempt = dispatch(kind, session.files(), &mut self.local, &self.remote);

            if cancel.is_cancelled() {
                record(session, observer, Event::Cancelled)?;
                break;
            }

            let outcome = match attempt {
                Ok(outcome) => outcome,
                Err(err) => {
                    record(session, observer, Event::RunnerFailed(err.to_string()))?;
                    break;
                }
            };
            let error_text = outcome
                .error()
                .unwrap_or(UNDEFINED_RUNTIME_ERROR)
                .to_string();
            record(session, observer, Event::ExecutionFinished(outcome))?;
            if session.status() != Status::Fixing {
                break;
            }

            let fix = self
                .fixer
                .fix(session.files(), &error_text, self.options.hint.as_deref());

            if cancel.is_cancelled() {
                record(session, observer, Event::Cancelled)?;
                break;
            }

            match fix {
                Ok(fix) => record(session, observer, Event::FixApplied(fix))?,
                Err(err) => {
                    record(session, observer, Event::ProviderFailed(err.to_string()))?;
                    break;
                }
            }

            if !settle(self.options.settle_delay, cancel) {
                record(session, observer, Event::Cancelled)?;
                break;
            }
        }

        info!(
            status = %session.status(),
            retry_count = session.retry_count(),
            "repair run finished"
        );
        Ok(session.status())
    }
}

fn record(
    session: &mut SessionState,
    observer: &mut dyn FnMut(&LogEntry),
    event: Event,
) -> Result<(), SessionError> {
    // `Start` clears the log, so everything after it is new.
    let seen = match event {
        Event::Start => 0,
        _ => session.logs().len(),
    };
    let name = event.name();
    session.apply(event, Utc::now())?;
    debug!(event = name, status = %session.status(), "session transition");
    for entry in &session.logs()[seen..] {
        observer(entry);
    }
    Ok(())
}

/// Sleeps for `delay` in small slices. Returns `false` when cancelled.
fn settle(delay: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SETTLE_SLICE));
    }
}
