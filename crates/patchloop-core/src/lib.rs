mod cancel;
mod files;
mod fix;
mod io;
mod orchestrator;
mod patch;
mod runner;
mod session;

pub use cancel::CancelToken;
pub use files::{FileId, FilePath, ProjectError, ProjectFile, ProjectFileSet, language_for_name};
pub use fix::{FixProvider, FixSuggestion, FixedFile, ProviderError};
pub use io::{ImportFailure, ImportReport, export_dir, import_dir};
pub use orchestrator::{RepairLoop, RepairOptions};
pub use patch::{PatchSummary, apply_fix};
pub use runner::{
    EngineRunner, ExecutionOutcome, LOCAL_LANGUAGES, LocalRunner, RemoteSimulator, RunnerError,
    RunnerKind, UNDEFINED_RUNTIME_ERROR, bundle_source, dispatch, is_locally_executable,
    select_runner,
};
pub use session::{
    DEFAULT_MAX_RETRIES, Event, LogEntry, LogKind, LogLevel, SessionError, SessionState, Status,
    TransitionError, reduce,
};
