use crate::files::ProjectFileSet;
use patchloop_engine::JsEngine;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Languages the local engine can take as one concatenated script.
pub const LOCAL_LANGUAGES: &[&str] = &["javascript", "js", "html", "css", "json"];

pub const UNDEFINED_RUNTIME_ERROR: &str = "Undefined runtime error.";

/// Result of one execution attempt. `error` is present exactly when the
/// attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    success: bool,
    output: Vec<String>,
    error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(output: Vec<String>) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(output: Vec<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
        }
    }

    /// Builds an outcome from loosely-shaped data: errors on a success are
    /// dropped and a failure without a message gets a placeholder.
    pub fn from_parts(success: bool, output: Vec<String>, error: Option<String>) -> Self {
        if success {
            return Self::success(output);
        }
        let error = error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| UNDEFINED_RUNTIME_ERROR.to_string());
        Self::failure(output, error)
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn into_parts(self) -> (bool, Vec<String>, Option<String>) {
        (self.success, self.output, self.error)
    }
}

/// The execution machinery failed, as opposed to the program under test.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("local runner failed: {0}")]
    Local(String),
    #[error("remote simulator failed: {0}")]
    Remote(String),
}

pub trait LocalRunner {
    fn run(&mut self, source: &str) -> Result<ExecutionOutcome, RunnerError>;
}

pub trait RemoteSimulator {
    fn simulate(&self, files: &ProjectFileSet) -> Result<ExecutionOutcome, RunnerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Local,
    Remote,
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Local => f.write_str("local"),
            RunnerKind::Remote => f.write_str("remote"),
        }
    }
}

pub fn is_locally_executable(language: &str) -> bool {
    let language = language.trim().to_ascii_lowercase();
    LOCAL_LANGUAGES.contains(&language.as_str())
}

/// Local only when every file's language is on the allow-list.
pub fn select_runner(files: &ProjectFileSet) -> RunnerKind {
    if files.iter().all(|f| is_locally_executable(&f.language)) {
        RunnerKind::Local
    } else {
        RunnerKind::Remote
    }
}

/// Concatenates the set in file order, each file headed by its full path.
pub fn bundle_source(files: &ProjectFileSet) -> String {
    files
        .iter()
        .map(|f| format!("// File: {}\n{}", f.full_path(), f.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn dispatch<L, R>(
    kind: RunnerKind,
    files: &ProjectFileSet,
    local: &mut L,
    remote: &R,
) -> Result<ExecutionOutcome, RunnerError>
where
    L: LocalRunner + ?Sized,
    R: RemoteSimulator + ?Sized,
{
    match kind {
        RunnerKind::Local => local.run(&bundle_source(files)),
        RunnerKind::Remote => remote.simulate(files),
    }
}

/// Runs bundled sources on a [`JsEngine`].
///
/// There is no isolation beyond what the engine provides: no time or memory
/// limit applies.
pub struct EngineRunner<E: JsEngine> {
    pub engine: E,
}

impl<E: JsEngine> EngineRunner<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

impl<E: JsEngine> LocalRunner for EngineRunner<E> {
    fn run(&mut self, source: &str) -> Result<ExecutionOutcome, RunnerError> {
        let out = self
            .engine
            .eval_script(source, "<project>")
            .map_err(|err| RunnerError::Local(format!("{err:#}")))?;
        Ok(match out.thrown {
            Some(error) => ExecutionOutcome::from_parts(false, out.console, Some(error)),
            None => ExecutionOutcome::success(out.console),
        })
    }
}
