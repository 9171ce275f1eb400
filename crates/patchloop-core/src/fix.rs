use crate::files::ProjectFileSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedFile {
    /// Full logical path. Either echoes an existing file or names a new one.
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    pub fixed_files: Vec<FixedFile>,
    pub explanation: String,
    pub error_analysis: String,
}

/// Failure of the repair channel itself. Always fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("fix provider unavailable: {0}")]
    Unavailable(String),
    #[error("fix provider returned a malformed response: {0}")]
    Malformed(String),
}

pub trait FixProvider {
    /// Proposes full-content replacements for the files that need to change.
    fn fix(
        &self,
        files: &ProjectFileSet,
        error: &str,
        hint: Option<&str>,
    ) -> Result<FixSuggestion, ProviderError>;
}
