use crate::files::{FilePath, ProjectFile, ProjectFileSet};
use crate::fix::FixSuggestion;
use tracing::warn;

/// What a patch did to the file set, in `fixed_files` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub updated: Vec<FilePath>,
    pub created: Vec<FilePath>,
    /// Entries whose name did not normalize to a usable path.
    pub skipped: Vec<String>,
}

/// Merges a fix into `current` without touching it.
///
/// Entries whose full path matches an existing file replace that file's
/// content and keep its id, name, path and language. Any other entry becomes
/// a new file appended at the end. Re-applying a suggestion to its own output
/// changes nothing, but a session still consumes each suggestion exactly once.
pub fn apply_fix(current: &ProjectFileSet, fix: &FixSuggestion) -> (ProjectFileSet, PatchSummary) {
    let mut files = current.clone();
    let mut summary = PatchSummary::default();

    for fixed in &fix.fixed_files {
        let path = match FilePath::parse(&fixed.name) {
            Ok(path) => path,
            Err(err) => {
                warn!(name = %fixed.name, error = %err, "skipping patch entry");
                summary.skipped.push(fixed.name.clone());
                continue;
            }
        };

        match files.position(&path) {
            Some(index) => {
                *files.content_mut(index) = fixed.content.clone();
                summary.updated.push(path);
            }
            None => {
                files.push(ProjectFile::new(&path, fixed.content.clone()));
                summary.created.push(path);
            }
        }
    }

    (files, summary)
}
