use crate::files::{FilePath, ProjectError, ProjectFileSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// A file that could not be loaded. Import carries on without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub files: ProjectFileSet,
    pub failures: Vec<ImportFailure>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

/// Loads every regular, non-hidden file below `root` in file-name order.
pub fn import_dir(root: &Path) -> Result<ImportReport, ProjectError> {
    if !root.is_dir() {
        return Err(ProjectError::NotADirectory(root.to_path_buf()));
    }

    let mut report = ImportReport::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                report.failures.push(ImportFailure {
                    path,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(relative) = relative_path(root, path) else {
            report.failures.push(ImportFailure {
                path: path.to_path_buf(),
                reason: "path is not valid UTF-8".to_string(),
            });
            continue;
        };

        let loaded = fs::read(path)
            .map_err(|err| err.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|_| "content is not valid UTF-8".to_string()))
            .and_then(|content| {
                report
                    .files
                    .add(&relative, content)
                    .map(|_| ())
                    .map_err(|err| err.to_string())
            });
        if let Err(reason) = loaded {
            warn!(path = %path.display(), %reason, "failed importing file");
            report.failures.push(ImportFailure {
                path: path.to_path_buf(),
                reason,
            });
        }
    }

    Ok(report)
}

/// Writes every file beneath `root` at its full path and returns what was
/// written, in file order.
pub fn export_dir(files: &ProjectFileSet, root: &Path) -> Result<Vec<PathBuf>, ProjectError> {
    let mut written = Vec::with_capacity(files.len());
    for (full_path, content) in files.export_entries() {
        let logical = FilePath::parse(&full_path)?;
        if logical.escapes_root() {
            return Err(ProjectError::UnsafePath(logical.to_string()));
        }

        let target = logical
            .as_str()
            .split('/')
            .fold(root.to_path_buf(), |acc, part| acc.join(part));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| ProjectError::Io {
                action: "creating directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, content).map_err(|source| ProjectError::Io {
            action: "writing",
            path: target.clone(),
            source,
        })?;
        written.push(target);
    }
    Ok(written)
}
