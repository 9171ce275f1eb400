use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("file path is empty")]
    EmptyPath,
    #[error("a file already exists at {0}")]
    DuplicatePath(String),
    #[error("no file with id {0}")]
    UnknownFile(FileId),
    #[error("path {0} escapes the project root")]
    UnsafePath(String),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("failed {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Session-scoped file identity. Never used for matching patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Normalized full logical path of a project file.
///
/// Backslashes become `/`, empty and `.` segments are dropped and there is no
/// leading separator, so `"./utils//helpers.py"` and `"utils/helpers.py"`
/// compare equal. Other segments are kept byte for byte, surrounding
/// whitespace included; a whitespace-only segment is rejected. Comparison is case-sensitive. `..` segments are kept
/// verbatim; [`FilePath::escapes_root`] reports them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePath(String);

impl FilePath {
    pub fn parse(raw: &str) -> Result<Self, ProjectError> {
        let replaced = raw.replace('\\', "/");
        let segments: Vec<&str> = replaced
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.is_empty() || segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(ProjectError::EmptyPath);
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base file name: the last segment.
    pub fn name(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Directory prefix with a trailing `/`, or empty at the project root.
    pub fn dir(&self) -> String {
        self.0
            .rsplit_once('/')
            .map_or_else(String::new, |(dir, _)| format!("{dir}/"))
    }

    pub fn escapes_root(&self) -> bool {
        self.0.split('/').any(|segment| segment == "..")
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FilePath {
    type Error = ProjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FilePath> for String {
    fn from(value: FilePath) -> Self {
        value.0
    }
}

/// Language tag derived from a file name's extension, `"text"` without one.
pub fn language_for_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => "text".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: FileId,
    pub name: String,
    /// Directory prefix: empty at the root, otherwise ends with `/`.
    pub path: String,
    pub content: String,
    pub language: String,
}

impl ProjectFile {
    pub fn new(path: &FilePath, content: impl Into<String>) -> Self {
        let name = path.name().to_string();
        Self {
            id: FileId::new(),
            language: language_for_name(&name),
            name,
            path: path.dir(),
            content: content.into(),
        }
    }

    pub fn full_path(&self) -> String {
        format!("{}{}", self.path, self.name)
    }

    pub fn logical_path(&self) -> Result<FilePath, ProjectError> {
        FilePath::parse(&self.full_path())
    }
}

/// Ordered collection of project files keyed by full logical path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectFileSet {
    files: Vec<ProjectFile>,
}

impl ProjectFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files(files: Vec<ProjectFile>) -> Result<Self, ProjectError> {
        let mut set = Self::new();
        for file in files {
            let path = file.logical_path()?;
            if set.find(&path).is_some() {
                return Err(ProjectError::DuplicatePath(path.to_string()));
            }
            set.files.push(file);
        }
        Ok(set)
    }

    /// Adds a file at `full_path`, splitting it into directory and name.
    pub fn add(&mut self, full_path: &str, content: impl Into<String>) -> Result<FileId, ProjectError> {
        let path = FilePath::parse(full_path)?;
        if self.find(&path).is_some() {
            return Err(ProjectError::DuplicatePath(path.to_string()));
        }
        let file = ProjectFile::new(&path, content);
        let id = file.id;
        self.files.push(file);
        Ok(id)
    }

    pub fn remove(&mut self, id: FileId) -> Result<ProjectFile, ProjectError> {
        let index = self
            .files
            .iter()
            .position(|f| f.id == id)
            .ok_or(ProjectError::UnknownFile(id))?;
        Ok(self.files.remove(index))
    }

    pub fn set_content(&mut self, id: FileId, content: impl Into<String>) -> Result<(), ProjectError> {
        let file = self
            .files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(ProjectError::UnknownFile(id))?;
        file.content = content.into();
        Ok(())
    }

    pub fn get(&self, id: FileId) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn find(&self, path: &FilePath) -> Option<&ProjectFile> {
        self.position(path).map(|index| &self.files[index])
    }

    pub(crate) fn position(&self, path: &FilePath) -> Option<usize> {
        self.files
            .iter()
            .position(|f| f.logical_path().is_ok_and(|own| &own == path))
    }

    pub(crate) fn content_mut(&mut self, index: usize) -> &mut String {
        &mut self.files[index].content
    }

    pub(crate) fn push(&mut self, file: ProjectFile) {
        self.files.push(file);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProjectFile> {
        self.files.iter()
    }

    pub fn as_slice(&self) -> &[ProjectFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Archive view of the set: `(path + name, content)` in file order.
    pub fn export_entries(&self) -> Vec<(String, &str)> {
        self.files
            .iter()
            .map(|f| (f.full_path(), f.content.as_str()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ProjectFileSet {
    type Item = &'a ProjectFile;
    type IntoIter = std::slice::Iter<'a, ProjectFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.iter()
    }
}
