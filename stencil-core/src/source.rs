use std::{
    fmt,
    path::{Path, PathBuf},
};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::Fingerprint;

/// Stable identifier of a template source file.
///
/// Paths are compared verbatim; two units with the same path are the same
/// file as far as the compiler is concerned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePath(String);

impl SourcePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The file name without directories, used in debug output.
    pub fn file_name(&self) -> &str {
        self.0.rsplit(['/', '\\']).next().unwrap_or(&self.0)
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourcePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourcePath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Path> for SourcePath {
    fn from(value: &Path) -> Self {
        Self(value.display().to_string())
    }
}

/// One input template file: a stable path plus its UTF-8 content.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    path: SourcePath,
    content: String,
}

impl SourceUnit {
    /// Create a unit from in-memory content.
    pub fn new(path: impl Into<SourcePath>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Read a unit from disk. The file path doubles as the source path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read template source '{}'", path.display()))?;
        Ok(Self::new(path, content))
    }

    /// Read a unit from disk under an explicit source path.
    pub fn from_file_as(file: impl Into<PathBuf>, path: impl Into<SourcePath>) -> Result<Self> {
        let file = file.into();
        let content = std::fs::read_to_string(&file)
            .wrap_err_with(|| format!("failed to read template source '{}'", file.display()))?;
        Ok(Self::new(path, content))
    }

    pub fn path(&self) -> &SourcePath {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Content fingerprint, used as the AST cache key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(SourcePath::new("a/b/c.st").file_name(), "c.st");
        assert_eq!(SourcePath::new("c.st").file_name(), "c.st");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.st");
        std::fs::write(&file, "{namespace a}").unwrap();

        let unit = SourceUnit::from_file(&file).unwrap();
        assert_eq!(unit.content(), "{namespace a}");
        assert!(unit.path().as_str().ends_with("hello.st"));

        let unit = SourceUnit::from_file_as(&file, "logical/hello.st").unwrap();
        assert_eq!(unit.path().as_str(), "logical/hello.st");
    }

    #[test]
    fn test_from_missing_file() {
        let err = SourceUnit::from_file("/definitely/not/here.st").unwrap_err();
        assert!(err.to_string().contains("failed to read template source"));
    }
}
