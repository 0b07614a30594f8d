use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a file's templates come from relative to the current compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    /// Parsed from source in this compilation.
    #[default]
    Source,
    /// A direct dependency, supplied as a compilation unit.
    Dependency,
    /// A transitive dependency, supplied as a compilation unit.
    ///
    /// Templates from indirect dependencies are visible for type information
    /// but may not be called directly.
    IndirectDependency,
}

impl FileKind {
    pub fn is_dependency(&self) -> bool {
        !matches!(self, FileKind::Source)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Source => write!(f, "source"),
            FileKind::Dependency => write!(f, "dependency"),
            FileKind::IndirectDependency => write!(f, "indirect dependency"),
        }
    }
}
