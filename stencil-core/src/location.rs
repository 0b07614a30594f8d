use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SourcePath;

/// A 1-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Point {
    pub line: u32,
    pub column: u32,
}

impl Point {
    /// Marker for locations that only know their file.
    pub const UNKNOWN: Point = Point { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

/// A range in a source file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: SourcePath,
    pub begin: Point,
    pub end: Point,
    /// Byte range in the file content, when the location came from a parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,
}

impl SourceLocation {
    pub fn new(path: SourcePath, begin: Point, end: Point) -> Self {
        Self {
            path,
            begin,
            end,
            span: None,
        }
    }

    /// A location that only names the file. Dependency templates carry these.
    pub fn file_only(path: SourcePath) -> Self {
        Self::new(path, Point::UNKNOWN, Point::UNKNOWN)
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.span = Some((start, end));
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin.is_known() {
            write!(f, "{}:{}:{}", self.path, self.begin.line, self.begin.column)
        } else {
            write!(f, "{}", self.path)
        }
    }
}

/// Maps byte offsets in a file to line/column points.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            content
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    pub fn point(&self, offset: usize) -> Point {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let start = self.line_starts.get(line).copied().unwrap_or(0);
        Point::new(line as u32 + 1, (offset - start) as u32 + 1)
    }

    pub fn location(&self, path: &SourcePath, start: usize, end: usize) -> SourceLocation {
        SourceLocation::new(path.clone(), self.point(start), self.point(end)).with_span(start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index() {
        let index = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(index.point(0), Point::new(1, 1));
        assert_eq!(index.point(1), Point::new(1, 2));
        assert_eq!(index.point(3), Point::new(2, 1));
        assert_eq!(index.point(6), Point::new(3, 1));
        assert_eq!(index.point(8), Point::new(4, 2));
    }

    #[test]
    fn test_display() {
        let path = SourcePath::new("a.st");
        let loc = SourceLocation::new(path.clone(), Point::new(3, 4), Point::new(3, 9));
        assert_eq!(loc.to_string(), "a.st:3:4");
        assert_eq!(SourceLocation::file_only(path).to_string(), "a.st");
    }
}
