//! Diagnostic types for the compilation pipeline.
//!
//! Every pass reports language-level problems into a [`Diagnostics`] sink
//! instead of failing. One sink is created per compilation and never outlives
//! it.

use std::fmt;

use serde::Serialize;
use stencil_core::SourceLocation;

/// Severity level for a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Fails the compilation once the pipeline has finished.
    Error,
    /// Reported to the warning sink; does not fail the compilation.
    Warning,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message from a compilation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// The pass or stage that produced this diagnostic.
    pub phase: String,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn error(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            phase: phase.into(),
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            phase: phase.into(),
            message: message.into(),
            location: None,
        }
    }

    /// Add a location to this diagnostic.
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (at {})", loc)?;
        }
        Ok(())
    }
}

/// Ordered collection of the diagnostics of one compilation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn error(&mut self, phase: &str, message: impl Into<String>, location: SourceLocation) {
        self.report(Diagnostic::error(phase, message).at(location));
    }

    pub fn warning(&mut self, phase: &str, message: impl Into<String>, location: SourceLocation) {
        self.report(Diagnostic::warning(phase, message).at(location));
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity.is_error())
    }

    pub fn has_errors_or_warnings(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity.is_warning())
    }

    /// Re-label every error as a warning.
    pub fn downgrade_errors(&mut self) {
        for diagnostic in &mut self.entries {
            diagnostic.severity = Severity::Warning;
        }
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

/// Render diagnostics one per line.
pub fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use stencil_core::{Point, SourcePath};

    use super::*;

    #[test]
    fn test_diagnostic_with_location() {
        let location = SourceLocation::new(SourcePath::new("a.st"), Point::new(2, 5), Point::new(2, 9));
        let diag = Diagnostic::warning("check-calls", "unused param").at(location);
        insta::assert_snapshot!(diag, @"warning: unused param (at a.st:2:5)");
    }

    #[test]
    fn test_sink_queries() {
        let mut sink = Diagnostics::new();
        assert!(!sink.has_errors_or_warnings());

        sink.report(Diagnostic::warning("optimize", "just a warning"));
        assert!(!sink.has_errors());
        assert!(sink.has_errors_or_warnings());

        sink.report(Diagnostic::error("resolve-types", "bad type"));
        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warning_count(), 1);

        sink.downgrade_errors();
        assert!(!sink.has_errors());
        assert_eq!(sink.warning_count(), 2);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(Severity::Warning.to_string(), "warning");
    }
}
