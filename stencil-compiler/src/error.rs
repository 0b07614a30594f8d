//! Failure classes of a compilation entry point.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::diagnostics::{Diagnostic, render};

/// The fatal outcomes of a compilation.
///
/// Entry points return `eyre::Result`; callers recover this type with
/// `report.downcast_ref::<CompileError>()`. Failures that are none of these
/// (genuine internal bugs with nothing reported) stay plain `eyre::Report`s.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum CompileError {
    /// At least one error diagnostic was recorded.
    #[error(
        "compilation failed with {} error(s):\n{}",
        .diagnostics.iter().filter(|d| d.severity.is_error()).count(),
        render(.diagnostics)
    )]
    #[diagnostic(code(stencil::compilation_failed))]
    Compilation { diagnostics: Vec<Diagnostic> },

    /// Options that cannot be combined, detected before parsing.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(stencil::configuration))]
    Configuration { message: String },

    /// An unexpected failure after diagnostics had been reported; most
    /// likely a consequence of them.
    #[error("internal compiler error; previously reported:\n{}", render(.diagnostics))]
    #[diagnostic(
        code(stencil::internal),
        help("fix the reported problems first; they probably caused this failure")
    )]
    Internal { diagnostics: Vec<Diagnostic> },
}

impl CompileError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CompileError::Configuration {
            message: message.into(),
        }
    }

    /// Every diagnostic the failure carries, errors and warnings together.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Compilation { diagnostics } | CompileError::Internal { diagnostics } => {
                diagnostics
            }
            CompileError::Configuration { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_message() {
        let err = CompileError::Compilation {
            diagnostics: vec![
                Diagnostic::error("check-calls", "unknown template 'a.b'"),
                Diagnostic::warning("optimize", "dead branch"),
            ],
        };
        insta::assert_snapshot!(err, @r"
        compilation failed with 1 error(s):
        error: unknown template 'a.b'
        warning: dead branch
        ");
        assert_eq!(err.diagnostics().len(), 2);
    }

    #[test]
    fn test_configuration_has_no_diagnostics() {
        let err = CompileError::configuration("nope");
        assert_eq!(err.to_string(), "invalid configuration: nope");
        assert!(err.diagnostics().is_empty());
    }
}
