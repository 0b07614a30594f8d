use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Result type for parser operations (boxed to reduce size on stack)
pub type Result<T> = std::result::Result<T, Box<ParseError>>;

/// Source context for error reporting.
///
/// Holds the file content and name so error factories only need a span.
#[derive(Debug, Clone)]
pub struct SourceContext {
    src: String,
    filename: String,
}

impl SourceContext {
    pub fn new(src: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            filename: filename.into(),
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Create a NamedSource for miette error reporting.
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.filename, self.src.clone())
    }

    pub fn unexpected(
        &self,
        found: impl Into<String>,
        expected: impl Into<String>,
        span: impl Into<SourceSpan>,
    ) -> Box<ParseError> {
        Box::new(ParseError::Unexpected {
            src: self.named_source(),
            span: span.into(),
            found: found.into(),
            expected: expected.into(),
        })
    }

    pub fn unexpected_eof(&self, expected: impl Into<String>) -> Box<ParseError> {
        let end = self.src.len();
        Box::new(ParseError::UnexpectedEof {
            src: self.named_source(),
            span: (end, 0).into(),
            expected: expected.into(),
        })
    }

    pub fn unclosed(&self, command: impl Into<String>, span: impl Into<SourceSpan>) -> Box<ParseError> {
        Box::new(ParseError::Unclosed {
            src: self.named_source(),
            span: span.into(),
            command: command.into(),
        })
    }

    pub fn unknown_command(
        &self,
        command: impl Into<String>,
        span: impl Into<SourceSpan>,
    ) -> Box<ParseError> {
        Box::new(ParseError::UnknownCommand {
            src: self.named_source(),
            span: span.into(),
            command: command.into(),
        })
    }

    pub fn misplaced(
        &self,
        command: impl Into<String>,
        context: impl Into<String>,
        span: impl Into<SourceSpan>,
    ) -> Box<ParseError> {
        Box::new(ParseError::Misplaced {
            src: self.named_source(),
            span: span.into(),
            command: command.into(),
            context: context.into(),
        })
    }

    pub fn invalid(&self, message: impl Into<String>, span: impl Into<SourceSpan>) -> Box<ParseError> {
        Box::new(ParseError::Invalid {
            src: self.named_source(),
            span: span.into(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(stencil::syntax::unexpected))]
    Unexpected {
        #[source_code]
        src: NamedSource<String>,
        #[label("unexpected {found}")]
        span: SourceSpan,
        found: String,
        expected: String,
    },

    #[error("unexpected end of file, expected {expected}")]
    #[diagnostic(code(stencil::syntax::eof))]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,
        #[label("file ends here")]
        span: SourceSpan,
        expected: String,
    },

    #[error("'{command}' is never closed")]
    #[diagnostic(
        code(stencil::syntax::unclosed),
        help("add a matching '{{/{command}}}'")
    )]
    Unclosed {
        #[source_code]
        src: NamedSource<String>,
        #[label("opened here")]
        span: SourceSpan,
        command: String,
    },

    #[error("unknown command '{command}'")]
    #[diagnostic(code(stencil::syntax::unknown_command))]
    UnknownCommand {
        #[source_code]
        src: NamedSource<String>,
        #[label("not a command")]
        span: SourceSpan,
        command: String,
    },

    #[error("'{command}' is not allowed {context}")]
    #[diagnostic(code(stencil::syntax::misplaced))]
    Misplaced {
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: SourceSpan,
        command: String,
        context: String,
    },

    #[error("{message}")]
    #[diagnostic(code(stencil::syntax::invalid))]
    Invalid {
        #[source_code]
        src: NamedSource<String>,
        #[label("{message}")]
        span: SourceSpan,
        message: String,
    },
}

impl ParseError {
    /// Byte range the error points at.
    pub fn span(&self) -> SourceSpan {
        match self {
            ParseError::Unexpected { span, .. }
            | ParseError::UnexpectedEof { span, .. }
            | ParseError::Unclosed { span, .. }
            | ParseError::UnknownCommand { span, .. }
            | ParseError::Misplaced { span, .. }
            | ParseError::Invalid { span, .. } => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let ctx = SourceContext::new("{if true}x", "a.st");
        insta::assert_snapshot!(ctx.unclosed("if", (0, 9)), @"'if' is never closed");
        insta::assert_snapshot!(
            ctx.unexpected("'}'", "an expression", (4, 1)),
            @"expected an expression, found '}'"
        );
        insta::assert_snapshot!(ctx.unexpected_eof("'{/if}'"), @"unexpected end of file, expected '{/if}'");
    }

    #[test]
    fn test_eof_points_at_end() {
        let ctx = SourceContext::new("{if true}x", "a.st");
        let span = ctx.unexpected_eof("'{/if}'").span();
        assert_eq!(span.offset(), 10);
        assert_eq!(span.len(), 0);
    }
}
