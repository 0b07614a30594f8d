//! Scanning helpers for the text inside one `{command ...}` tag.

use stencil_ast::Span;

use crate::error::{Result, SourceContext};

/// A `name="value"` pair inside a command.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attribute<'s> {
    pub name: &'s str,
    pub value: &'s str,
    pub span: Span,
}

pub(crate) struct Cursor<'s> {
    src: &'s str,
    base: usize,
    pos: usize,
}

impl<'s> Cursor<'s> {
    /// `base` is the byte offset of `src` within the file.
    pub(crate) fn new(src: &'s str, base: usize) -> Self {
        Self { src, base, pos: 0 }
    }

    /// Absolute offset of the cursor.
    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    pub(crate) fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    pub(crate) fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos == self.src.len()
    }

    pub(crate) fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// A run of name characters: letters, digits, `_`, `.`, `-` and a
    /// leading `$`.
    pub(crate) fn word(&mut self) -> Option<(&'s str, Span)> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(i, c)| {
                !(c.is_ascii_alphanumeric()
                    || matches!(c, '_' | '.' | '-')
                    || (*i == 0 && *c == '$'))
            })
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        if len == 0 {
            return None;
        }
        let start = self.offset();
        self.pos += len;
        Some((&rest[..len], Span::new(start, start + len)))
    }

    pub(crate) fn expect_word(&mut self, ctx: &SourceContext, expected: &str) -> Result<(&'s str, Span)> {
        match self.word() {
            Some(word) => Ok(word),
            None => Err(self.unexpected_here(ctx, expected)),
        }
    }

    /// Everything up to (not including) `stop`, or the rest of the text.
    pub(crate) fn take_until(&mut self, stop: char) -> (&'s str, usize) {
        let rest = self.rest();
        let len = rest.find(stop).unwrap_or(rest.len());
        let start = self.offset();
        self.pos += len;
        (&rest[..len], start)
    }

    /// Take the remaining text, returning it with its absolute offset.
    pub(crate) fn take_rest(&mut self) -> (&'s str, usize) {
        let start = self.offset();
        let rest = self.rest();
        self.pos = self.src.len();
        (rest, start)
    }

    /// `name="value"` pairs up to the end of the text.
    pub(crate) fn attributes(&mut self, ctx: &SourceContext) -> Result<Vec<Attribute<'s>>> {
        let mut attributes = Vec::new();
        while !self.at_end() {
            let (name, name_span) = self.expect_word(ctx, "an attribute")?;
            if !self.eat("=") {
                return Err(self.unexpected_here(ctx, "'=' after the attribute name"));
            }
            if !self.eat("\"") {
                return Err(self.unexpected_here(ctx, "a double-quoted attribute value"));
            }
            let (value, _) = self.take_until('"');
            if !self.rest().starts_with('"') {
                return Err(ctx.invalid("unterminated attribute value", (name_span.start, self.offset() - name_span.start)));
            }
            self.pos += 1;
            attributes.push(Attribute {
                name,
                value,
                span: Span::new(name_span.start, self.offset()),
            });
        }
        Ok(attributes)
    }

    fn unexpected_here(&mut self, ctx: &SourceContext, expected: &str) -> Box<crate::ParseError> {
        self.skip_ws();
        match self.rest().chars().next() {
            Some(c) => ctx.unexpected(format!("'{}'", c), expected, (self.offset(), c.len_utf8())),
            None => ctx.unexpected("end of command", expected, (self.offset(), 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_and_attributes() {
        let ctx = SourceContext::new("", "test.st");
        let mut cursor = Cursor::new(".hello visibility=\"private\" variant=\"'x'\"", 10);
        assert_eq!(cursor.word().map(|w| w.0), Some(".hello"));
        let attrs = cursor.attributes(&ctx).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].name, "visibility");
        assert_eq!(attrs[0].value, "private");
        assert_eq!(attrs[1].value, "'x'");
        assert_eq!(attrs[0].span, Span::new(17, 37));
    }

    #[test]
    fn test_attribute_errors() {
        let ctx = SourceContext::new("", "test.st");
        let err = Cursor::new("kind=text", 0).attributes(&ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected a double-quoted attribute value, found 't'"
        );
    }
}
