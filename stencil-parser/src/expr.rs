//! Expression tokenizer and precedence-climbing parser.

use stencil_ast::{BinaryOp, ExprId, ExprKind, FileNode, Literal, PrintDirective, Span, UnaryOp};

use crate::error::{Result, SourceContext};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Var(String),
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(&'static str),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Var(name) => format!("'${}'", name),
            Tok::Ident(name) => format!("'{}'", name),
            Tok::Int(i) => format!("'{}'", i),
            Tok::Float(f) => format!("'{}'", f),
            Tok::Str(_) => "a string".to_string(),
            Tok::Punct(p) => format!("'{}'", p),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    span: Span,
}

const PUNCTS: &[&str] = &[
    "<=", ">=", "==", "!=", "(", ")", "[", "]", ",", ".", ":", "|", "*", "/", "%", "+", "-", "<",
    ">", "=",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(ctx: &SourceContext, src: &str, base: usize) -> Result<Vec<Token>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    let ident_len = |from: usize| {
        src[from..]
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(src.len() - from)
    };

    while pos < src.len() {
        let rest = &src[pos..];
        let Some(c) = rest.chars().next() else { break };
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        let start = pos;

        let tok = if c == '$' {
            let len = ident_len(pos + 1);
            if len == 0 {
                return Err(ctx.invalid("expected a variable name after '$'", (base + pos, 1)));
            }
            pos += 1 + len;
            Tok::Var(src[start + 1..pos].to_string())
        } else if is_ident_start(c) {
            pos += ident_len(pos);
            // Dotted names: `app.MAX_ITEMS`, `my.fn`
            while bytes.get(pos) == Some(&b'.')
                && src[pos + 1..].chars().next().is_some_and(is_ident_start)
            {
                pos += 1 + ident_len(pos + 1);
            }
            Tok::Ident(src[start..pos].to_string())
        } else if c.is_ascii_digit() {
            pos += src[pos..]
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(src.len() - pos);
            let is_float = bytes.get(pos) == Some(&b'.')
                && bytes.get(pos + 1).is_some_and(|b| b.is_ascii_digit());
            if is_float {
                pos += 1;
                pos += src[pos..]
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(src.len() - pos);
                let text = &src[start..pos];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ctx.invalid(format!("invalid number '{}'", text), (base + start, pos - start)))?;
                Tok::Float(value)
            } else {
                let text = &src[start..pos];
                let value = text
                    .parse::<i64>()
                    .map_err(|_| ctx.invalid(format!("integer '{}' is out of range", text), (base + start, pos - start)))?;
                Tok::Int(value)
            }
        } else if c == '\'' || c == '"' {
            let (value, len) = scan_string(ctx, rest, base + pos)?;
            pos += len;
            Tok::Str(value)
        } else if let Some(p) = PUNCTS.iter().find(|p| rest.starts_with(**p)) {
            pos += p.len();
            Tok::Punct(*p)
        } else {
            return Err(ctx.unexpected(
                format!("'{}'", c),
                "an expression",
                (base + pos, c.len_utf8()),
            ));
        };

        tokens.push(Token {
            tok,
            span: Span::new(base + start, base + pos),
        });
    }

    Ok(tokens)
}

/// Scan a quoted string at the start of `src`, returning its value and byte length.
fn scan_string(ctx: &SourceContext, src: &str, offset: usize) -> Result<(String, usize)> {
    let mut chars = src.char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(ctx.unexpected_eof("a string"));
    };
    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let Some((_, escaped)) = chars.next() else { break };
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            c if c == quote => return Ok((value, i + 1)),
            c => value.push(c),
        }
    }
    Err(ctx.invalid("unterminated string literal", (offset, src.len())))
}

/// Parses expressions from one command's text, allocating into a file's arena.
pub(crate) struct ExprParser<'a> {
    ctx: &'a SourceContext,
    file: &'a mut FileNode,
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl<'a> ExprParser<'a> {
    /// `base` is the byte offset of `src` within the file.
    pub(crate) fn new(
        ctx: &'a SourceContext,
        file: &'a mut FileNode,
        src: &str,
        base: usize,
    ) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(ctx, src, base)?,
            ctx,
            file,
            pos: 0,
            end: base + src.len(),
        })
    }

    pub(crate) fn parse_expr(&mut self) -> Result<ExprId> {
        self.parse_binary(0)
    }

    /// `|name` or `|name:arg1,arg2`, repeated.
    pub(crate) fn parse_print_directives(&mut self) -> Result<Vec<PrintDirective>> {
        let mut directives = Vec::new();
        while let Some(bar) = self.eat_punct("|") {
            let (name, name_span) = self.expect_ident("a print directive name")?;
            let mut args = Vec::new();
            let mut span = bar.to(name_span);
            if self.eat_punct(":").is_some() {
                loop {
                    let arg = self.parse_expr()?;
                    span = span.to(self.file.expr(arg).span);
                    args.push(arg);
                    if self.eat_punct(",").is_none() {
                        break;
                    }
                }
            }
            directives.push(PrintDirective { name, args, span });
        }
        Ok(directives)
    }

    pub(crate) fn expect_var(&mut self) -> Result<(String, Span)> {
        match self.next() {
            Some(Token {
                tok: Tok::Var(name),
                span,
            }) => Ok((name, span)),
            other => Err(self.unexpected(other, "a '$' variable")),
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        match self.next() {
            Some(Token {
                tok: Tok::Ident(name),
                ..
            }) if name == keyword => Ok(()),
            other => Err(self.unexpected(other, &format!("'{}'", keyword))),
        }
    }

    pub(crate) fn expect_punct(&mut self, punct: &'static str) -> Result<Span> {
        match self.next() {
            Some(Token {
                tok: Tok::Punct(p),
                span,
            }) if p == punct => Ok(span),
            other => Err(self.unexpected(other, &format!("'{}'", punct))),
        }
    }

    /// Fail unless every token was consumed.
    pub(crate) fn finish(mut self) -> Result<()> {
        match self.next() {
            None => Ok(()),
            other => Err(self.unexpected(other, "end of command")),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_is_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Tok::Punct(p)) if *p == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> Option<Span> {
        if self.peek_is_punct(punct) {
            self.next().map(|t| t.span)
        } else {
            None
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Span)> {
        match self.next() {
            Some(Token {
                tok: Tok::Ident(name),
                span,
            }) => Ok((name, span)),
            other => Err(self.unexpected(other, expected)),
        }
    }

    fn unexpected(&self, token: Option<Token>, expected: &str) -> Box<crate::ParseError> {
        match token {
            Some(token) => {
                let span = token.span;
                self.ctx
                    .unexpected(token.tok.describe(), expected, (span.start, span.end - span.start))
            }
            None => self
                .ctx
                .unexpected("end of command", expected, (self.end, 0)),
        }
    }

    fn alloc(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.file.alloc_expr(kind, span)
    }

    fn span_of(&self, id: ExprId) -> Span {
        self.file.expr(id).span
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        Some(match self.peek()? {
            Tok::Punct("*") => BinaryOp::Mul,
            Tok::Punct("/") => BinaryOp::Div,
            Tok::Punct("%") => BinaryOp::Mod,
            Tok::Punct("+") => BinaryOp::Add,
            Tok::Punct("-") => BinaryOp::Sub,
            Tok::Punct("<") => BinaryOp::Lt,
            Tok::Punct(">") => BinaryOp::Gt,
            Tok::Punct("<=") => BinaryOp::Le,
            Tok::Punct(">=") => BinaryOp::Ge,
            Tok::Punct("==") => BinaryOp::Eq,
            Tok::Punct("!=") => BinaryOp::Ne,
            Tok::Ident(name) if name == "and" => BinaryOp::And,
            Tok::Ident(name) if name == "or" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<ExprId> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek_binary_op() {
            if op.precedence() <= min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(op.precedence())?;
            let span = self.span_of(lhs).to(self.span_of(rhs));
            lhs = self.alloc(ExprKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprId> {
        let op = match self.tokens.get(self.pos) {
            Some(Token {
                tok: Tok::Ident(name),
                span,
            }) if name == "not" => Some((UnaryOp::Not, *span)),
            Some(Token {
                tok: Tok::Punct("-"),
                span,
            }) => Some((UnaryOp::Neg, *span)),
            _ => None,
        };
        match op {
            Some((op, start)) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                let span = start.to(self.span_of(operand));
                Ok(self.alloc(ExprKind::Unary { op, operand }, span))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<ExprId> {
        let mut expr = self.parse_primary()?;
        while self.eat_punct(".").is_some() {
            let (path, path_span) = self.expect_ident("a field or method name")?;
            let segments: Vec<&str> = path.split('.').collect();
            for (i, segment) in segments.iter().enumerate() {
                let is_last = i + 1 == segments.len();
                let span = self.span_of(expr).to(path_span);
                if is_last && self.peek_is_punct("(") {
                    let (args, close) = self.parse_args()?;
                    expr = self.alloc(
                        ExprKind::MethodCall {
                            base: expr,
                            name: segment.to_string(),
                            args,
                            callee: None,
                        },
                        span.to(close),
                    );
                } else {
                    expr = self.alloc(
                        ExprKind::Field {
                            base: expr,
                            field: segment.to_string(),
                        },
                        span,
                    );
                }
            }
        }
        Ok(expr)
    }

    /// `(a, b)`; returns the args and the span of the closing paren.
    fn parse_args(&mut self) -> Result<(Vec<ExprId>, Span)> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if let Some(close) = self.eat_punct(")") {
            return Ok((args, close));
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat_punct(",").is_none() {
                break;
            }
        }
        let close = self.expect_punct(")")?;
        Ok((args, close))
    }

    fn parse_primary(&mut self) -> Result<ExprId> {
        let Some(token) = self.next() else {
            return Err(self.unexpected(None, "an expression"));
        };
        let span = token.span;
        let kind = match token.tok {
            Tok::Var(name) => ExprKind::Var(name),
            Tok::Int(i) => ExprKind::Literal(Literal::Int(i)),
            Tok::Float(f) => ExprKind::Literal(Literal::Float(f)),
            Tok::Str(s) => ExprKind::Literal(Literal::String(s)),
            Tok::Ident(name) => match name.as_str() {
                "true" => ExprKind::Literal(Literal::Bool(true)),
                "false" => ExprKind::Literal(Literal::Bool(false)),
                "null" => ExprKind::Literal(Literal::Null),
                _ if self.peek_is_punct("(") => {
                    let (args, close) = self.parse_args()?;
                    return Ok(self.alloc(
                        ExprKind::FunctionCall {
                            name,
                            args,
                            callee: None,
                        },
                        span.to(close),
                    ));
                }
                _ => ExprKind::Global(name),
            },
            Tok::Punct("(") => {
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                return Ok(inner);
            }
            Tok::Punct("[") => {
                let mut items = Vec::new();
                let close = loop {
                    if let Some(close) = self.eat_punct("]") {
                        break close;
                    }
                    items.push(self.parse_expr()?);
                    if self.eat_punct(",").is_none() {
                        break self.expect_punct("]")?;
                    }
                };
                return Ok(self.alloc(ExprKind::List(items), span.to(close)));
            }
            tok => {
                return Err(self.unexpected(Some(Token { tok, span }), "an expression"));
            }
        };
        Ok(self.alloc(kind, span))
    }
}

/// Strip one pair of surrounding single quotes, e.g. a variant written as `'compact'`.
pub(crate) fn unquote(value: &str) -> &str {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use stencil_core::SourcePath;

    use super::*;

    fn parse(src: &str) -> (FileNode, ExprId) {
        let ctx = SourceContext::new(src, "test.st");
        let mut file = FileNode::new(SourcePath::new("test.st"), src);
        let mut parser = ExprParser::new(&ctx, &mut file, src, 0).unwrap();
        let expr = parser.parse_expr().unwrap();
        parser.finish().unwrap();
        (file, expr)
    }

    /// Render an expression back to fully parenthesized text.
    fn render(file: &FileNode, id: ExprId) -> String {
        match &file.expr(id).kind {
            ExprKind::Literal(lit) => lit.to_string(),
            ExprKind::Var(name) => format!("${}", name),
            ExprKind::Global(name) => name.clone(),
            ExprKind::Field { base, field } => format!("{}.{}", render(file, *base), field),
            ExprKind::FunctionCall { name, args, .. } => format!(
                "{}({})",
                name,
                args.iter().map(|a| render(file, *a)).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::MethodCall { base, name, args, .. } => format!(
                "{}.{}({})",
                render(file, *base),
                name,
                args.iter().map(|a| render(file, *a)).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::List(items) => format!(
                "[{}]",
                items.iter().map(|a| render(file, *a)).collect::<Vec<_>>().join(", ")
            ),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => format!("(not {})", render(file, *operand)),
                UnaryOp::Neg => format!("(-{})", render(file, *operand)),
            },
            ExprKind::Binary { op, lhs, rhs } => format!(
                "({} {} {})",
                render(file, *lhs),
                op.symbol(),
                render(file, *rhs)
            ),
        }
    }

    #[test]
    fn test_precedence() {
        let (file, expr) = parse("1 + 2 * 3 == 7 and not $done or $x < -1");
        assert_eq!(
            render(&file, expr),
            "((((1 + (2 * 3)) == 7) and (not $done)) or ($x < (-1)))"
        );
    }

    #[test]
    fn test_left_associative() {
        let (file, expr) = parse("10 - 4 - 3");
        assert_eq!(render(&file, expr), "((10 - 4) - 3)");
    }

    #[test]
    fn test_postfix_and_calls() {
        let (file, expr) = parse("$user.profile.name.trim() + app.PREFIX + css('btn')");
        assert_eq!(
            render(&file, expr),
            "(($user.profile.name.trim() + app.PREFIX) + css('btn'))"
        );
    }

    #[test]
    fn test_literals() {
        let (file, expr) = parse("[1, 2.5, 'it\\'s', true, null]");
        assert_eq!(render(&file, expr), "[1, 2.5, 'it\\'s', true, null]");
    }

    #[test]
    fn test_span_covers_expression() {
        let (file, expr) = parse("  $a + $b  ");
        assert_eq!(file.expr(expr).span, Span::new(2, 9));
    }

    #[test]
    fn test_print_directives() {
        let src = "$name |truncate:10,true |noAutoescape";
        let ctx = SourceContext::new(src, "test.st");
        let mut file = FileNode::new(SourcePath::new("test.st"), src);
        let mut parser = ExprParser::new(&ctx, &mut file, src, 0).unwrap();
        parser.parse_expr().unwrap();
        let directives = parser.parse_print_directives().unwrap();
        parser.finish().unwrap();
        let names: Vec<_> = directives.iter().map(|d| (d.name.as_str(), d.args.len())).collect();
        assert_eq!(names, vec![("truncate", 2), ("noAutoescape", 0)]);
    }

    #[test]
    fn test_errors() {
        let src = "$a +";
        let ctx = SourceContext::new(src, "test.st");
        let mut file = FileNode::new(SourcePath::new("test.st"), src);
        let mut parser = ExprParser::new(&ctx, &mut file, src, 0).unwrap();
        let err = parser.parse_expr().unwrap_err();
        assert_eq!(err.to_string(), "expected an expression, found end of command");

        let src = "'open";
        let ctx = SourceContext::new(src, "test.st");
        let mut file = FileNode::new(SourcePath::new("test.st"), src);
        let err = ExprParser::new(&ctx, &mut file, src, 0).err().unwrap();
        assert_eq!(err.to_string(), "unterminated string literal");
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'compact'"), "compact");
        assert_eq!(unquote("compact"), "compact");
    }
}
