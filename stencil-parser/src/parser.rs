//! Recursive-descent parser for template files.

use std::str::FromStr;

use stencil_ast::{
    CallNode, CallParam, CallParamValue, ContentKind, ExprId, FileNode, ForNode, HtmlAttribute, HtmlTag,
    IfBranch, IfNode, LetNode, LetValue, MsgNode, NodeId, NodeKind, ParamDecl, ParamKind,
    PrintNode, SpecialChar, Span, StateDecl, TemplateKind, TemplateNode, VeLogNode, Visibility,
};
use stencil_core::SourceUnit;

use crate::{
    cursor::Cursor,
    error::{Result, SourceContext},
    expr::{ExprParser, unquote},
};

/// One `{...}` command tag.
#[derive(Debug, Clone, Copy)]
struct Tag<'s> {
    /// First word, e.g. `if`, `/if`, `@param?`, or `$x` for print shorthand.
    name: &'s str,
    /// Text after the name, without a trailing `/`.
    args: &'s str,
    args_start: usize,
    /// The whole command text, without a trailing `/`.
    content: &'s str,
    content_start: usize,
    span: Span,
    self_closing: bool,
}

/// Declarations collected before the first body content of a template.
#[derive(Default)]
struct Header {
    params: Vec<ParamDecl>,
    state: Vec<StateDecl>,
    closed: bool,
    /// End offset of the last declaration, for trailing doc comments.
    last_decl_end: Option<usize>,
}

const HEADER_COMMANDS: &[&str] = &[
    "@param",
    "@param?",
    "@inject",
    "@attribute",
    "@attribute?",
    "@state",
];

const FILE_COMMANDS: &[&str] = &[
    "namespace",
    "alias",
    "delpackage",
    "template",
    "deltemplate",
    "element",
];

/// Parse one source file.
pub fn parse(unit: &SourceUnit) -> Result<FileNode> {
    Parser::new(unit).parse_file()
}

struct Parser<'s> {
    ctx: SourceContext,
    src: &'s str,
    pos: usize,
    file: FileNode,
    pending_doc: Option<String>,
    /// Strict HTML parsing for the template being parsed.
    strict: bool,
}

impl<'s> Parser<'s> {
    fn new(unit: &'s SourceUnit) -> Self {
        Self {
            ctx: SourceContext::new(unit.content(), unit.path().as_str()),
            src: unit.content(),
            pos: 0,
            file: FileNode::new(unit.path().clone(), unit.content()),
            pending_doc: None,
            strict: false,
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    /// Skip a `/* */` comment, recording `/** */` as pending documentation.
    fn skip_comment(&mut self) -> Result<bool> {
        if !self.rest().starts_with("/*") {
            return Ok(false);
        }
        let start = self.pos;
        let Some(end) = self.rest().find("*/") else {
            return Err(self.ctx.unclosed("/*", (start, 2)));
        };
        let text = &self.src[start..start + end + 2];
        self.pos = start + end + 2;
        if let Some(doc) = text.strip_prefix("/**").and_then(|t| t.strip_suffix("*/")) {
            self.pending_doc = Some(clean_doc(doc));
        }
        Ok(true)
    }

    fn skip_line_comment(&mut self) -> bool {
        if !self.rest().starts_with("//") {
            return false;
        }
        self.pos += self.rest().find('\n').unwrap_or(self.rest().len());
        true
    }

    fn read_tag(&mut self) -> Result<Tag<'s>> {
        let start = self.pos;
        let src = self.src;
        let mut quote: Option<char> = None;
        let mut end = None;
        for (i, c) in src[start + 1..].char_indices() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '{') => return Err(self.ctx.unclosed("{", (start, 1))),
                (None, '}') => {
                    end = Some(start + 1 + i);
                    break;
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            return Err(self.ctx.unclosed("{", (start, 1)));
        };
        self.pos = end + 1;

        let raw = &src[start + 1..end];
        let lead = raw.len() - raw.trim_start().len();
        let mut content = raw.trim();
        let self_closing = content.len() > 1 && content.ends_with('/');
        if self_closing {
            content = content[..content.len() - 1].trim_end();
        }
        let content_start = start + 1 + lead;
        let name_len = content
            .find(char::is_whitespace)
            .unwrap_or(content.len());
        let name = &content[..name_len];
        let args_raw = &content[name_len..];
        let args_lead = args_raw.len() - args_raw.trim_start().len();

        Ok(Tag {
            name,
            args: args_raw.trim(),
            args_start: content_start + name_len + args_lead,
            content,
            content_start,
            span: Span::new(start, end + 1),
            self_closing,
        })
    }

    fn parse_file(mut self) -> Result<FileNode> {
        loop {
            self.skip_ws();
            if self.skip_comment()? || self.skip_line_comment() {
                continue;
            }
            if self.at_eof() {
                break;
            }
            if !self.rest().starts_with('{') {
                let found = self.rest().split_whitespace().next().unwrap_or_default();
                return Err(self.ctx.unexpected(
                    format!("'{}'", found),
                    "a template declaration",
                    (self.pos, found.len()),
                ));
            }
            let tag = self.read_tag()?;
            match tag.name {
                "namespace" => self.parse_namespace(tag)?,
                "alias" => self.parse_alias(tag)?,
                "delpackage" => {
                    let mut cursor = Cursor::new(tag.args, tag.args_start);
                    let (name, _) = cursor.expect_word(&self.ctx, "a package name")?;
                    self.file.delegate_package = Some(name.to_string());
                }
                "template" | "deltemplate" | "element" => {
                    let id = self.parse_template(tag)?;
                    self.file.templates.push(id);
                }
                name if name.starts_with('@') && !HEADER_COMMANDS.contains(&name) => {
                    return Err(self.ctx.unknown_command(name, tag.span));
                }
                name => {
                    return Err(self.ctx.misplaced(name, "outside of a template", tag.span));
                }
            }
            if !matches!(tag.name, "template" | "deltemplate" | "element") {
                self.pending_doc = None;
            }
        }
        Ok(self.file)
    }

    fn parse_namespace(&mut self, tag: Tag<'s>) -> Result<()> {
        if self.file.namespace.is_some() {
            return Err(self.ctx.invalid("a file may declare only one namespace", tag.span));
        }
        if !self.file.templates.is_empty() {
            return Err(self.ctx.misplaced("namespace", "after a template", tag.span));
        }
        let mut cursor = Cursor::new(tag.args, tag.args_start);
        let (name, _) = cursor.expect_word(&self.ctx, "a namespace")?;
        self.file.namespace = Some(name.to_string());
        Ok(())
    }

    fn parse_alias(&mut self, tag: Tag<'s>) -> Result<()> {
        let mut cursor = Cursor::new(tag.args, tag.args_start);
        let (target, _) = cursor.expect_word(&self.ctx, "a namespace to alias")?;
        let alias = if cursor.eat("as") {
            cursor.expect_word(&self.ctx, "an alias name")?.0
        } else {
            target.rsplit('.').next().unwrap_or(target)
        };
        if !cursor.at_end() {
            return Err(self.ctx.unexpected(cursor.rest(), "end of alias", (cursor.offset(), cursor.rest().len())));
        }
        if self.file.aliases.contains_key(alias) {
            return Err(self.ctx.invalid(format!("duplicate alias '{}'", alias), tag.span));
        }
        self.file.aliases.insert(alias.to_string(), target.to_string());
        Ok(())
    }

    fn parse_template(&mut self, open: Tag<'s>) -> Result<NodeId> {
        let kind = match open.name {
            "deltemplate" => TemplateKind::Delegate,
            "element" => TemplateKind::Element,
            _ => TemplateKind::Basic,
        };
        let doc = self.pending_doc.take();
        let mut cursor = Cursor::new(open.args, open.args_start);
        let (written, name_span) = cursor.expect_word(&self.ctx, "a template name")?;

        let name = match (kind, written.strip_prefix('.')) {
            (TemplateKind::Delegate, Some(_)) => {
                return Err(self.ctx.invalid(
                    "delegate templates need a fully qualified name",
                    name_span,
                ));
            }
            (_, Some(local)) => match &self.file.namespace {
                Some(ns) => format!("{}.{}", ns, local),
                None => {
                    return Err(self.ctx.invalid(
                        "a relative template name requires a {namespace} declaration",
                        name_span,
                    ));
                }
            },
            (_, None) => written.to_string(),
        };

        let mut visibility = Visibility::Public;
        let mut content_kind = ContentKind::Html;
        let mut strict_html = true;
        let mut variant = (kind == TemplateKind::Delegate).then(String::new);
        for attr in cursor.attributes(&self.ctx)? {
            match attr.name {
                "visibility" => {
                    visibility = Visibility::from_str(attr.value)
                        .map_err(|msg| self.ctx.invalid(msg, attr.span))?;
                }
                "kind" => {
                    content_kind = ContentKind::from_str(attr.value)
                        .map_err(|msg| self.ctx.invalid(msg, attr.span))?;
                }
                "stricthtml" => {
                    strict_html = match attr.value {
                        "true" => true,
                        "false" => false,
                        _ => {
                            return Err(self.ctx.invalid("stricthtml must be \"true\" or \"false\"", attr.span));
                        }
                    }
                }
                "variant" if kind == TemplateKind::Delegate => {
                    variant = Some(unquote(attr.value).to_string());
                }
                other => {
                    return Err(self.ctx.invalid(
                        format!("unknown {} attribute '{}'", kind, other),
                        attr.span,
                    ));
                }
            }
        }

        self.strict = strict_html && content_kind == ContentKind::Html;
        let html = self.strict;
        let mut header = Header::default();
        let close = format!("/{}", open.name);
        let (body, end) = self.parse_block(open, &[close.as_str()], html, Some(&mut header))?;

        let template = TemplateNode {
            kind,
            name,
            variant,
            visibility,
            content_kind,
            strict_html: self.strict,
            doc,
            params: header.params,
            state: header.state,
            body,
        };
        Ok(self
            .file
            .alloc(NodeKind::Template(template), open.span.to(end.span)))
    }

    /// Parse nodes until one of `terminators`, returning the body and the
    /// terminating tag.
    fn parse_block(
        &mut self,
        opener: Tag<'s>,
        terminators: &[&str],
        html: bool,
        mut header: Option<&mut Header>,
    ) -> Result<(Vec<NodeId>, Tag<'s>)> {
        let mut nodes = Vec::new();
        loop {
            if self.at_eof() {
                return Err(self.ctx.unclosed(opener.name, opener.span));
            }

            if self.rest().starts_with("/*") {
                let start = self.pos;
                self.skip_comment()?;
                if let Some(header) = header.as_deref_mut() {
                    self.attach_trailing_doc(header, start);
                } else {
                    self.pending_doc = None;
                }
                continue;
            }

            if self.rest().starts_with('{') {
                let tag = self.read_tag()?;
                if terminators.contains(&tag.name) {
                    return Ok((nodes, tag));
                }
                if tag.name.starts_with('/') {
                    return Err(self.ctx.unclosed(opener.name, opener.span));
                }
                if HEADER_COMMANDS.contains(&tag.name) {
                    match header.as_deref_mut() {
                        Some(header) if !header.closed => {
                            self.parse_header_decl(tag, header)?;
                            continue;
                        }
                        Some(_) => {
                            return Err(self.ctx.misplaced(
                                tag.name,
                                "after the template body starts",
                                tag.span,
                            ));
                        }
                        None => {
                            return Err(self.ctx.misplaced(tag.name, "inside a block", tag.span));
                        }
                    }
                }
                if let Some(header) = header.as_deref_mut() {
                    header.closed = true;
                }
                nodes.push(self.parse_command(tag, html)?);
                continue;
            }

            if html && self.at_html_tag() {
                if let Some(header) = header.as_deref_mut() {
                    header.closed = true;
                }
                nodes.push(self.parse_html_tag()?);
                continue;
            }

            let start = self.pos;
            let end = self.text_end(html);
            self.pos = end;
            let header_open = header.as_deref().is_some_and(|h| !h.closed);
            if header_open && self.src[start..end].trim().is_empty() {
                continue;
            }
            if let Some(text) = join_lines(&self.src[start..end]) {
                if let Some(header) = header.as_deref_mut() {
                    header.closed = true;
                }
                nodes.push(
                    self.file
                        .alloc(NodeKind::RawText(text), Span::new(start, end)),
                );
            }
        }
    }

    /// A doc comment on the same line as the previous declaration documents it;
    /// otherwise it documents the next one.
    fn attach_trailing_doc(&mut self, header: &mut Header, comment_start: usize) {
        let Some(last_end) = header.last_decl_end else {
            return;
        };
        if self.src[last_end..comment_start].contains('\n') {
            return;
        }
        if let Some(param) = header.params.last_mut()
            && param.span.end == last_end
            && param.doc.is_none()
        {
            param.doc = self.pending_doc.take();
        }
    }

    fn text_end(&self, html: bool) -> usize {
        let rest = self.rest();
        let mut offset = 0;
        for (i, c) in rest.char_indices() {
            offset = i;
            let at = self.pos + i;
            if c == '{' || rest[i..].starts_with("/*") {
                return at;
            }
            if html && c == '<' && is_html_tag_start(&self.src[at..]) {
                return at;
            }
            offset = i + c.len_utf8();
        }
        self.pos + offset
    }

    fn at_html_tag(&self) -> bool {
        is_html_tag_start(self.rest())
    }

    fn parse_header_decl(&mut self, tag: Tag<'s>, header: &mut Header) -> Result<()> {
        let mut cursor = Cursor::new(tag.args, tag.args_start);
        let (name, _) = cursor.expect_word(&self.ctx, "a declaration name")?;
        let doc = self.pending_doc.take();

        if tag.name == "@state" {
            let type_expr = if cursor.eat(":") {
                let (ty, _) = cursor.take_until('=');
                Some(ty.trim().to_string())
            } else {
                None
            };
            if !cursor.eat("=") {
                return Err(self.ctx.invalid(
                    format!("state '{}' needs a default value", name),
                    tag.span,
                ));
            }
            let (text, offset) = cursor.take_rest();
            let mut parser = ExprParser::new(&self.ctx, &mut self.file, text, offset)?;
            let default = parser.parse_expr()?;
            parser.finish()?;
            header.state.push(StateDecl {
                name: name.to_string(),
                type_expr,
                ty: None,
                default,
                span: tag.span,
            });
        } else {
            if !cursor.eat(":") {
                return Err(self.ctx.invalid(
                    format!("'{}' needs a type, e.g. {{{} {}: string}}", name, tag.name, name),
                    tag.span,
                ));
            }
            let (type_expr, _) = cursor.take_rest();
            let type_expr = type_expr.trim();
            if type_expr.is_empty() {
                return Err(self.ctx.invalid(format!("'{}' needs a type", name), tag.span));
            }
            let kind = if tag.name.starts_with("@attribute") {
                ParamKind::Attribute
            } else {
                ParamKind::Param
            };
            if header.params.iter().any(|p| p.name == name) {
                return Err(self.ctx.invalid(format!("duplicate parameter '{}'", name), tag.span));
            }
            header.params.push(ParamDecl {
                name: name.to_string(),
                kind,
                type_expr: type_expr.to_string(),
                ty: None,
                required: !tag.name.ends_with('?'),
                implicit: tag.name == "@inject",
                doc,
                span: tag.span,
            });
        }
        header.last_decl_end = Some(tag.span.end);
        Ok(())
    }

    fn parse_command(&mut self, tag: Tag<'s>, html: bool) -> Result<NodeId> {
        if let Some(special) = SpecialChar::from_command(tag.content) {
            return Ok(self.file.alloc(NodeKind::SpecialChar(special), tag.span));
        }
        match tag.name {
            "print" => self.parse_print(tag.args, tag.args_start, tag.span),
            "if" => self.parse_if(tag, html),
            "for" => self.parse_for(tag, html),
            "let" => self.parse_let(tag, html),
            "call" | "delcall" => self.parse_call(tag),
            "msg" => self.parse_msg(tag, html),
            "velog" => {
                let mut cursor = Cursor::new(tag.args, tag.args_start);
                let (name, _) = cursor.expect_word(&self.ctx, "a visual element name")?;
                let (body, end) = self.parse_block(tag, &["/velog"], html, None)?;
                Ok(self.file.alloc(
                    NodeKind::VeLog(VeLogNode {
                        name: name.to_string(),
                        body,
                    }),
                    tag.span.to(end.span),
                ))
            }
            name if FILE_COMMANDS.contains(&name) => {
                Err(self.ctx.misplaced(name, "inside a template", tag.span))
            }
            name if name.starts_with('/') => Err(self.ctx.misplaced(
                name,
                "without a matching opening command",
                tag.span,
            )),
            "elseif" | "else" | "param" => {
                Err(self.ctx.misplaced(tag.name, "here", tag.span))
            }
            name if name.starts_with('@') => Err(self.ctx.unknown_command(name, tag.span)),
            _ => self.parse_print(tag.content, tag.content_start, tag.span),
        }
    }

    fn parse_print(&mut self, text: &str, offset: usize, span: Span) -> Result<NodeId> {
        let mut parser = ExprParser::new(&self.ctx, &mut self.file, text, offset)?;
        let expr = parser.parse_expr()?;
        let directives = parser.parse_print_directives()?;
        parser.finish()?;
        Ok(self
            .file
            .alloc(NodeKind::Print(PrintNode { expr, directives }), span))
    }

    fn parse_condition(&mut self, tag: Tag<'s>) -> Result<ExprId> {
        let mut parser = ExprParser::new(&self.ctx, &mut self.file, tag.args, tag.args_start)?;
        let cond = parser.parse_expr()?;
        parser.finish()?;
        Ok(cond)
    }

    fn parse_if(&mut self, open: Tag<'s>, html: bool) -> Result<NodeId> {
        let mut branches = Vec::new();
        let mut else_body = None;
        let mut cond = self.parse_condition(open)?;
        let end = loop {
            let (body, term) = self.parse_block(open, &["elseif", "else", "/if"], html, None)?;
            branches.push(IfBranch { cond, body });
            match term.name {
                "elseif" => cond = self.parse_condition(term)?,
                "else" => {
                    let (body, end) = self.parse_block(open, &["/if"], html, None)?;
                    else_body = Some(body);
                    break end;
                }
                _ => break term,
            }
        };
        Ok(self.file.alloc(
            NodeKind::If(IfNode {
                branches,
                else_body,
            }),
            open.span.to(end.span),
        ))
    }

    fn parse_for(&mut self, open: Tag<'s>, html: bool) -> Result<NodeId> {
        let mut parser = ExprParser::new(&self.ctx, &mut self.file, open.args, open.args_start)?;
        let (var, _) = parser.expect_var()?;
        parser.expect_keyword("in")?;
        let iterable = parser.parse_expr()?;
        parser.finish()?;
        let (body, end) = self.parse_block(open, &["/for"], html, None)?;
        Ok(self.file.alloc(
            NodeKind::For(ForNode {
                var,
                iterable,
                body,
            }),
            open.span.to(end.span),
        ))
    }

    fn parse_let(&mut self, open: Tag<'s>, html: bool) -> Result<NodeId> {
        let mut cursor = Cursor::new(open.args, open.args_start);
        let (var, var_span) = cursor.expect_word(&self.ctx, "a '$' variable")?;
        let Some(var) = var.strip_prefix('$') else {
            return Err(self.ctx.unexpected(format!("'{}'", var), "a '$' variable", var_span));
        };

        if cursor.eat(":") {
            if !open.self_closing {
                return Err(self.ctx.invalid("a let with a value must be self-closing: {let $x: ... /}", open.span));
            }
            let (text, offset) = cursor.take_rest();
            let mut parser = ExprParser::new(&self.ctx, &mut self.file, text, offset)?;
            let value = parser.parse_expr()?;
            parser.finish()?;
            return Ok(self.file.alloc(
                NodeKind::Let(LetNode {
                    var: var.to_string(),
                    value: LetValue::Expr(value),
                }),
                open.span,
            ));
        }

        let kind = self.content_kind_attr(&mut cursor)?;
        if open.self_closing {
            return Err(self.ctx.invalid("a let block needs content: {let $x}...{/let}", open.span));
        }
        let html = html_for(kind, html, self.strict);
        let (body, end) = self.parse_block(open, &["/let"], html, None)?;
        Ok(self.file.alloc(
            NodeKind::Let(LetNode {
                var: var.to_string(),
                value: LetValue::Content { kind, body },
            }),
            open.span.to(end.span),
        ))
    }

    fn content_kind_attr(&self, cursor: &mut Cursor<'s>) -> Result<ContentKind> {
        let mut kind = ContentKind::Html;
        for attr in cursor.attributes(&self.ctx)? {
            match attr.name {
                "kind" => {
                    kind = ContentKind::from_str(attr.value)
                        .map_err(|msg| self.ctx.invalid(msg, attr.span))?;
                }
                other => {
                    return Err(self.ctx.invalid(format!("unknown attribute '{}'", other), attr.span));
                }
            }
        }
        Ok(kind)
    }

    fn parse_call(&mut self, open: Tag<'s>) -> Result<NodeId> {
        let delegate = open.name == "delcall";
        let mut cursor = Cursor::new(open.args, open.args_start);
        let (callee, _) = cursor.expect_word(&self.ctx, "a template name")?;

        let mut variant = None;
        let mut data_all = false;
        for attr in cursor.attributes(&self.ctx)? {
            match attr.name {
                "data" if attr.value == "all" => data_all = true,
                "data" => {
                    return Err(self.ctx.invalid("only data=\"all\" is supported", attr.span));
                }
                "variant" if delegate => variant = Some(unquote(attr.value).to_string()),
                other => {
                    return Err(self.ctx.invalid(
                        format!("unknown {} attribute '{}'", open.name, other),
                        attr.span,
                    ));
                }
            }
        }

        let (params, span) = if open.self_closing {
            (Vec::new(), open.span)
        } else {
            let close = format!("/{}", open.name);
            let (params, end) = self.parse_call_params(open, &close)?;
            (params, open.span.to(end))
        };

        Ok(self.file.alloc(
            NodeKind::Call(CallNode {
                callee: callee.to_string(),
                delegate,
                variant,
                data_all,
                params,
            }),
            span,
        ))
    }

    fn parse_call_params(&mut self, open: Tag<'s>, close: &str) -> Result<(Vec<CallParam>, Span)> {
        let mut params: Vec<CallParam> = Vec::new();
        loop {
            self.skip_ws();
            if self.skip_comment()? {
                continue;
            }
            if self.at_eof() {
                return Err(self.ctx.unclosed(open.name, open.span));
            }
            if !self.rest().starts_with('{') {
                let found = self.rest().split_whitespace().next().unwrap_or_default();
                return Err(self.ctx.unexpected(
                    format!("'{}'", found),
                    "'{param}'",
                    (self.pos, found.len()),
                ));
            }
            let tag = self.read_tag()?;
            if tag.name == close {
                return Ok((params, tag.span));
            }
            if tag.name != "param" {
                return Err(self.ctx.misplaced(tag.name, "inside a call", tag.span));
            }
            let param = self.parse_call_param(tag)?;
            if params.iter().any(|p| p.name == param.name) {
                return Err(self.ctx.invalid(format!("duplicate param '{}'", param.name), tag.span));
            }
            params.push(param);
        }
    }

    fn parse_call_param(&mut self, open: Tag<'s>) -> Result<CallParam> {
        let mut cursor = Cursor::new(open.args, open.args_start);
        let (name, _) = cursor.expect_word(&self.ctx, "a param name")?;

        if cursor.eat(":") {
            if !open.self_closing {
                return Err(self.ctx.invalid("a param with a value must be self-closing: {param k: ... /}", open.span));
            }
            let (text, offset) = cursor.take_rest();
            let mut parser = ExprParser::new(&self.ctx, &mut self.file, text, offset)?;
            let value = parser.parse_expr()?;
            parser.finish()?;
            return Ok(CallParam {
                name: name.to_string(),
                value: CallParamValue::Expr(value),
                span: open.span,
            });
        }

        let kind = self.content_kind_attr(&mut cursor)?;
        if open.self_closing {
            return Err(self.ctx.invalid("a param block needs content: {param k}...{/param}", open.span));
        }
        let html = html_for(kind, true, self.strict);
        let (body, end) = self.parse_block(open, &["/param"], html, None)?;
        Ok(CallParam {
            name: name.to_string(),
            value: CallParamValue::Content { kind, body },
            span: open.span.to(end.span),
        })
    }

    fn parse_msg(&mut self, open: Tag<'s>, html: bool) -> Result<NodeId> {
        let mut cursor = Cursor::new(open.args, open.args_start);
        let mut desc = None;
        let mut meaning = None;
        for attr in cursor.attributes(&self.ctx)? {
            match attr.name {
                "desc" => desc = Some(attr.value.to_string()),
                "meaning" => meaning = Some(attr.value.to_string()),
                other => {
                    return Err(self.ctx.invalid(format!("unknown msg attribute '{}'", other), attr.span));
                }
            }
        }
        let Some(desc) = desc else {
            return Err(self.ctx.invalid("msg requires a desc attribute", open.span));
        };
        let (body, end) = self.parse_block(open, &["/msg"], html, None)?;
        Ok(self.file.alloc(
            NodeKind::Msg(MsgNode {
                desc,
                meaning,
                body,
            }),
            open.span.to(end.span),
        ))
    }

    fn parse_html_tag(&mut self) -> Result<NodeId> {
        let start = self.pos;
        self.pos += 1;
        let closing = self.rest().starts_with('/');
        if closing {
            self.pos += 1;
        }
        let name = self.html_name();
        if closing {
            self.skip_ws();
            if !self.rest().starts_with('>') {
                return Err(self.unexpected_in_tag("'>'"));
            }
            self.pos += 1;
            return Ok(self.file.alloc(
                NodeKind::HtmlCloseTag {
                    name: name.to_string(),
                },
                Span::new(start, self.pos),
            ));
        }

        let mut attributes = Vec::new();
        let self_closing = loop {
            self.skip_ws();
            if self.rest().starts_with("/>") {
                self.pos += 2;
                break true;
            }
            if self.rest().starts_with('>') {
                self.pos += 1;
                break false;
            }
            if self.at_eof() {
                return Err(self.ctx.unexpected_eof("'>'"));
            }
            if self.rest().starts_with('{') {
                return Err(self.ctx.invalid(
                    "commands are not supported between attributes",
                    (self.pos, 1),
                ));
            }
            attributes.push(self.parse_html_attribute()?);
        };

        Ok(self.file.alloc(
            NodeKind::HtmlOpenTag(HtmlTag {
                name: name.to_string(),
                attributes,
                self_closing,
            }),
            Span::new(start, self.pos),
        ))
    }

    fn html_name(&mut self) -> &'s str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn parse_html_attribute(&mut self) -> Result<HtmlAttribute> {
        let start = self.pos;
        let rest = self.rest();
        let len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/' | '{' | '"' | '\''))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.unexpected_in_tag("an attribute name"));
        }
        let name = &rest[..len];
        self.pos += len;

        self.skip_ws();
        if !self.rest().starts_with('=') {
            return Ok(HtmlAttribute {
                name: name.to_string(),
                value: None,
                span: Span::new(start, self.pos),
            });
        }
        self.pos += 1;
        self.skip_ws();

        let value = match self.rest().chars().next() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let nodes = self.parse_attribute_value(quote)?;
                self.pos += 1;
                nodes
            }
            Some(_) => {
                let text_start = self.pos;
                let rest = self.rest();
                let len = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += len;
                vec![self.file.alloc(
                    NodeKind::RawText(rest[..len].to_string()),
                    Span::new(text_start, self.pos),
                )]
            }
            None => return Err(self.ctx.unexpected_eof("an attribute value")),
        };

        Ok(HtmlAttribute {
            name: name.to_string(),
            value: Some(value),
            span: Span::new(start, self.pos),
        })
    }

    /// Text and prints up to the closing `quote`, which is left unconsumed.
    fn parse_attribute_value(&mut self, quote: char) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::new();
        loop {
            let Some(c) = self.rest().chars().next() else {
                return Err(self.ctx.unexpected_eof(format!("closing {}", quote)));
            };
            if c == quote {
                return Ok(nodes);
            }
            if c == '{' {
                let tag = self.read_tag()?;
                let is_print = SpecialChar::from_command(tag.content).is_some()
                    || tag.name == "print"
                    || !(tag.name.starts_with('/')
                        || tag.name.starts_with('@')
                        || tag.name.chars().all(|c| c.is_ascii_alphabetic())
                            && !tag.args.is_empty()
                            && !tag.args.starts_with(['|', '(', '.', '+', '-', '*', '/', '%', '<', '>', '=', '!']));
                if !is_print || tag.name == "if" || tag.name == "for" || tag.name == "call" {
                    return Err(self.ctx.misplaced(tag.name, "inside an attribute value", tag.span));
                }
                nodes.push(self.parse_command(tag, false)?);
                continue;
            }
            let start = self.pos;
            let rest = self.rest();
            let len = rest.find(|ch: char| ch == quote || ch == '{').unwrap_or(rest.len());
            self.pos += len;
            nodes.push(self.file.alloc(
                NodeKind::RawText(rest[..len].to_string()),
                Span::new(start, self.pos),
            ));
        }
    }

    fn unexpected_in_tag(&self, expected: &str) -> Box<crate::ParseError> {
        match self.rest().chars().next() {
            Some(c) => self
                .ctx
                .unexpected(format!("'{}'", c), expected, (self.pos, c.len_utf8())),
            None => self.ctx.unexpected_eof(expected),
        }
    }
}

/// Whether HTML tags are parsed inside a block of `kind`.
fn html_for(kind: ContentKind, enclosing_html: bool, strict: bool) -> bool {
    kind == ContentKind::Html && strict && enclosing_html
}

fn is_html_tag_start(rest: &str) -> bool {
    let mut chars = rest.chars();
    if chars.next() != Some('<') {
        return false;
    }
    match chars.next() {
        Some('/') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        Some(c) => c.is_ascii_alphabetic(),
        None => false,
    }
}

/// Join raw text lines: lines are trimmed at line breaks and joined with a
/// space, except next to HTML tag boundaries. Text without line breaks is
/// kept verbatim. Returns `None` when nothing remains.
fn join_lines(text: &str) -> Option<String> {
    if !text.contains('\n') {
        return (!text.is_empty()).then(|| text.to_string());
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len() - 1;
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let mut line = *line;
        if i > 0 {
            line = line.trim_start();
        }
        if i < last {
            line = line.trim_end();
        }
        if line.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('>') && !line.starts_with('<') {
            out.push(' ');
        }
        out.push_str(line);
    }
    (!out.is_empty()).then_some(out)
}

/// Strip comment markers and leading `*` decoration from a doc comment.
fn clean_doc(doc: &str) -> String {
    doc.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map(str::trim_start).unwrap_or(line)
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use stencil_ast::{ExprKind, Literal};

    use super::*;

    fn parse_ok(src: &str) -> FileNode {
        match parse(&SourceUnit::new("test.st", src)) {
            Ok(file) => file,
            Err(err) => panic!("parse failed: {}", err),
        }
    }

    fn parse_err(src: &str) -> String {
        parse(&SourceUnit::new("test.st", src))
            .unwrap_err()
            .to_string()
    }

    fn body_kinds(file: &FileNode, body: &[NodeId]) -> Vec<String> {
        body.iter()
            .map(|id| match &file.node(*id).kind {
                NodeKind::RawText(t) => format!("text({})", t),
                NodeKind::SpecialChar(c) => format!("special({:?})", c),
                NodeKind::Print(_) => "print".to_string(),
                NodeKind::If(_) => "if".to_string(),
                NodeKind::For(_) => "for".to_string(),
                NodeKind::Let(_) => "let".to_string(),
                NodeKind::Call(c) => format!("call({})", c.callee),
                NodeKind::Msg(_) => "msg".to_string(),
                NodeKind::VeLog(v) => format!("velog({})", v.name),
                NodeKind::HtmlOpenTag(t) => format!("<{}>", t.name),
                NodeKind::HtmlCloseTag { name } => format!("</{}>", name),
                NodeKind::Template(_) => "template".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_file_declarations() {
        let file = parse_ok(
            "{namespace app.main}\n{alias app.widgets as w}\n{alias lib.util}\n{delpackage beta}\n\
             /** Says hi. */\n{template .hello visibility=\"private\" kind=\"text\"}hi{/template}",
        );
        assert_eq!(file.namespace.as_deref(), Some("app.main"));
        assert_eq!(file.aliases.get("w").map(String::as_str), Some("app.widgets"));
        assert_eq!(file.aliases.get("util").map(String::as_str), Some("lib.util"));
        assert_eq!(file.delegate_package.as_deref(), Some("beta"));

        let (_, template) = file.templates().next().unwrap();
        assert_eq!(template.name, "app.main.hello");
        assert_eq!(template.visibility, Visibility::Private);
        assert_eq!(template.content_kind, ContentKind::Text);
        assert!(!template.strict_html);
        assert_eq!(template.doc.as_deref(), Some("Says hi."));
    }

    #[test]
    fn test_header_declarations() {
        let file = parse_ok(
            "{namespace a}\n{template .t}\n  {@param name: string}  /** The name. */\n  \
             /** How many. */\n  {@param? count: int}\n  {@inject locale: string}\n  x\n{/template}\n\
             {element .card}{@attribute? title: string}{@state open: bool = false}<div></div>{/element}",
        );
        let templates: Vec<_> = file.templates().collect();
        let params = &templates[0].1.params;
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].doc.as_deref(), Some("The name."));
        assert!(params[0].required);
        assert_eq!(params[1].doc.as_deref(), Some("How many."));
        assert!(!params[1].required);
        assert_eq!(params[1].type_expr, "int");
        assert!(params[2].implicit);

        let card = templates[1].1;
        assert_eq!(card.kind, TemplateKind::Element);
        assert_eq!(card.params[0].kind, ParamKind::Attribute);
        assert!(!card.params[0].required);
        assert_eq!(card.state[0].name, "open");
        assert_eq!(card.state[0].type_expr.as_deref(), Some("bool"));
        assert_eq!(
            file.expr(card.state[0].default).kind,
            ExprKind::Literal(Literal::Bool(false))
        );
    }

    #[test]
    fn test_body_nodes() {
        let file = parse_ok(
            "{namespace a}\n{template .t}\n  {@param name: string}\n  \
             <div class=\"greeting\" title=\"{$name}\">Hello {$name |truncate:10}!</div>{sp}\n  \
             {if $name}yes{elseif true}maybe{else}no{/if}\n  \
             {for $item in [1, 2]}{$item}{/for}\n  \
             {let $x: $name + '!' /}\n  \
             {call .other data=\"all\"}{param extra: 1 /}{param label kind=\"text\"}Go{/param}{/call}\n  \
             {delcall my.widget variant=\"'compact'\" /}\n  \
             {msg desc=\"greeting\"}Hi {$name}{/msg}\n  \
             {velog Clickable}<a>x</a>{/velog}\n\
             {/template}",
        );
        let (_, template) = file.templates().next().unwrap();
        assert_eq!(
            body_kinds(&file, &template.body),
            vec![
                "<div>",
                "text(Hello )",
                "print",
                "text(!)",
                "</div>",
                "special(Space)",
                "if",
                "for",
                "let",
                "call(.other)",
                "call(my.widget)",
                "msg",
                "velog(Clickable)",
            ]
        );

        let NodeKind::HtmlOpenTag(div) = &file.node(template.body[0]).kind else {
            panic!("expected an open tag");
        };
        assert_eq!(div.attributes.len(), 2);
        let title = div.attributes[1].value.as_ref().unwrap();
        assert_eq!(body_kinds(&file, title), vec!["print"]);

        let NodeKind::If(iff) = &file.node(template.body[6]).kind else {
            panic!("expected an if");
        };
        assert_eq!(iff.branches.len(), 2);
        assert!(iff.else_body.is_some());

        let NodeKind::Call(call) = &file.node(template.body[9]).kind else {
            panic!("expected a call");
        };
        assert!(call.data_all);
        assert_eq!(call.params.len(), 2);

        let NodeKind::Call(delcall) = &file.node(template.body[10]).kind else {
            panic!("expected a delcall");
        };
        assert!(delcall.delegate);
        assert_eq!(delcall.variant.as_deref(), Some("compact"));
    }

    #[test]
    fn test_deltemplate() {
        let file = parse_ok("{deltemplate my.widget variant=\"'compact'\"}x{/deltemplate}\n{deltemplate my.widget}y{/deltemplate}");
        let templates: Vec<_> = file.templates().collect();
        assert_eq!(templates[0].1.variant.as_deref(), Some("compact"));
        assert_eq!(templates[1].1.variant.as_deref(), Some(""));
        assert_eq!(templates[1].1.template_name(None), "my.widget#");
    }

    #[test]
    fn test_line_joining() {
        assert_eq!(join_lines("  \n  "), None);
        assert_eq!(join_lines("Hello\n   world  \n"), Some("Hello world".into()));
        assert_eq!(join_lines("<b>\n  x\n  </b>"), Some("<b>x</b>".into()));
        assert_eq!(join_lines(" a b "), Some(" a b ".into()));
    }

    #[test]
    fn test_non_strict_text_keeps_angle_brackets() {
        let file = parse_ok("{namespace a}{template .t kind=\"text\"}a <b> c{/template}");
        let (_, template) = file.templates().next().unwrap();
        assert_eq!(body_kinds(&file, &template.body), vec!["text(a <b> c)"]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_err("{namespace a}{template .t}{if true}x{/template}"),
            "'if' is never closed"
        );
        assert_eq!(
            parse_err("{template .t}x{/template}"),
            "a relative template name requires a {namespace} declaration"
        );
        assert_eq!(
            parse_err("{namespace a}{template .t}x{@param p: int}{/template}"),
            "'@param' is not allowed after the template body starts"
        );
        assert_eq!(
            parse_err("{namespace a}{template .t}{@bogus x}{/template}"),
            "unknown command '@bogus'"
        );
        assert_eq!(
            parse_err("{namespace a}{if true}{/if}"),
            "'if' is not allowed outside of a template"
        );
        assert_eq!(
            parse_err("{namespace a}{template .t}{$x +}{/template}"),
            "expected an expression, found end of command"
        );
    }

    #[test]
    fn test_error_location() {
        let err = parse(&SourceUnit::new(
            "test.st",
            "{namespace a}\n{template .t}\n  {if}{/if}\n{/template}",
        ))
        .unwrap_err();
        assert_eq!(err.span().offset(), 33);
    }
}
