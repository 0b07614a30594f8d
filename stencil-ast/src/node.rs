//! Template nodes and the per-file arenas that own them.

use indexmap::IndexMap;
use stencil_core::{LineIndex, SourceLocation, SourcePath};

use crate::{
    ContentKind, Expr, ExprId, ExprKind, IndexVec, NodeId, ParamKind, TemplateKind, Type,
    Visibility,
};

/// Byte range in the file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        (span.start, span.end - span.start).into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Template(TemplateNode),
    RawText(String),
    SpecialChar(SpecialChar),
    Print(PrintNode),
    If(IfNode),
    For(ForNode),
    Let(LetNode),
    Call(CallNode),
    Msg(MsgNode),
    VeLog(VeLogNode),
    HtmlOpenTag(HtmlTag),
    HtmlCloseTag { name: String },
}

impl NodeKind {
    /// Every list of child nodes, in source order.
    pub fn child_lists(&self) -> Vec<&Vec<NodeId>> {
        match self {
            NodeKind::Template(t) => vec![&t.body],
            NodeKind::If(n) => n
                .branches
                .iter()
                .map(|b| &b.body)
                .chain(n.else_body.as_ref())
                .collect(),
            NodeKind::For(n) => vec![&n.body],
            NodeKind::Let(LetNode {
                value: LetValue::Content { body, .. },
                ..
            }) => vec![body],
            NodeKind::Call(n) => n
                .params
                .iter()
                .filter_map(|p| match &p.value {
                    CallParamValue::Content { body, .. } => Some(body),
                    CallParamValue::Expr(_) => None,
                })
                .collect(),
            NodeKind::Msg(n) => vec![&n.body],
            NodeKind::VeLog(n) => vec![&n.body],
            NodeKind::HtmlOpenTag(tag) => tag
                .attributes
                .iter()
                .filter_map(|a| a.value.as_ref())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn child_lists_mut(&mut self) -> Vec<&mut Vec<NodeId>> {
        match self {
            NodeKind::Template(t) => vec![&mut t.body],
            NodeKind::If(n) => n
                .branches
                .iter_mut()
                .map(|b| &mut b.body)
                .chain(n.else_body.as_mut())
                .collect(),
            NodeKind::For(n) => vec![&mut n.body],
            NodeKind::Let(LetNode {
                value: LetValue::Content { body, .. },
                ..
            }) => vec![body],
            NodeKind::Call(n) => n
                .params
                .iter_mut()
                .filter_map(|p| match &mut p.value {
                    CallParamValue::Content { body, .. } => Some(body),
                    CallParamValue::Expr(_) => None,
                })
                .collect(),
            NodeKind::Msg(n) => vec![&mut n.body],
            NodeKind::VeLog(n) => vec![&mut n.body],
            NodeKind::HtmlOpenTag(tag) => tag
                .attributes
                .iter_mut()
                .filter_map(|a| a.value.as_mut())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Expressions held directly by this node (not by its children).
    pub fn expr_roots(&self) -> Vec<ExprId> {
        match self {
            NodeKind::Template(t) => t.state.iter().map(|s| s.default).collect(),
            NodeKind::Print(p) => std::iter::once(p.expr)
                .chain(p.directives.iter().flat_map(|d| d.args.iter().copied()))
                .collect(),
            NodeKind::If(n) => n.branches.iter().map(|b| b.cond).collect(),
            NodeKind::For(n) => vec![n.iterable],
            NodeKind::Let(LetNode {
                value: LetValue::Expr(expr),
                ..
            }) => vec![*expr],
            NodeKind::Call(n) => n
                .params
                .iter()
                .filter_map(|p| match &p.value {
                    CallParamValue::Expr(expr) => Some(*expr),
                    CallParamValue::Content { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// `{template}`, `{deltemplate}` or `{element}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub kind: TemplateKind,
    /// Fully qualified name. For delegates this is the delegate name.
    pub name: String,
    /// Delegate variant; empty string when a deltemplate declares none.
    pub variant: Option<String>,
    pub visibility: Visibility,
    pub content_kind: ContentKind,
    pub strict_html: bool,
    pub doc: Option<String>,
    pub params: Vec<ParamDecl>,
    pub state: Vec<StateDecl>,
    pub body: Vec<NodeId>,
}

impl TemplateNode {
    /// The registry key: `name` for basic and element templates,
    /// `name#variant[@package]` for delegates.
    pub fn template_name(&self, delegate_package: Option<&str>) -> String {
        match self.kind {
            TemplateKind::Delegate => {
                let mut name = format!(
                    "{}#{}",
                    self.name,
                    self.variant.as_deref().unwrap_or_default()
                );
                if let Some(package) = delegate_package {
                    name.push('@');
                    name.push_str(package);
                }
                name
            }
            TemplateKind::Basic | TemplateKind::Element => self.name.clone(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// `{@param}`, `{@param?}`, `{@inject}` or `{@attribute}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
    pub type_expr: String,
    /// Populated by the type resolution pass.
    pub ty: Option<Type>,
    pub required: bool,
    /// Injected params are supplied by the runtime, never by callers.
    pub implicit: bool,
    pub doc: Option<String>,
    pub span: Span,
}

/// `{@state name: type = default}` on element templates.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDecl {
    pub name: String,
    pub type_expr: Option<String>,
    pub ty: Option<Type>,
    pub default: ExprId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialChar {
    Space,
    Nil,
    LeftBrace,
    RightBrace,
    Newline,
    Tab,
    CarriageReturn,
}

impl SpecialChar {
    pub fn from_command(command: &str) -> Option<Self> {
        Some(match command {
            "sp" => SpecialChar::Space,
            "nil" => SpecialChar::Nil,
            "lb" => SpecialChar::LeftBrace,
            "rb" => SpecialChar::RightBrace,
            "\\n" => SpecialChar::Newline,
            "\\t" => SpecialChar::Tab,
            "\\r" => SpecialChar::CarriageReturn,
            _ => return None,
        })
    }

    pub fn text(self) -> &'static str {
        match self {
            SpecialChar::Space => " ",
            SpecialChar::Nil => "",
            SpecialChar::LeftBrace => "{",
            SpecialChar::RightBrace => "}",
            SpecialChar::Newline => "\n",
            SpecialChar::Tab => "\t",
            SpecialChar::CarriageReturn => "\r",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrintNode {
    pub expr: ExprId,
    pub directives: Vec<PrintDirective>,
}

impl PrintNode {
    pub fn has_directive(&self, name: &str) -> bool {
        self.directives.iter().any(|d| d.name == name)
    }
}

/// `|name:arg1,arg2`
#[derive(Debug, Clone, PartialEq)]
pub struct PrintDirective {
    pub name: String,
    pub args: Vec<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Vec<NodeId>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub cond: ExprId,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub var: String,
    pub iterable: ExprId,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetNode {
    pub var: String,
    pub value: LetValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LetValue {
    Expr(ExprId),
    Content { kind: ContentKind, body: Vec<NodeId> },
}

/// `{call}` or `{delcall}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    /// Callee as written until import resolution, fully qualified after.
    pub callee: String,
    pub delegate: bool,
    pub variant: Option<String>,
    /// `data="all"`
    pub data_all: bool,
    pub params: Vec<CallParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallParam {
    pub name: String,
    pub value: CallParamValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallParamValue {
    Expr(ExprId),
    Content { kind: ContentKind, body: Vec<NodeId> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MsgNode {
    pub desc: String,
    pub meaning: Option<String>,
    pub body: Vec<NodeId>,
}

/// `{velog Name}...{/velog}`
#[derive(Debug, Clone, PartialEq)]
pub struct VeLogNode {
    pub name: String,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HtmlTag {
    pub name: String,
    pub attributes: Vec<HtmlAttribute>,
    pub self_closing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HtmlAttribute {
    pub name: String,
    /// `None` for valueless attributes such as `disabled`.
    pub value: Option<Vec<NodeId>>,
    pub span: Span,
}

/// The parsed contents of one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub path: SourcePath,
    pub namespace: Option<String>,
    pub delegate_package: Option<String>,
    /// Alias → fully qualified namespace.
    pub aliases: IndexMap<String, String>,
    /// Template roots in declaration order.
    pub templates: Vec<NodeId>,
    pub nodes: IndexVec<NodeId, Node>,
    pub exprs: IndexVec<ExprId, Expr>,
    line_index: LineIndex,
}

impl FileNode {
    pub fn new(path: SourcePath, content: &str) -> Self {
        Self {
            path,
            namespace: None,
            delegate_package: None,
            aliases: IndexMap::new(),
            templates: Vec::new(),
            nodes: IndexVec::new(),
            exprs: IndexVec::new(),
            line_index: LineIndex::new(content),
        }
    }

    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.push(Node { kind, span })
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.exprs.push(Expr::new(kind, span))
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id]
    }

    pub fn location(&self, span: Span) -> SourceLocation {
        self.line_index.location(&self.path, span.start, span.end)
    }

    pub fn template(&self, id: NodeId) -> Option<&TemplateNode> {
        match &self.nodes.get(id)?.kind {
            NodeKind::Template(t) => Some(t),
            _ => None,
        }
    }

    pub fn template_mut(&mut self, id: NodeId) -> Option<&mut TemplateNode> {
        match &mut self.nodes.get_mut(id)?.kind {
            NodeKind::Template(t) => Some(t),
            _ => None,
        }
    }

    /// Template roots with their nodes, in declaration order.
    pub fn templates(&self) -> impl Iterator<Item = (NodeId, &TemplateNode)> {
        self.templates
            .iter()
            .filter_map(|id| self.template(*id).map(|t| (*id, t)))
    }

    /// All nodes below `root` in pre-order, excluding `root` itself.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_ids(root).into_iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.child_ids(id).into_iter().rev());
        }
        out
    }

    /// Direct children across all child lists.
    pub fn child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id]
            .kind
            .child_lists()
            .into_iter()
            .flatten()
            .copied()
            .collect()
    }

    /// `root` and every expression below it, in pre-order.
    pub fn expr_descendants(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.exprs[id].kind.children().into_iter().rev());
        }
        out
    }

    /// Every node reachable from a template root, roots included.
    pub fn reachable_nodes(&self) -> Vec<NodeId> {
        self.templates
            .iter()
            .flat_map(|root| std::iter::once(*root).chain(self.descendants(*root)))
            .collect()
    }

    /// Every expression held by a reachable node, in pre-order.
    pub fn reachable_exprs(&self) -> Vec<ExprId> {
        self.reachable_nodes()
            .into_iter()
            .flat_map(|id| self.nodes[id].kind.expr_roots())
            .flat_map(|root| self.expr_descendants(root))
            .collect()
    }

    /// Replace every child list of every reachable node with the result of `f`.
    ///
    /// `f` may allocate new nodes; those are not visited.
    pub fn rewrite_child_lists(
        &mut self,
        mut f: impl FnMut(&mut FileNode, Vec<NodeId>) -> Vec<NodeId>,
    ) {
        for id in self.reachable_nodes() {
            let slots = self.nodes[id].kind.child_lists().len();
            for slot in 0..slots {
                let Some(list) = self.nodes[id].kind.child_lists_mut().into_iter().nth(slot) else {
                    continue;
                };
                let taken = std::mem::take(list);
                let rewritten = f(self, taken);
                if let Some(list) = self.nodes[id].kind.child_lists_mut().into_iter().nth(slot) {
                    *list = rewritten;
                }
            }
        }
    }

    /// Drop template and parameter documentation.
    pub fn strip_doc_strings(&mut self) {
        for id in self.templates.clone() {
            if let Some(template) = self.template_mut(id) {
                template.doc = None;
                for param in &mut template.params {
                    param.doc = None;
                }
            }
        }
    }
}

/// Root of one compilation: every parsed source file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileSetNode {
    pub files: Vec<FileNode>,
}

impl FileSetNode {
    pub fn new(files: Vec<FileNode>) -> Self {
        Self { files }
    }

    pub fn file(&self, path: &SourcePath) -> Option<&FileNode> {
        self.files.iter().find(|f| &f.path == path)
    }

    /// Every template in the set with its file.
    pub fn templates(&self) -> impl Iterator<Item = (&FileNode, NodeId, &TemplateNode)> {
        self.files
            .iter()
            .flat_map(|file| file.templates().map(move |(id, t)| (file, id, t)))
    }

    pub fn find_template(&self, name: &str) -> Option<(&FileNode, NodeId, &TemplateNode)> {
        self.templates().find(|(_, _, t)| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Literal;

    fn file_with_if() -> (FileNode, NodeId, NodeId) {
        let mut file = FileNode::new(SourcePath::new("a.st"), "{template .a}x{/template}");
        let text = file.alloc(NodeKind::RawText("x".into()), Span::new(13, 14));
        let cond = file.alloc_expr(ExprKind::Literal(Literal::Bool(true)), Span::default());
        let iff = file.alloc(
            NodeKind::If(IfNode {
                branches: vec![IfBranch {
                    cond,
                    body: vec![text],
                }],
                else_body: None,
            }),
            Span::default(),
        );
        let template = file.alloc(
            NodeKind::Template(TemplateNode {
                kind: TemplateKind::Basic,
                name: "ns.a".into(),
                variant: None,
                visibility: Visibility::Public,
                content_kind: ContentKind::Html,
                strict_html: true,
                doc: Some("docs".into()),
                params: Vec::new(),
                state: Vec::new(),
                body: vec![iff],
            }),
            Span::new(0, 25),
        );
        file.templates.push(template);
        (file, template, text)
    }

    #[test]
    fn test_descendants_are_preorder() {
        let (file, template, text) = file_with_if();
        assert_eq!(file.descendants(template), vec![NodeId(1), text]);
        assert_eq!(file.reachable_exprs(), vec![ExprId(0)]);
    }

    #[test]
    fn test_rewrite_child_lists() {
        let (mut file, template, text) = file_with_if();
        file.rewrite_child_lists(|file, list| {
            list.into_iter()
                .flat_map(|id| match &file.node(id).kind {
                    NodeKind::If(n) => n.branches[0].body.clone(),
                    _ => vec![id],
                })
                .collect()
        });
        assert_eq!(file.template(template).unwrap().body, vec![text]);
    }

    #[test]
    fn test_delegate_template_name() {
        let (mut file, template, _) = file_with_if();
        let node = file.template_mut(template).unwrap();
        node.kind = TemplateKind::Delegate;
        node.variant = Some("compact".into());
        assert_eq!(node.template_name(None), "ns.a#compact");
        assert_eq!(node.template_name(Some("pkg")), "ns.a#compact@pkg");
    }

    #[test]
    fn test_strip_doc_strings() {
        let (mut file, template, _) = file_with_if();
        file.strip_doc_strings();
        assert_eq!(file.template(template).unwrap().doc, None);
    }
}
