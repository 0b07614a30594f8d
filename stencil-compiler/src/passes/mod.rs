//! The pass manager and the passes it runs.
//!
//! Passes come in two scopes. File passes run on each parsed file before the
//! template registry exists; file-set passes run afterwards with the registry
//! at hand. The order of both is fixed by [`PassId`]; a [`PassManager`]
//! selects the enabled subset and cuts it at the configured continuation
//! rules when it is built.

mod calls;
mod conformance;
mod css;
mod debug;
mod desugar;
mod escaping;
mod header_vars;
mod optimize;
mod resolve;
mod types;
mod velog;

use std::{fmt, str::FromStr};

pub use debug::DEBUG_ATTRIBUTE;

use eyre::Result;
use stencil_ast::{FileNode, FileSetNode, LetValue, NodeId, NodeKind};

use crate::{
    config::{AstRewrites, ContinuationRule, PassManagerConfig},
    diagnostics::Diagnostics,
    registry::TemplateRegistry,
};

/// Every pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassId {
    DesugarSyntax,
    ResolveImports,
    ResolveGlobals,
    ResolvePlugins,
    ResolveTypes,
    ValidateVeLog,
    CheckCalls,
    Conformance,
    CheckHeaderVars,
    ValidateCss,
    Optimize,
    InsertEscapingDirectives,
    AddDebugAttributes,
    DesugarHtmlAndState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassScope {
    File,
    FileSet,
}

impl PassId {
    pub const ALL: [PassId; 14] = [
        PassId::DesugarSyntax,
        PassId::ResolveImports,
        PassId::ResolveGlobals,
        PassId::ResolvePlugins,
        PassId::ResolveTypes,
        PassId::ValidateVeLog,
        PassId::CheckCalls,
        PassId::Conformance,
        PassId::CheckHeaderVars,
        PassId::ValidateCss,
        PassId::Optimize,
        PassId::InsertEscapingDirectives,
        PassId::AddDebugAttributes,
        PassId::DesugarHtmlAndState,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PassId::DesugarSyntax => "desugar-syntax",
            PassId::ResolveImports => "resolve-imports",
            PassId::ResolveGlobals => "resolve-globals",
            PassId::ResolvePlugins => "resolve-plugins",
            PassId::ResolveTypes => "resolve-types",
            PassId::ValidateVeLog => "validate-velog",
            PassId::CheckCalls => "check-calls",
            PassId::Conformance => "conformance",
            PassId::CheckHeaderVars => "check-header-vars",
            PassId::ValidateCss => "validate-css",
            PassId::Optimize => "optimize",
            PassId::InsertEscapingDirectives => "insert-escaping-directives",
            PassId::AddDebugAttributes => "add-debug-attributes",
            PassId::DesugarHtmlAndState => "desugar-html-and-state",
        }
    }

    pub fn scope(self) -> PassScope {
        if self < PassId::CheckCalls {
            PassScope::File
        } else {
            PassScope::FileSet
        }
    }

    fn position(self) -> usize {
        PassId::ALL.iter().position(|p| *p == self).unwrap_or(PassId::ALL.len())
    }
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PassId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PassId::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown pass '{}'", s))
    }
}

/// What a running pass can see besides the tree.
pub struct PassContext<'a> {
    pub config: &'a PassManagerConfig,
    pub diagnostics: &'a mut Diagnostics,
}

/// A pass over one parsed file.
///
/// Language problems are reported to the context's diagnostics; `Err` is
/// reserved for fatal internal failures.
pub trait FilePass: Send + Sync {
    fn id(&self) -> PassId;

    fn run(&self, file: &mut FileNode, ctx: &mut PassContext<'_>) -> Result<()>;
}

/// A pass over every source file, with the template registry available.
pub trait FileSetPass: Send + Sync {
    fn id(&self) -> PassId;

    fn run(
        &self,
        file_set: &mut FileSetNode,
        registry: &TemplateRegistry,
        ctx: &mut PassContext<'_>,
    ) -> Result<()>;
}

/// Runs the passes selected by one [`PassManagerConfig`].
///
/// Built fresh for each compilation; continuation rules are applied once, in
/// [`PassManager::new`].
pub struct PassManager {
    config: PassManagerConfig,
    file_passes: Vec<Box<dyn FilePass>>,
    file_set_passes: Vec<Box<dyn FileSetPass>>,
}

impl PassManager {
    pub fn new(config: PassManagerConfig) -> Self {
        let limit = config
            .continuation_rules()
            .iter()
            .map(|rule| match rule {
                ContinuationRule::StopBefore(pass) => pass.position(),
                ContinuationRule::StopAfter(pass) => pass.position() + 1,
            })
            .min()
            .unwrap_or(PassId::ALL.len());

        let mut file_passes: Vec<Box<dyn FilePass>> = Vec::new();
        let mut file_set_passes: Vec<Box<dyn FileSetPass>> = Vec::new();
        for id in PassId::ALL.into_iter().take(limit) {
            if !enabled(id, &config) {
                continue;
            }
            match id {
                PassId::DesugarSyntax => file_passes.push(Box::new(desugar::DesugarSyntax)),
                PassId::ResolveImports => file_passes.push(Box::new(resolve::ResolveImports)),
                PassId::ResolveGlobals => file_passes.push(Box::new(resolve::ResolveGlobals)),
                PassId::ResolvePlugins => file_passes.push(Box::new(resolve::ResolvePlugins)),
                PassId::ResolveTypes => file_passes.push(Box::new(types::ResolveTypes)),
                PassId::ValidateVeLog => file_passes.push(Box::new(velog::ValidateVeLog)),
                PassId::CheckCalls => file_set_passes.push(Box::new(calls::CheckCalls)),
                PassId::Conformance => file_set_passes.push(Box::new(conformance::Conformance)),
                PassId::CheckHeaderVars => {
                    file_set_passes.push(Box::new(header_vars::CheckHeaderVars))
                }
                PassId::ValidateCss => file_set_passes.push(Box::new(css::ValidateCss)),
                PassId::Optimize => file_set_passes.push(Box::new(optimize::Optimize)),
                PassId::InsertEscapingDirectives => {
                    file_set_passes.push(Box::new(escaping::InsertEscapingDirectives))
                }
                PassId::AddDebugAttributes => {
                    file_set_passes.push(Box::new(debug::AddDebugAttributes))
                }
                PassId::DesugarHtmlAndState => {
                    file_set_passes.push(Box::new(desugar::DesugarHtmlAndState))
                }
            }
        }

        Self {
            config,
            file_passes,
            file_set_passes,
        }
    }

    /// The passes this manager will run, in order.
    pub fn planned(&self) -> Vec<PassId> {
        self.file_passes
            .iter()
            .map(|p| p.id())
            .chain(self.file_set_passes.iter().map(|p| p.id()))
            .collect()
    }

    pub fn run_file_passes(&self, file: &mut FileNode, diagnostics: &mut Diagnostics) -> Result<()> {
        let mut ctx = PassContext {
            config: &self.config,
            diagnostics,
        };
        for pass in &self.file_passes {
            tracing::debug!(pass = %pass.id(), file = %file.path, "running file pass");
            pass.run(file, &mut ctx)?;
        }
        Ok(())
    }

    pub fn run_file_set_passes(
        &self,
        file_set: &mut FileSetNode,
        registry: &TemplateRegistry,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let mut ctx = PassContext {
            config: &self.config,
            diagnostics,
        };
        for pass in &self.file_set_passes {
            tracing::debug!(pass = %pass.id(), files = file_set.files.len(), "running file set pass");
            pass.run(file_set, registry, &mut ctx)?;
        }
        Ok(())
    }
}

fn enabled(id: PassId, config: &PassManagerConfig) -> bool {
    match id {
        PassId::DesugarSyntax => config.ast_rewrites() == AstRewrites::All,
        PassId::ResolveTypes
        | PassId::ValidateVeLog
        | PassId::CheckCalls
        | PassId::CheckHeaderVars => config.type_checking(),
        PassId::Optimize => config.optimize(),
        PassId::InsertEscapingDirectives => config.insert_escaping_directives(),
        PassId::AddDebugAttributes => config.add_debug_attributes(),
        PassId::DesugarHtmlAndState => config.desugar_html_and_state(),
        PassId::ResolveImports
        | PassId::ResolveGlobals
        | PassId::ResolvePlugins
        | PassId::Conformance
        | PassId::ValidateCss => true,
    }
}

/// Visit every node under `body` in order, with the names of the variables
/// in scope at that node.
pub(crate) fn walk_scoped(
    file: &FileNode,
    body: &[NodeId],
    scope: &mut Vec<String>,
    visit: &mut impl FnMut(NodeId, &[String]),
) {
    let depth = scope.len();
    for &id in body {
        visit(id, scope.as_slice());
        match &file.node(id).kind {
            NodeKind::For(node) => {
                scope.push(node.var.clone());
                walk_scoped(file, &node.body, scope, visit);
                scope.pop();
            }
            NodeKind::Let(node) => {
                if let LetValue::Content { body, .. } = &node.value {
                    walk_scoped(file, body, scope, visit);
                }
                scope.push(node.var.clone());
            }
            kind => {
                for list in kind.child_lists() {
                    walk_scoped(file, list, scope, visit);
                }
            }
        }
    }
    scope.truncate(depth);
}

/// Merge runs of adjacent raw text nodes into the first of each run.
pub(crate) fn merge_raw_text(file: &mut FileNode, list: Vec<NodeId>) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::with_capacity(list.len());
    for id in list {
        let NodeKind::RawText(text) = &file.node(id).kind else {
            out.push(id);
            continue;
        };
        let text = text.clone();
        let span = file.node(id).span;
        if let Some(&last) = out.last() {
            let last_node = file.node_mut(last);
            if let NodeKind::RawText(existing) = &mut last_node.kind {
                existing.push_str(&text);
                last_node.span = last_node.span.to(span);
                continue;
            }
        }
        out.push(id);
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use stencil_ast::{FileNode, FileSetNode, NodeId, NodeKind};
    use stencil_core::SourceUnit;

    use super::{FilePass, FileSetPass, PassContext};
    use crate::{
        config::PassManagerConfig, diagnostics::Diagnostics, registry::TemplateRegistry,
    };

    pub fn parse(src: &str) -> FileNode {
        parse_as("test.st", src)
    }

    pub fn parse_as(path: &str, src: &str) -> FileNode {
        match stencil_parser::parse(&SourceUnit::new(path, src)) {
            Ok(file) => file,
            Err(err) => panic!("parse failed: {}", err),
        }
    }

    pub fn run_file_pass(pass: &dyn FilePass, file: &mut FileNode) -> Diagnostics {
        run_file_pass_with(pass, file, &PassManagerConfig::builder().build())
    }

    pub fn run_file_pass_with(
        pass: &dyn FilePass,
        file: &mut FileNode,
        config: &PassManagerConfig,
    ) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let mut ctx = PassContext {
            config,
            diagnostics: &mut diagnostics,
        };
        pass.run(file, &mut ctx).expect("pass should not fail");
        diagnostics
    }

    pub fn run_file_set_pass(pass: &dyn FileSetPass, set: &mut FileSetNode) -> Diagnostics {
        run_file_set_pass_with(
            pass,
            set,
            &TemplateRegistry::default(),
            &PassManagerConfig::builder().build(),
        )
    }

    pub fn run_file_set_pass_with(
        pass: &dyn FileSetPass,
        set: &mut FileSetNode,
        registry: &TemplateRegistry,
        config: &PassManagerConfig,
    ) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let mut ctx = PassContext {
            config,
            diagnostics: &mut diagnostics,
        };
        pass.run(set, registry, &mut ctx).expect("pass should not fail");
        diagnostics
    }

    /// Messages of all diagnostics, in report order.
    pub fn messages(diagnostics: &Diagnostics) -> Vec<String> {
        diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    /// A compact rendering of a node list, one entry per node joined by `|`.
    pub fn body_text(file: &FileNode, body: &[NodeId]) -> String {
        body.iter()
            .map(|id| match &file.node(*id).kind {
                NodeKind::RawText(text) => text.clone(),
                NodeKind::SpecialChar(c) => format!("special({:?})", c),
                NodeKind::Print(print) => {
                    let directives: Vec<&str> =
                        print.directives.iter().map(|d| d.name.as_str()).collect();
                    if directives.is_empty() {
                        "print".to_string()
                    } else {
                        format!("print[{}]", directives.join(","))
                    }
                }
                NodeKind::If(_) => "if".to_string(),
                NodeKind::For(_) => "for".to_string(),
                NodeKind::Let(node) => format!("let(${})", node.var),
                NodeKind::Call(call) => format!("call({})", call.callee),
                NodeKind::Msg(_) => "msg".to_string(),
                NodeKind::VeLog(node) => format!("velog({})", node.name),
                NodeKind::HtmlOpenTag(tag) => format!("<{}>", tag.name),
                NodeKind::HtmlCloseTag { name } => format!("</{}>", name),
                NodeKind::Template(_) => "template".to_string(),
            })
            .collect::<Vec<_>>()
            .join("|")
    }
}
