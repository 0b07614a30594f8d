use eyre::Result;
use stencil_ast::{ExprKind, FileNode, NodeKind};

use super::{FilePass, PassContext, PassId};
use crate::config::AstRewrites;

/// Qualify `{call .local}` with the file namespace and `{call alias.name}`
/// with the aliased namespace.
pub struct ResolveImports;

impl FilePass for ResolveImports {
    fn id(&self) -> PassId {
        PassId::ResolveImports
    }

    fn run(&self, file: &mut FileNode, ctx: &mut PassContext<'_>) -> Result<()> {
        for id in file.reachable_nodes() {
            let NodeKind::Call(call) = &file.node(id).kind else {
                continue;
            };
            if call.delegate {
                continue;
            }
            let resolved = if let Some(local) = call.callee.strip_prefix('.') {
                match &file.namespace {
                    Some(namespace) => format!("{}.{}", namespace, local),
                    None => {
                        let message = format!(
                            "relative call '{}' requires a {{namespace}} declaration",
                            call.callee
                        );
                        let location = file.location(file.node(id).span);
                        ctx.diagnostics.error(self.id().name(), message, location);
                        continue;
                    }
                }
            } else {
                let (head, rest) = call
                    .callee
                    .split_once('.')
                    .unwrap_or((call.callee.as_str(), ""));
                match file.aliases.get(head) {
                    Some(target) if rest.is_empty() => target.clone(),
                    Some(target) => format!("{}.{}", target, rest),
                    None => continue,
                }
            };
            if let NodeKind::Call(call) = &mut file.node_mut(id).kind {
                call.callee = resolved;
            }
        }
        Ok(())
    }
}

/// Replace references to compile-time globals with their values.
///
/// Unknown globals are errors unless the configuration allows them. With
/// [`AstRewrites::None`] known globals are left in place.
pub struct ResolveGlobals;

impl FilePass for ResolveGlobals {
    fn id(&self) -> PassId {
        PassId::ResolveGlobals
    }

    fn run(&self, file: &mut FileNode, ctx: &mut PassContext<'_>) -> Result<()> {
        let globals = ctx.config.compile_time_globals();
        for id in file.reachable_exprs() {
            let ExprKind::Global(name) = &file.expr(id).kind else {
                continue;
            };
            match globals.get(name) {
                Some(value) => {
                    if ctx.config.ast_rewrites() == AstRewrites::All {
                        file.expr_mut(id).kind = ExprKind::Literal(value.clone());
                    }
                }
                None if ctx.config.allow_unknown_globals() => {}
                None => {
                    let message = format!("unknown global '{}'", name);
                    let location = file.location(file.expr(id).span);
                    ctx.diagnostics.error(self.id().name(), message, location);
                }
            }
        }
        Ok(())
    }
}

/// Bind function calls and print directives to registered plugins.
///
/// Method calls need the receiver type and are bound during type resolution.
pub struct ResolvePlugins;

impl FilePass for ResolvePlugins {
    fn id(&self) -> PassId {
        PassId::ResolvePlugins
    }

    fn run(&self, file: &mut FileNode, ctx: &mut PassContext<'_>) -> Result<()> {
        let resolver = ctx.config.plugin_resolver();
        for id in file.reachable_exprs() {
            let ExprKind::FunctionCall { name, args, .. } = &file.expr(id).kind else {
                continue;
            };
            match resolver.resolve_function(name, args.len()) {
                Ok(resolved) => {
                    if let ExprKind::FunctionCall { callee, .. } = &mut file.expr_mut(id).kind {
                        *callee = Some(resolved);
                    }
                }
                Err(message) => {
                    let location = file.location(file.expr(id).span);
                    ctx.diagnostics.error(self.id().name(), message, location);
                }
            }
        }

        for id in file.reachable_nodes() {
            let NodeKind::Print(print) = &file.node(id).kind else {
                continue;
            };
            for directive in &print.directives {
                if let Err(message) = resolver.resolve_directive(&directive.name, directive.args.len())
                {
                    let location = file.location(directive.span);
                    ctx.diagnostics.error(self.id().name(), message, location);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;
    use stencil_ast::{Callee, Literal};

    use super::*;
    use crate::{
        config::PassManagerConfig,
        passes::testing::{messages, parse, run_file_pass, run_file_pass_with},
        plugins::{Mode, PluginResolver},
    };

    fn callees(file: &FileNode) -> Vec<String> {
        file.reachable_nodes()
            .into_iter()
            .filter_map(|id| match &file.node(id).kind {
                NodeKind::Call(call) => Some(call.callee.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_resolve_imports() {
        let mut file = parse(
            "{namespace app.main}{alias app.widgets as w}\
             {template .t}{call .other /}{call w.button /}{call w /}{call lib.x /}\
             {delcall my.widget /}{/template}",
        );
        let diagnostics = run_file_pass(&ResolveImports, &mut file);
        assert!(diagnostics.is_empty());
        assert_eq!(
            callees(&file),
            vec!["app.main.other", "app.widgets.button", "app.widgets", "lib.x", "my.widget"]
        );
    }

    #[test]
    fn test_unknown_global() {
        let mut file = parse("{namespace a}{template .t}{app.MAX}{app.MIN}{/template}");
        let mut globals = IndexMap::new();
        globals.insert("app.MAX".to_string(), Literal::Int(10));
        let config = PassManagerConfig::builder()
            .compile_time_globals(Arc::new(globals))
            .build();
        let diagnostics = run_file_pass_with(&ResolveGlobals, &mut file, &config);
        assert_eq!(messages(&diagnostics), vec!["unknown global 'app.MIN'"]);

        let literals: Vec<_> = file
            .reachable_exprs()
            .into_iter()
            .filter_map(|id| file.expr(id).as_literal().cloned())
            .collect();
        assert_eq!(literals, vec![Literal::Int(10)]);
    }

    #[test]
    fn test_strict_and_permissive_plugins() {
        let src = "{namespace a}{template .t}{frobnicate(1)}{'x' |bidi}{/template}";

        let mut file = parse(src);
        let diagnostics = run_file_pass(&ResolvePlugins, &mut file);
        assert_eq!(
            messages(&diagnostics),
            vec!["unknown function 'frobnicate'", "unknown print directive 'bidi'"]
        );

        let mut file = parse(src);
        let config = PassManagerConfig::builder()
            .plugin_resolver(Arc::new(PluginResolver::builtin(Mode::AllowUndefined)))
            .build();
        let diagnostics = run_file_pass_with(&ResolvePlugins, &mut file, &config);
        assert!(diagnostics.is_empty());
        let callee = file.reachable_exprs().into_iter().find_map(|id| match &file.expr(id).kind {
            ExprKind::FunctionCall { callee, .. } => callee.clone(),
            _ => None,
        });
        assert_eq!(callee, Some(Callee::Unknown));
    }
}
