use std::collections::HashSet;

use eyre::Result;
use stencil_ast::{ExprKind, FileNode, FileSetNode, NodeId, NodeKind};

use super::{FileSetPass, PassContext, PassId, walk_scoped};
use crate::registry::TemplateRegistry;

/// Match `$var` references against header declarations and local bindings.
///
/// References to nothing in scope are errors. Params never referenced are
/// warnings, unless the template forwards its data with `data="all"`.
pub struct CheckHeaderVars;

impl FileSetPass for CheckHeaderVars {
    fn id(&self) -> PassId {
        PassId::CheckHeaderVars
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        for file in &file_set.files {
            for id in file.templates.clone() {
                check_template(file, id, ctx);
            }
        }
        Ok(())
    }
}

fn check_template(file: &FileNode, id: NodeId, ctx: &mut PassContext<'_>) {
    let Some(template) = file.template(id) else {
        return;
    };
    let phase = PassId::CheckHeaderVars.name();
    let declared: HashSet<&str> = template
        .params
        .iter()
        .map(|p| p.name.as_str())
        .chain(template.state.iter().map(|s| s.name.as_str()))
        .collect();
    let mut used: HashSet<String> = HashSet::new();

    for decl in &template.state {
        for expr in file.expr_descendants(decl.default) {
            if let ExprKind::Var(name) = &file.expr(expr).kind {
                used.insert(name.clone());
            }
        }
    }

    let mut scope = Vec::new();
    walk_scoped(file, &template.body, &mut scope, &mut |node, scope| {
        for root in file.node(node).kind.expr_roots() {
            for expr in file.expr_descendants(root) {
                let ExprKind::Var(name) = &file.expr(expr).kind else {
                    continue;
                };
                if scope.iter().any(|local| local == name) {
                    continue;
                }
                if declared.contains(name.as_str()) {
                    used.insert(name.clone());
                    continue;
                }
                ctx.diagnostics.error(
                    phase,
                    format!("undeclared variable '${}'", name),
                    file.location(file.expr(expr).span),
                );
            }
        }
    });

    let forwards_data = file.descendants(id).into_iter().any(|node| {
        matches!(&file.node(node).kind, NodeKind::Call(call) if call.data_all)
    });
    if forwards_data {
        return;
    }
    for param in &template.params {
        if !used.contains(&param.name) {
            ctx.diagnostics.warning(
                phase,
                format!("param '{}' is never used", param.name),
                file.location(param.span),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{messages, parse, run_file_set_pass};

    #[test]
    fn test_undeclared_and_unused() {
        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}{template .t}{@param used: string}{@param unused: int}\
             {for $i in [1]}{$i}{/for}{$i}{$used}{$ghost}{let $l: 1 /}{$l}\
             {/template}",
        )]);
        let diagnostics = run_file_set_pass(&CheckHeaderVars, &mut set);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "undeclared variable '$i'",
                "undeclared variable '$ghost'",
                "param 'unused' is never used",
            ]
        );
        assert_eq!(diagnostics.error_count(), 2);
        assert_eq!(diagnostics.warning_count(), 1);
    }

    #[test]
    fn test_data_all_suppresses_unused_warnings() {
        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}{template .t}{@param p: int}{call .u data=\"all\" /}{/template}\
             {element .e}{@param label: string}{@state text: string = $label}<p>{$text}</p>{/element}",
        )]);
        let diagnostics = run_file_set_pass(&CheckHeaderVars, &mut set);
        assert!(diagnostics.is_empty());
    }
}
