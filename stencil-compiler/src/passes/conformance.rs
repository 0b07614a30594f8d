use eyre::Result;
use stencil_ast::{ExprKind, FileNode, FileSetNode, NodeKind};
use stencil_core::SourceLocation;

use super::{FileSetPass, PassContext, PassId};
use crate::{config::ConformanceRule, registry::TemplateRegistry};

/// Report every use the conformance rules ban.
pub struct Conformance;

impl FileSetPass for Conformance {
    fn id(&self) -> PassId {
        PassId::Conformance
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        let rules = &ctx.config.conformance().rules;
        if rules.is_empty() {
            return Ok(());
        }
        for file in &file_set.files {
            for (rule, location) in violations(file, rules) {
                ctx.diagnostics
                    .error(self.id().name(), rule.message(), location);
            }
        }
        Ok(())
    }
}

fn violations<'r>(
    file: &FileNode,
    rules: &'r [ConformanceRule],
) -> Vec<(&'r ConformanceRule, SourceLocation)> {
    let mut found = Vec::new();
    for id in file.reachable_nodes() {
        let node = file.node(id);
        for rule in rules {
            let hit = match (rule, &node.kind) {
                (ConformanceRule::BannedDirective { name, .. }, NodeKind::Print(print)) => {
                    print.has_directive(name)
                }
                (ConformanceRule::BannedRawText { text, .. }, NodeKind::RawText(raw)) => {
                    raw.contains(text.as_str())
                }
                (ConformanceRule::BannedHtmlTag { tag, .. }, NodeKind::HtmlOpenTag(open)) => {
                    open.name.eq_ignore_ascii_case(tag)
                }
                _ => false,
            };
            if hit {
                found.push((rule, file.location(node.span)));
            }
        }
    }

    for id in file.reachable_exprs() {
        let ExprKind::FunctionCall { name: called, .. } = &file.expr(id).kind else {
            continue;
        };
        for rule in rules {
            if let ConformanceRule::BannedFunction { name, .. } = rule
                && name == called
            {
                found.push((rule, file.location(file.expr(id).span)));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{ConformanceConfig, PassManagerConfig},
        passes::testing::{messages, parse, run_file_set_pass_with},
    };

    #[test]
    fn test_banned_constructs() {
        let conformance = ConformanceConfig::from_toml(
            r#"
            [[rules]]
            kind = "banned-function"
            name = "checkNotNull"
            message = "checkNotNull is banned"

            [[rules]]
            kind = "banned-directive"
            name = "noAutoescape"
            message = "noAutoescape bypasses escaping"

            [[rules]]
            kind = "banned-raw-text"
            text = "javascript:"
            message = "javascript: URLs are banned"

            [[rules]]
            kind = "banned-html-tag"
            tag = "SCRIPT"
            message = "script tags are banned"
            "#,
        )
        .expect("valid conformance config");
        let config = PassManagerConfig::builder()
            .conformance(Arc::new(conformance))
            .build();

        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}{template .t}{@param x: ?}\
             <script></script>{$x |noAutoescape}go javascript:void{checkNotNull($x)}\
             {/template}",
        )]);
        let diagnostics =
            run_file_set_pass_with(&Conformance, &mut set, &TemplateRegistry::default(), &config);
        assert_eq!(
            messages(&diagnostics),
            vec![
                "script tags are banned",
                "noAutoescape bypasses escaping",
                "javascript: URLs are banned",
                "checkNotNull is banned",
            ]
        );
    }

    #[test]
    fn test_no_rules() {
        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}{template .t}{checkNotNull(1)}{/template}",
        )]);
        let diagnostics = crate::passes::testing::run_file_set_pass(&Conformance, &mut set);
        assert!(diagnostics.is_empty());
    }
}
