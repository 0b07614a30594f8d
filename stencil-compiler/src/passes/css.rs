use eyre::Result;
use stencil_ast::{ExprKind, FileSetNode, Literal};

use super::{FileSetPass, PassContext, PassId};
use crate::registry::TemplateRegistry;

/// Check literal `css('name')` arguments against the css registry, when one
/// is configured.
pub struct ValidateCss;

impl FileSetPass for ValidateCss {
    fn id(&self) -> PassId {
        PassId::ValidateCss
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        let Some(css) = ctx.config.css_registry() else {
            return Ok(());
        };
        for file in &file_set.files {
            for id in file.reachable_exprs() {
                let ExprKind::FunctionCall { name, args, .. } = &file.expr(id).kind else {
                    continue;
                };
                if name != "css" {
                    continue;
                }
                let Some(Literal::String(class)) = args.first().and_then(|a| file.expr(*a).as_literal())
                else {
                    continue;
                };
                if !css.contains(class) {
                    ctx.diagnostics.error(
                        self.id().name(),
                        format!("unknown css class '{}'", class),
                        file.location(file.expr(id).span),
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{CssRegistry, PassManagerConfig},
        passes::testing::{messages, parse, run_file_set_pass, run_file_set_pass_with},
    };

    const SRC: &str = "{namespace a}{template .t}{@param c: string}\
                       <div class=\"{css('btn')} {css('btn-huge')} {css($c)}\"></div>{/template}";

    #[test]
    fn test_unknown_classes() {
        let config = PassManagerConfig::builder()
            .css_registry(Some(Arc::new(CssRegistry::new(["btn", "card"]))))
            .build();
        let mut set = FileSetNode::new(vec![parse(SRC)]);
        let diagnostics =
            run_file_set_pass_with(&ValidateCss, &mut set, &TemplateRegistry::default(), &config);
        assert_eq!(messages(&diagnostics), vec!["unknown css class 'btn-huge'"]);
    }

    #[test]
    fn test_without_registry() {
        let mut set = FileSetNode::new(vec![parse(SRC)]);
        assert!(run_file_set_pass(&ValidateCss, &mut set).is_empty());
    }
}
