use eyre::Result;
use stencil_ast::{FileNode, NodeId, NodeKind};

use super::{FilePass, PassContext, PassId};

/// Check `{velog}` blocks against the logging configuration.
pub struct ValidateVeLog;

impl FilePass for ValidateVeLog {
    fn id(&self) -> PassId {
        PassId::ValidateVeLog
    }

    fn run(&self, file: &mut FileNode, ctx: &mut PassContext<'_>) -> Result<()> {
        for id in file.reachable_nodes() {
            let NodeKind::VeLog(velog) = &file.node(id).kind else {
                continue;
            };
            let location = file.location(file.node(id).span);
            if ctx.config.logging().element(&velog.name).is_none() {
                ctx.diagnostics.error(
                    self.id().name(),
                    format!("unknown visual element '{}'", velog.name),
                    location.clone(),
                );
            }
            if root_elements(file, &velog.body) != Some(1) {
                ctx.diagnostics.error(
                    self.id().name(),
                    format!("{{velog {}}} must wrap exactly one HTML element", velog.name),
                    location,
                );
            }
        }
        Ok(())
    }
}

/// Count top-level elements in `body`, or `None` if it holds anything else
/// at the top level.
fn root_elements(file: &FileNode, body: &[NodeId]) -> Option<usize> {
    let mut depth = 0usize;
    let mut roots = 0;
    for id in body {
        match &file.node(*id).kind {
            NodeKind::HtmlOpenTag(tag) => {
                if depth == 0 {
                    roots += 1;
                }
                if !tag.self_closing {
                    depth += 1;
                }
            }
            NodeKind::HtmlCloseTag { .. } => depth = depth.checked_sub(1)?,
            NodeKind::RawText(text) if depth == 0 && text.trim().is_empty() => {}
            _ if depth == 0 => return None,
            _ => {}
        }
    }
    (depth == 0).then_some(roots)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{LoggableElement, LoggingConfig, PassManagerConfig},
        passes::testing::{messages, parse, run_file_pass_with},
    };

    fn config() -> PassManagerConfig {
        let logging = LoggingConfig {
            elements: vec![LoggableElement {
                name: "Clickable".to_string(),
                id: 7,
            }],
        };
        PassManagerConfig::builder()
            .logging(Arc::new(logging))
            .build()
    }

    #[test]
    fn test_velog() {
        let mut file = parse(
            "{namespace a}{template .t}\
             {velog Clickable}<a href=\"/\">x</a>{/velog}\
             {velog Hoverable}<img src=\"x\"/>{/velog}\
             {velog Clickable}x<b></b>{/velog}\
             {velog Clickable}<b></b><i></i>{/velog}\
             {/template}",
        );
        let diagnostics = run_file_pass_with(&ValidateVeLog, &mut file, &config());
        assert_eq!(
            messages(&diagnostics),
            vec![
                "unknown visual element 'Hoverable'",
                "{velog Clickable} must wrap exactly one HTML element",
                "{velog Clickable} must wrap exactly one HTML element",
            ]
        );
    }
}
