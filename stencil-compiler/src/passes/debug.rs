use eyre::Result;
use stencil_ast::{ContentKind, FileNode, FileSetNode, HtmlAttribute, NodeId, NodeKind};

use super::{FileSetPass, PassContext, PassId};
use crate::registry::TemplateRegistry;

pub const DEBUG_ATTRIBUTE: &str = "data-debug";

/// Tag the first root element of every strict HTML template with
/// `data-debug="<template> <path>:<line>"`.
pub struct AddDebugAttributes;

impl FileSetPass for AddDebugAttributes {
    fn id(&self) -> PassId {
        PassId::AddDebugAttributes
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        _ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        for file in &mut file_set.files {
            for id in file.templates.clone() {
                tag_root_element(file, id);
            }
        }
        Ok(())
    }
}

fn tag_root_element(file: &mut FileNode, id: NodeId) {
    let Some(template) = file.template(id) else {
        return;
    };
    if !template.strict_html || template.content_kind != ContentKind::Html {
        return;
    }
    let Some(root) = template
        .body
        .iter()
        .copied()
        .find(|node| matches!(file.node(*node).kind, NodeKind::HtmlOpenTag(_)))
    else {
        return;
    };

    let span = file.node(root).span;
    let location = file.location(span);
    let text = format!(
        "{} {}:{}",
        template.template_name(file.delegate_package.as_deref()),
        location.path,
        location.begin.line
    );
    let value = file.alloc(NodeKind::RawText(text), span);
    if let NodeKind::HtmlOpenTag(tag) = &mut file.node_mut(root).kind {
        tag.attributes.push(HtmlAttribute {
            name: DEBUG_ATTRIBUTE.to_string(),
            value: Some(vec![value]),
            span,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{body_text, parse, run_file_set_pass};

    #[test]
    fn test_debug_attribute() {
        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}\n{template .t}\n  <div>x</div><p></p>\n{/template}\n\
             {template .s kind=\"text\"}<b>{/template}",
        )]);
        assert!(run_file_set_pass(&AddDebugAttributes, &mut set).is_empty());

        let file = &set.files[0];
        let mut templates = file.templates();
        let (_, html) = templates.next().unwrap();
        let root = html
            .body
            .iter()
            .find_map(|id| match &file.node(*id).kind {
                NodeKind::HtmlOpenTag(tag) => Some(tag),
                _ => None,
            })
            .unwrap();
        assert_eq!(root.name, "div");
        let attribute = root.attributes.last().unwrap();
        assert_eq!(attribute.name, DEBUG_ATTRIBUTE);
        assert_eq!(body_text(file, attribute.value.as_ref().unwrap()), "a.t test.st:3");

        let tagged = file
            .reachable_nodes()
            .into_iter()
            .filter(|id| match &file.node(*id).kind {
                NodeKind::HtmlOpenTag(tag) => tag.attributes.iter().any(|a| a.name == DEBUG_ATTRIBUTE),
                _ => false,
            })
            .count();
        assert_eq!(tagged, 1);
    }
}
