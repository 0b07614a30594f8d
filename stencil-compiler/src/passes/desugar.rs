use eyre::Result;
use stencil_ast::{
    FileNode, FileSetNode, HtmlTag, LetNode, LetValue, NodeId, NodeKind, Span, TemplateKind,
};

use super::{FilePass, FileSetPass, PassContext, PassId, merge_raw_text};
use crate::registry::TemplateRegistry;

/// `{sp}`, `{nil}`, `{lb}` and friends become raw text.
pub struct DesugarSyntax;

impl FilePass for DesugarSyntax {
    fn id(&self) -> PassId {
        PassId::DesugarSyntax
    }

    fn run(&self, file: &mut FileNode, _ctx: &mut PassContext<'_>) -> Result<()> {
        file.rewrite_child_lists(|file, list| {
            list.into_iter()
                .filter(|id| {
                    let node = file.node_mut(*id);
                    let NodeKind::SpecialChar(special) = node.kind else {
                        return true;
                    };
                    let text = special.text();
                    node.kind = NodeKind::RawText(text.to_string());
                    !text.is_empty()
                })
                .collect()
        });
        Ok(())
    }
}

/// HTML tags become raw text with their attribute values spliced in, and
/// element state declarations become leading `{let}` nodes.
pub struct DesugarHtmlAndState;

impl FileSetPass for DesugarHtmlAndState {
    fn id(&self) -> PassId {
        PassId::DesugarHtmlAndState
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        _ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        for file in &mut file_set.files {
            desugar_state(file);
            file.rewrite_child_lists(|file, list| {
                let mut out = Vec::with_capacity(list.len());
                for id in list {
                    let span = file.node(id).span;
                    match file.node(id).kind.clone() {
                        NodeKind::HtmlOpenTag(tag) => lower_open_tag(file, tag, span, &mut out),
                        NodeKind::HtmlCloseTag { name } => {
                            out.push(file.alloc(NodeKind::RawText(format!("</{}>", name)), span));
                        }
                        _ => out.push(id),
                    }
                }
                merge_raw_text(file, out)
            });
        }
        Ok(())
    }
}

fn lower_open_tag(file: &mut FileNode, tag: HtmlTag, span: Span, out: &mut Vec<NodeId>) {
    let mut text = format!("<{}", tag.name);
    for attribute in tag.attributes {
        text.push(' ');
        text.push_str(&attribute.name);
        if let Some(value) = attribute.value {
            text.push_str("=\"");
            out.push(file.alloc(NodeKind::RawText(std::mem::take(&mut text)), span));
            out.extend(value);
            text.push('"');
        }
    }
    text.push_str(if tag.self_closing { "/>" } else { ">" });
    out.push(file.alloc(NodeKind::RawText(text), span));
}

fn desugar_state(file: &mut FileNode) {
    for id in file.templates.clone() {
        let Some(template) = file.template_mut(id) else {
            continue;
        };
        if template.kind != TemplateKind::Element || template.state.is_empty() {
            continue;
        }
        let state = std::mem::take(&mut template.state);
        let mut lets: Vec<NodeId> = state
            .into_iter()
            .map(|decl| {
                file.alloc(
                    NodeKind::Let(LetNode {
                        var: decl.name,
                        value: LetValue::Expr(decl.default),
                    }),
                    decl.span,
                )
            })
            .collect();
        if let Some(template) = file.template_mut(id) {
            lets.append(&mut template.body);
            template.body = lets;
        }
    }
}
