use eyre::Result;
use stencil_ast::{
    CallParamValue, ContentKind, FileNode, FileSetNode, LetValue, NodeId, NodeKind, PrintDirective,
};

use super::{FileSetPass, PassContext, PassId};
use crate::registry::TemplateRegistry;

/// Directives that already escape their print, or opt it out of escaping.
const ESCAPING_DIRECTIVES: &[&str] = &[
    "escapeHtml",
    "escapeHtmlAttribute",
    "filterNormalizeUri",
    "filterCssValue",
    "escapeJsValue",
    "noAutoescape",
    "text",
];

const URI_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "poster", "cite"];

/// Append the escaping directives each print needs in its output context.
pub struct InsertEscapingDirectives;

impl FileSetPass for InsertEscapingDirectives {
    fn id(&self) -> PassId {
        PassId::InsertEscapingDirectives
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        _registry: &TemplateRegistry,
        _ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        for file in &mut file_set.files {
            let mut inserted = 0usize;
            for id in file.templates.clone() {
                let Some(template) = file.template(id) else {
                    continue;
                };
                let context = Context::from(template.content_kind);
                let body = template.body.clone();
                escape_list(file, body, context, &mut inserted);
            }
            tracing::trace!(file = %file.path, inserted, "inserted escaping directives");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Html,
    Attribute { uri: bool },
    Uri,
    Css,
    Js,
    Text,
}

impl From<ContentKind> for Context {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Html => Context::Html,
            ContentKind::Attributes => Context::Attribute { uri: false },
            ContentKind::Text => Context::Text,
            ContentKind::Uri => Context::Uri,
            ContentKind::Css => Context::Css,
            ContentKind::Js => Context::Js,
        }
    }
}

impl Context {
    fn directives(self) -> &'static [&'static str] {
        match self {
            Context::Html => &["escapeHtml"],
            Context::Attribute { uri: false } => &["escapeHtmlAttribute"],
            Context::Attribute { uri: true } => &["filterNormalizeUri", "escapeHtmlAttribute"],
            Context::Uri => &["filterNormalizeUri"],
            Context::Css => &["filterCssValue"],
            Context::Js => &["escapeJsValue"],
            Context::Text => &[],
        }
    }
}

fn escape_list(file: &mut FileNode, list: Vec<NodeId>, context: Context, inserted: &mut usize) {
    for id in list {
        let span = file.node(id).span;
        let mut nested: Vec<(Vec<NodeId>, Context)> = Vec::new();
        match &mut file.node_mut(id).kind {
            NodeKind::Print(print) => {
                let escaped = print
                    .directives
                    .iter()
                    .any(|d| ESCAPING_DIRECTIVES.contains(&d.name.as_str()));
                if !escaped {
                    for name in context.directives() {
                        print.directives.push(PrintDirective {
                            name: name.to_string(),
                            args: Vec::new(),
                            span,
                        });
                        *inserted += 1;
                    }
                }
            }
            NodeKind::HtmlOpenTag(tag) => {
                for attribute in &tag.attributes {
                    if let Some(value) = &attribute.value {
                        let uri = URI_ATTRIBUTES
                            .iter()
                            .any(|name| attribute.name.eq_ignore_ascii_case(name));
                        nested.push((value.clone(), Context::Attribute { uri }));
                    }
                }
            }
            NodeKind::Let(node) => {
                if let LetValue::Content { kind, body } = &node.value {
                    nested.push((body.clone(), Context::from(*kind)));
                }
            }
            NodeKind::Call(call) => {
                for param in &call.params {
                    if let CallParamValue::Content { kind, body } = &param.value {
                        nested.push((body.clone(), Context::from(*kind)));
                    }
                }
            }
            kind => {
                for list in kind.child_lists() {
                    nested.push((list.clone(), context));
                }
            }
        }
        for (list, context) in nested {
            escape_list(file, list, context, inserted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::testing::{body_text, parse, run_file_set_pass};

    #[test]
    fn test_contextual_directives() {
        let mut set = FileSetNode::new(vec![parse(
            "{namespace a}{template .t}{@param x: string}{@param u: string}\
             {$x}<a href=\"{$u}\" title=\"{$x}\">{$x |noAutoescape}</a>\
             {let $t kind=\"text\"}{$x}{/let}{let $c kind=\"css\"}{$x}{/let}\
             {$x |escapeHtml}{if $x}{$x |truncate:3}{/if}\
             {/template}\
             {template .j kind=\"js\"}{@param x: string}{$x}{/template}",
        )]);
        let diagnostics = run_file_set_pass(&InsertEscapingDirectives, &mut set);
        assert!(diagnostics.is_empty());

        let file = &set.files[0];
        let mut templates = file.templates();
        let (_, page) = templates.next().unwrap();
        assert_eq!(
            body_text(file, &page.body),
            "print[escapeHtml]|<a>|print[noAutoescape]|</a>|let($t)|let($c)|print[escapeHtml]|if"
        );

        let NodeKind::HtmlOpenTag(anchor) = &file.node(page.body[1]).kind else {
            panic!("expected an open tag");
        };
        let href = anchor.attributes[0].value.as_ref().unwrap();
        let title = anchor.attributes[1].value.as_ref().unwrap();
        assert_eq!(body_text(file, href), "print[filterNormalizeUri,escapeHtmlAttribute]");
        assert_eq!(body_text(file, title), "print[escapeHtmlAttribute]");

        let NodeKind::Let(text) = &file.node(page.body[4]).kind else {
            panic!("expected a let");
        };
        let LetValue::Content { body, .. } = &text.value else {
            panic!("expected a content let");
        };
        assert_eq!(body_text(file, body), "print");

        let NodeKind::Let(css) = &file.node(page.body[5]).kind else {
            panic!("expected a let");
        };
        let LetValue::Content { body, .. } = &css.value else {
            panic!("expected a content let");
        };
        assert_eq!(body_text(file, body), "print[filterCssValue]");

        let NodeKind::If(node) = &file.node(page.body[7]).kind else {
            panic!("expected an if");
        };
        assert_eq!(body_text(file, &node.branches[0].body), "print[truncate,escapeHtml]");

        let (_, js) = templates.next().unwrap();
        assert_eq!(body_text(file, &js.body), "print[escapeJsValue]");
    }
}
