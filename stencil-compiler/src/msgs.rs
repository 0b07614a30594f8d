//! Translatable messages collected from `{msg}` blocks.

use indexmap::IndexMap;
use serde::Serialize;
use stencil_ast::{ExprKind, FileNode, FileSetNode, MsgNode, NodeId, NodeKind};
use stencil_core::{Fingerprint, SourceLocation};

use crate::diagnostics::Diagnostics;

const PHASE: &str = "extract-msgs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MsgPart {
    Text(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Stable across builds: derived from the meaning and the parts only.
    pub id: u64,
    pub desc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    pub parts: Vec<MsgPart>,
    pub location: SourceLocation,
}

impl Message {
    /// The message with placeholders written as `{NAME}`.
    pub fn pattern(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                MsgPart::Text(text) => text.clone(),
                MsgPart::Placeholder(name) => format!("{{{}}}", name),
            })
            .collect()
    }
}

/// Every distinct message of a file set, in first-seen order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MsgBundle {
    messages: IndexMap<u64, Message>,
}

impl MsgBundle {
    /// Collect the messages of `file_set`. Commands that cannot appear in a
    /// message are reported and the message is skipped.
    pub fn extract(file_set: &FileSetNode, diagnostics: &mut Diagnostics) -> Self {
        let mut bundle = Self::default();
        for file in &file_set.files {
            for id in file.reachable_nodes() {
                if let NodeKind::Msg(msg) = &file.node(id).kind
                    && let Some(message) = build_message(file, id, msg, diagnostics)
                {
                    bundle.messages.entry(message.id).or_insert(message);
                }
            }
        }
        tracing::debug!(messages = bundle.len(), "extracted messages");
        bundle
    }

    pub fn get(&self, id: u64) -> Option<&Message> {
        self.messages.get(&id)
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn build_message(
    file: &FileNode,
    id: NodeId,
    msg: &MsgNode,
    diagnostics: &mut Diagnostics,
) -> Option<Message> {
    let mut parts: Vec<MsgPart> = Vec::new();
    let mut valid = true;
    for &child in &msg.body {
        let node = file.node(child);
        let part = match &node.kind {
            NodeKind::RawText(text) => MsgPart::Text(text.clone()),
            NodeKind::SpecialChar(special) => MsgPart::Text(special.text().to_string()),
            NodeKind::Print(print) => MsgPart::Placeholder(expr_placeholder(file, print.expr)),
            NodeKind::Call(call) => {
                let last = call.callee.rsplit('.').next().unwrap_or(call.callee.as_str());
                MsgPart::Placeholder(upper_snake(last))
            }
            NodeKind::HtmlOpenTag(tag) => {
                MsgPart::Placeholder(format!("START_{}", upper_snake(&tag.name)))
            }
            NodeKind::HtmlCloseTag { name } => {
                MsgPart::Placeholder(format!("END_{}", upper_snake(name)))
            }
            other => {
                diagnostics.error(
                    PHASE,
                    format!("{} is not allowed inside {{msg}}", command_name(other)),
                    file.location(node.span),
                );
                valid = false;
                continue;
            }
        };
        match (parts.last_mut(), part) {
            (Some(MsgPart::Text(existing)), MsgPart::Text(text)) => existing.push_str(&text),
            (_, part) => parts.push(part),
        }
    }
    if !valid {
        return None;
    }

    Some(Message {
        id: message_id(msg.meaning.as_deref(), &parts),
        desc: msg.desc.clone(),
        meaning: msg.meaning.clone(),
        parts,
        location: file.location(file.node(id).span),
    })
}

fn expr_placeholder(file: &FileNode, expr: stencil_ast::ExprId) -> String {
    match &file.expr(expr).kind {
        ExprKind::Var(name) => upper_snake(name),
        ExprKind::Field { field, .. } => upper_snake(field),
        ExprKind::Global(name) => upper_snake(name.rsplit('.').next().unwrap_or(name.as_str())),
        _ => "XXX".to_string(),
    }
}

fn command_name(kind: &NodeKind) -> &'static str {
    match kind {
        NodeKind::If(_) => "{if}",
        NodeKind::For(_) => "{for}",
        NodeKind::Let(_) => "{let}",
        NodeKind::Msg(_) => "{msg}",
        NodeKind::VeLog(_) => "{velog}",
        _ => "this command",
    }
}

/// `userName` and `user_name` both become `USER_NAME`.
fn upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '-' || c == '_' {
            out.push('_');
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_uppercase());
    }
    out
}

fn message_id(meaning: Option<&str>, parts: &[MsgPart]) -> u64 {
    let mut key = String::new();
    if let Some(meaning) = meaning {
        key.push_str(meaning);
    }
    key.push('\u{0}');
    for part in parts {
        match part {
            MsgPart::Text(text) => key.push_str(text),
            MsgPart::Placeholder(name) => {
                key.push('{');
                key.push_str(name);
                key.push('}');
            }
        }
    }
    let digest = Fingerprint::of(&key);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use stencil_core::SourceUnit;

    use super::*;

    fn extract(src: &str) -> (MsgBundle, Diagnostics) {
        let file = stencil_parser::parse(&SourceUnit::new("m.st", src)).unwrap();
        let mut diagnostics = Diagnostics::new();
        let bundle = MsgBundle::extract(&FileSetNode::new(vec![file]), &mut diagnostics);
        (bundle, diagnostics)
    }

    #[test]
    fn test_placeholders() {
        let (bundle, diagnostics) = extract(
            "{namespace a}{template .t}{@param userName: string}{@param user: ?}\
             {msg desc=\"greeting\"}Hi {$userName}, <b>{$user.first_name}</b>{round(1.5)}!{/msg}\
             {/template}",
        );
        assert!(diagnostics.is_empty());
        let message = bundle.messages().next().unwrap();
        assert_eq!(message.desc, "greeting");
        assert_eq!(
            message.pattern(),
            "Hi {USER_NAME}, {START_B}{FIRST_NAME}{END_B}{XXX}!"
        );
        assert_eq!(message.location.to_string(), "m.st:1:68");
    }

    #[test]
    fn test_duplicates_collapse_and_meaning_counts() {
        let (bundle, diagnostics) = extract(
            "{namespace a}{template .t}\
             {msg desc=\"one\"}Save{/msg}{msg desc=\"two\"}Save{/msg}\
             {msg desc=\"verb\" meaning=\"verb\"}Save{/msg}\
             {/template}",
        );
        assert!(diagnostics.is_empty());
        assert_eq!(bundle.len(), 2);
        let descs: Vec<&str> = bundle.messages().map(|m| m.desc.as_str()).collect();
        assert_eq!(descs, vec!["one", "verb"]);

        let first = bundle.messages().next().unwrap();
        assert_eq!(bundle.get(first.id), Some(first));
        assert_eq!(first.id, message_id(None, &[MsgPart::Text("Save".into())]));
    }

    #[test]
    fn test_control_flow_rejected() {
        let (bundle, diagnostics) = extract(
            "{namespace a}{template .t}{@param n: int}\
             {msg desc=\"d\"}a{if $n}b{/if}{/msg}{/template}",
        );
        assert!(bundle.is_empty());
        let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["{if} is not allowed inside {msg}"]);
    }

    #[test]
    fn test_serialized_parts() {
        let part = serde_json::to_value(MsgPart::Placeholder("NAME".into())).unwrap();
        assert_eq!(part, serde_json::json!({ "kind": "placeholder", "value": "NAME" }));
    }

    #[test]
    fn test_upper_snake() {
        assert_eq!(upper_snake("userName"), "USER_NAME");
        assert_eq!(upper_snake("first_name"), "FIRST_NAME");
        assert_eq!(upper_snake("URL"), "URL");
        assert_eq!(upper_snake("item2Count"), "ITEM2_COUNT");
    }
}
