//! Template-level enumerations shared by the AST and template metadata.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The kind of a template declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    /// `{template}`: called by name.
    Basic,
    /// `{deltemplate}`: selected at render time by delegate name and variant.
    Delegate,
    /// `{element}`: a stateful template.
    Element,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateKind::Basic => write!(f, "template"),
            TemplateKind::Delegate => write!(f, "deltemplate"),
            TemplateKind::Element => write!(f, "element"),
        }
    }
}

/// The kind of content a template or block produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Html,
    Attributes,
    Text,
    Uri,
    Css,
    Js,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Attributes => "attributes",
            ContentKind::Text => "text",
            ContentKind::Uri => "uri",
            ContentKind::Css => "css",
            ContentKind::Js => "js",
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(ContentKind::Html),
            "attributes" => Ok(ContentKind::Attributes),
            "text" => Ok(ContentKind::Text),
            "uri" => Ok(ContentKind::Uri),
            "css" => Ok(ContentKind::Css),
            "js" => Ok(ContentKind::Js),
            other => Err(format!(
                "unknown content kind '{}' (expected html, attributes, text, uri, css or js)",
                other
            )),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may call a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    /// Callable only from templates in the same file.
    Private,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(format!(
                "unknown visibility '{}' (expected public or private)",
                other
            )),
        }
    }
}

/// How a parameter is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// `{@param}` / `{@inject}`
    Param,
    /// `{@attribute}` on element templates.
    Attribute,
}
