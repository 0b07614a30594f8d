//! Dependency-minimal template metadata.
//!
//! A [`TemplateMetadata`] is everything another file needs to know to call a
//! template: its name, kind, signature and the calls it forwards all of its
//! data to. It is derived from a parsed template or decoded from a
//! [`CompilationUnit`] produced by an earlier compile.

use std::collections::BTreeSet;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use stencil_core::{FileKind, SourceLocation, SourcePath};
use thiserror::Error;

use crate::{
    ContentKind, FileNode, NodeId, NodeKind, ParamKind, TemplateKind, Type, Visibility,
};

/// Violations of the metadata construction invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum MetadataError {
    #[error("template metadata requires a name")]
    #[diagnostic(code(stencil::metadata::missing_name))]
    MissingName,

    #[error("delegate template '{template}' has no delegate name")]
    #[diagnostic(code(stencil::metadata::missing_delegate_name))]
    MissingDelegateName { template: String },

    #[error("delegate template '{template}' has no variant")]
    #[diagnostic(
        code(stencil::metadata::missing_variant),
        help("use an empty variant for the default implementation")
    )]
    MissingVariant { template: String },

    #[error("{kind} '{template}' must not carry delegate information")]
    #[diagnostic(code(stencil::metadata::unexpected_delegate))]
    UnexpectedDelegate { template: String, kind: TemplateKind },

    #[error("template '{template}' is missing from its file")]
    #[diagnostic(code(stencil::metadata::not_a_template))]
    NotATemplate { template: String },
}

/// A declared template parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    #[serde(rename = "type")]
    pub ty: Type,
    pub required: bool,
    #[serde(default)]
    pub implicit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A call that passes all of the caller's data to its callee.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataAllCallSituation {
    pub template_name: String,
    pub delegate_call: bool,
    /// Params given explicitly at the call site, overriding the forwarded data.
    #[serde(default)]
    pub explicitly_passed: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegateInfo {
    pub name: String,
    pub variant: String,
}

/// Synopsis of one template.
///
/// Only constructible through [`TemplateMetadataBuilder::build`], which
/// enforces that delegate templates carry a delegate name and variant and
/// that other templates carry neither. Deserialization goes through the same
/// check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "TemplateMetadataBuilder",
    into = "TemplateMetadataBuilder"
)]
pub struct TemplateMetadata {
    template_name: String,
    source_location: SourceLocation,
    file_kind: FileKind,
    kind: TemplateKind,
    content_kind: ContentKind,
    strict_html: bool,
    visibility: Visibility,
    delegate_package: Option<String>,
    delegate: Option<DelegateInfo>,
    parameters: Vec<Parameter>,
    data_all_calls: Vec<DataAllCallSituation>,
}

impl TemplateMetadata {
    pub fn builder(template_name: impl Into<String>, kind: TemplateKind) -> TemplateMetadataBuilder {
        TemplateMetadataBuilder::new(template_name, kind)
    }

    /// Derive metadata from a parsed template, walking its call sites for
    /// data-forwarding calls.
    pub fn from_template(
        file: &FileNode,
        id: NodeId,
        file_kind: FileKind,
    ) -> Result<Self, MetadataError> {
        let template = file.template(id).ok_or_else(|| MetadataError::NotATemplate {
            template: id.to_string(),
        })?;
        let package = file.delegate_package.as_deref();

        let parameters = template
            .params
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                kind: p.kind,
                ty: p.ty.clone().unwrap_or(Type::Unknown),
                required: p.required,
                implicit: p.implicit,
                description: p.doc.clone(),
            })
            .collect();

        let mut data_all_calls: Vec<DataAllCallSituation> = Vec::new();
        for node in file.descendants(id) {
            let NodeKind::Call(call) = &file.node(node).kind else {
                continue;
            };
            if !call.data_all {
                continue;
            }
            let situation = DataAllCallSituation {
                template_name: call.callee.clone(),
                delegate_call: call.delegate,
                explicitly_passed: call.params.iter().map(|p| p.name.clone()).collect(),
            };
            if !data_all_calls.contains(&situation) {
                data_all_calls.push(situation);
            }
        }

        let mut builder = TemplateMetadataBuilder::new(template.template_name(package), template.kind)
            .source_location(file.location(file.node(id).span))
            .file_kind(file_kind)
            .content_kind(template.content_kind)
            .strict_html(template.strict_html)
            .visibility(template.visibility)
            .parameters(parameters)
            .data_all_calls(data_all_calls);
        if let Some(package) = package {
            builder = builder.delegate_package(package);
        }
        if template.kind == TemplateKind::Delegate {
            builder = builder.delegate(
                template.name.clone(),
                template.variant.clone().unwrap_or_default(),
            );
        }
        builder.build()
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn source_location(&self) -> &SourceLocation {
        &self.source_location
    }

    pub fn file_kind(&self) -> FileKind {
        self.file_kind
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    pub fn strict_html(&self) -> bool {
        self.strict_html
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn delegate_package(&self) -> Option<&str> {
        self.delegate_package.as_deref()
    }

    pub fn delegate(&self) -> Option<&DelegateInfo> {
        self.delegate.as_ref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn data_all_calls(&self) -> &[DataAllCallSituation] {
        &self.data_all_calls
    }

    /// Params a caller must pass: required and not injected.
    pub fn required_params(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.required && !p.implicit)
    }

    pub fn with_file_kind(mut self, file_kind: FileKind) -> Self {
        self.file_kind = file_kind;
        self
    }

    pub fn with_source_location(mut self, location: SourceLocation) -> Self {
        self.source_location = location;
        self
    }
}

/// Builder and wire form of [`TemplateMetadata`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMetadataBuilder {
    template_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_location: Option<SourceLocation>,
    #[serde(default)]
    file_kind: FileKind,
    kind: TemplateKind,
    #[serde(default)]
    content_kind: ContentKind,
    #[serde(default = "default_strict_html")]
    strict_html: bool,
    #[serde(default)]
    visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delegate_package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delegate_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delegate_variant: Option<String>,
    #[serde(default)]
    parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    data_all_calls: Vec<DataAllCallSituation>,
}

fn default_strict_html() -> bool {
    true
}

impl TemplateMetadataBuilder {
    pub fn new(template_name: impl Into<String>, kind: TemplateKind) -> Self {
        Self {
            template_name: template_name.into(),
            source_location: None,
            file_kind: FileKind::Source,
            kind,
            content_kind: ContentKind::Html,
            strict_html: true,
            visibility: Visibility::Public,
            delegate_package: None,
            delegate_name: None,
            delegate_variant: None,
            parameters: Vec::new(),
            data_all_calls: Vec::new(),
        }
    }

    pub fn source_location(mut self, location: SourceLocation) -> Self {
        self.source_location = Some(location);
        self
    }

    pub fn file_kind(mut self, file_kind: FileKind) -> Self {
        self.file_kind = file_kind;
        self
    }

    pub fn content_kind(mut self, content_kind: ContentKind) -> Self {
        self.content_kind = content_kind;
        self
    }

    pub fn strict_html(mut self, strict_html: bool) -> Self {
        self.strict_html = strict_html;
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn delegate_package(mut self, package: impl Into<String>) -> Self {
        self.delegate_package = Some(package.into());
        self
    }

    pub fn delegate(self, name: impl Into<String>, variant: impl Into<String>) -> Self {
        self.delegate_name(name).delegate_variant(variant)
    }

    pub fn delegate_name(mut self, name: impl Into<String>) -> Self {
        self.delegate_name = Some(name.into());
        self
    }

    pub fn delegate_variant(mut self, variant: impl Into<String>) -> Self {
        self.delegate_variant = Some(variant.into());
        self
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn data_all_call(mut self, situation: DataAllCallSituation) -> Self {
        self.data_all_calls.push(situation);
        self
    }

    pub fn data_all_calls(mut self, situations: Vec<DataAllCallSituation>) -> Self {
        self.data_all_calls = situations;
        self
    }

    pub fn build(self) -> Result<TemplateMetadata, MetadataError> {
        if self.template_name.is_empty() {
            return Err(MetadataError::MissingName);
        }

        let delegate = match (self.kind, self.delegate_name, self.delegate_variant) {
            (TemplateKind::Delegate, Some(name), Some(variant)) => {
                Some(DelegateInfo { name, variant })
            }
            (TemplateKind::Delegate, None, _) => {
                return Err(MetadataError::MissingDelegateName {
                    template: self.template_name,
                });
            }
            (TemplateKind::Delegate, Some(_), None) => {
                return Err(MetadataError::MissingVariant {
                    template: self.template_name,
                });
            }
            (_, None, None) => None,
            (kind, _, _) => {
                return Err(MetadataError::UnexpectedDelegate {
                    template: self.template_name,
                    kind,
                });
            }
        };

        let source_location = self
            .source_location
            .unwrap_or_else(|| SourceLocation::file_only(SourcePath::new("")));

        Ok(TemplateMetadata {
            template_name: self.template_name,
            source_location,
            file_kind: self.file_kind,
            kind: self.kind,
            content_kind: self.content_kind,
            strict_html: self.strict_html,
            visibility: self.visibility,
            delegate_package: self.delegate_package,
            delegate,
            parameters: self.parameters,
            data_all_calls: self.data_all_calls,
        })
    }
}

impl TryFrom<TemplateMetadataBuilder> for TemplateMetadata {
    type Error = MetadataError;

    fn try_from(builder: TemplateMetadataBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl From<TemplateMetadata> for TemplateMetadataBuilder {
    fn from(metadata: TemplateMetadata) -> Self {
        let (delegate_name, delegate_variant) = match metadata.delegate {
            Some(DelegateInfo { name, variant }) => (Some(name), Some(variant)),
            None => (None, None),
        };
        Self {
            template_name: metadata.template_name,
            source_location: Some(metadata.source_location),
            file_kind: metadata.file_kind,
            kind: metadata.kind,
            content_kind: metadata.content_kind,
            strict_html: metadata.strict_html,
            visibility: metadata.visibility,
            delegate_package: metadata.delegate_package,
            delegate_name,
            delegate_variant,
            parameters: metadata.parameters,
            data_all_calls: metadata.data_all_calls,
        }
    }
}

/// The serialized summary of a precompiled file's templates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompilationUnit {
    #[serde(default)]
    pub templates: Vec<TemplateMetadata>,
}

impl CompilationUnit {
    pub fn new(templates: Vec<TemplateMetadata>) -> Self {
        Self { templates }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
