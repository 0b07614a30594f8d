//! The lookup over every template visible to one compilation.
//!
//! Own templates are derived from the parsed file set; dependency templates
//! are decoded from [`CompilationUnit`]s and never parsed.

use eyre::{Result, WrapErr};
use indexmap::IndexMap;
use stencil_ast::{CompilationUnit, FileSetNode, TemplateMetadata};
use stencil_core::{FileKind, SourceLocation, SourcePath};

use crate::diagnostics::{Diagnostic, Diagnostics};

const PHASE: &str = "registry";

/// How a dependency file relates to the current compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Direct,
    /// Visible for type information only; its templates may not be called.
    Indirect,
}

impl DependencyKind {
    pub fn file_kind(self) -> FileKind {
        match self {
            DependencyKind::Direct => FileKind::Dependency,
            DependencyKind::Indirect => FileKind::IndirectDependency,
        }
    }
}

/// A precompiled dependency file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub path: SourcePath,
    pub unit: CompilationUnit,
}

impl Dependency {
    pub fn new(kind: DependencyKind, path: impl Into<SourcePath>, unit: CompilationUnit) -> Self {
        Self {
            kind,
            path: path.into(),
            unit,
        }
    }

    /// Decode a serialized compilation unit.
    pub fn from_json(kind: DependencyKind, path: impl Into<SourcePath>, json: &str) -> Result<Self> {
        let path = path.into();
        let unit = CompilationUnit::from_json(json)
            .wrap_err_with(|| format!("invalid compilation unit '{}'", path))?;
        Ok(Self::new(kind, path, unit))
    }
}

/// Template name → metadata, built once per compilation and read-only after.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: IndexMap<String, TemplateMetadata>,
    /// Delegate name → registry keys of its implementations.
    delegates: IndexMap<String, Vec<String>>,
}

impl TemplateRegistry {
    /// Register own templates from `file_set`, then dependency templates.
    ///
    /// A name defined twice is an error unless both definitions come from
    /// dependencies, in which case the first is kept.
    pub fn build(
        file_set: &FileSetNode,
        dependencies: &[Dependency],
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut registry = Self::default();
        for file in &file_set.files {
            for (id, _) in file.templates() {
                match TemplateMetadata::from_template(file, id, FileKind::Source) {
                    Ok(metadata) => registry.insert(metadata, diagnostics),
                    Err(err) => diagnostics.report(
                        Diagnostic::error(PHASE, err.to_string())
                            .at(file.location(file.node(id).span)),
                    ),
                }
            }
        }

        for dependency in dependencies {
            tracing::trace!(
                path = %dependency.path,
                kind = %dependency.kind.file_kind(),
                templates = dependency.unit.templates.len(),
                "registering dependency"
            );
            for template in &dependency.unit.templates {
                let mut metadata = template.clone().with_file_kind(dependency.kind.file_kind());
                if metadata.source_location().path.as_str().is_empty() {
                    metadata =
                        metadata.with_source_location(SourceLocation::file_only(dependency.path.clone()));
                }
                registry.insert(metadata, diagnostics);
            }
        }
        registry
    }

    fn insert(&mut self, metadata: TemplateMetadata, diagnostics: &mut Diagnostics) {
        let name = metadata.template_name().to_string();
        if let Some(existing) = self.templates.get(&name) {
            if existing.file_kind().is_dependency() && metadata.file_kind().is_dependency() {
                tracing::trace!(template = %name, "keeping the first dependency definition");
                return;
            }
            let what = match metadata.delegate() {
                Some(delegate) => format!(
                    "delegate '{}' with variant '{}'",
                    delegate.name, delegate.variant
                ),
                None => format!("template '{}'", name),
            };
            diagnostics.report(
                Diagnostic::error(
                    PHASE,
                    format!("{} is already defined at {}", what, existing.source_location()),
                )
                .at(metadata.source_location().clone()),
            );
            return;
        }
        if let Some(delegate) = metadata.delegate() {
            self.delegates
                .entry(delegate.name.clone())
                .or_default()
                .push(name.clone());
        }
        self.templates.insert(name, metadata);
    }

    /// Look up a basic or element template, or a delegate by its full
    /// `name#variant[@package]` key.
    pub fn get(&self, name: &str) -> Option<&TemplateMetadata> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Every implementation of the delegate `name`.
    pub fn delegates(&self, name: &str) -> impl Iterator<Item = &TemplateMetadata> {
        self.delegates
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|key| self.templates.get(key))
    }

    pub fn has_delegate(&self, name: &str) -> bool {
        self.delegates.contains_key(name)
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateMetadata> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The summary of this compilation's own templates, for use as a
    /// dependency of later compilations.
    pub fn to_compilation_unit(&self) -> CompilationUnit {
        CompilationUnit::new(
            self.templates
                .values()
                .filter(|t| !t.file_kind().is_dependency())
                .cloned()
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use stencil_ast::TemplateKind;

    use super::*;
    use crate::passes::testing::{messages, parse_as};

    fn unit(names: &[&str]) -> CompilationUnit {
        CompilationUnit::new(
            names
                .iter()
                .map(|name| {
                    TemplateMetadata::builder(*name, TemplateKind::Basic)
                        .build()
                        .expect("valid metadata")
                })
                .collect(),
        )
    }

    #[test]
    fn test_own_duplicates_are_errors() {
        let set = FileSetNode::new(vec![
            parse_as("a.st", "{namespace app}{template .page}x{/template}"),
            parse_as("b.st", "{namespace app}\n{template .page}y{/template}"),
        ]);
        let mut diagnostics = Diagnostics::new();
        let registry = TemplateRegistry::build(&set, &[], &mut diagnostics);
        assert_eq!(
            messages(&diagnostics),
            vec!["template 'app.page' is already defined at a.st:1:16"]
        );
        let location = diagnostics.iter().next().and_then(|d| d.location.clone());
        assert_eq!(location.map(|l| l.to_string()).as_deref(), Some("b.st:2:1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dependency_conflicts() {
        let set = FileSetNode::new(vec![parse_as(
            "a.st",
            "{namespace app}{template .page}x{/template}",
        )]);
        let dependencies = vec![
            Dependency::new(DependencyKind::Direct, "lib.json", unit(&["lib.button", "app.page"])),
            Dependency::new(DependencyKind::Indirect, "base.json", unit(&["lib.button", "base.icon"])),
        ];
        let mut diagnostics = Diagnostics::new();
        let registry = TemplateRegistry::build(&set, &dependencies, &mut diagnostics);

        assert_eq!(
            messages(&diagnostics),
            vec!["template 'app.page' is already defined at a.st:1:16"]
        );
        let button = registry.get("lib.button").expect("dependency template");
        assert_eq!(button.file_kind(), FileKind::Dependency);
        assert_eq!(button.source_location().to_string(), "lib.json");
        let icon = registry.get("base.icon").expect("indirect dependency template");
        assert_eq!(icon.file_kind(), FileKind::IndirectDependency);

        let exported: Vec<_> = registry
            .to_compilation_unit()
            .templates
            .iter()
            .map(|t| t.template_name().to_string())
            .collect();
        assert_eq!(exported, vec!["app.page"]);
    }

    #[test]
    fn test_delegate_triples() {
        let set = FileSetNode::new(vec![
            parse_as(
                "a.st",
                "{deltemplate my.widget variant=\"'compact'\"}a{/deltemplate}\
                 {deltemplate my.widget}b{/deltemplate}",
            ),
            parse_as(
                "b.st",
                "{delpackage beta}{deltemplate my.widget variant=\"'compact'\"}c{/deltemplate}",
            ),
            parse_as("c.st", "{deltemplate my.widget}d{/deltemplate}"),
        ]);
        let mut diagnostics = Diagnostics::new();
        let registry = TemplateRegistry::build(&set, &[], &mut diagnostics);

        assert_eq!(
            messages(&diagnostics),
            vec!["delegate 'my.widget' with variant '' is already defined at a.st:1:59"]
        );
        let keys: Vec<_> = registry
            .delegates("my.widget")
            .map(|t| t.template_name())
            .collect();
        assert_eq!(keys, vec!["my.widget#compact", "my.widget#", "my.widget#compact@beta"]);
    }

    #[test]
    fn test_invalid_compilation_unit() {
        let err = Dependency::from_json(DependencyKind::Direct, "lib.json", "{\"templates\": 3}")
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid compilation unit 'lib.json'");
    }
}
