//! Parsing a file set and running the pass pipeline over it.

use eyre::Result;
use stencil_ast::{FileNode, FileSetNode};
use stencil_core::{LineIndex, SourceUnit};
use stencil_parser::ParseError;

use crate::{
    cache::AstCache,
    diagnostics::{Diagnostic, Diagnostics},
    passes::PassManager,
    registry::{Dependency, TemplateRegistry},
};

const PHASE: &str = "parse";

/// The tree of one compilation and, when every file parsed, its registry.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub file_set: FileSetNode,
    pub registry: Option<TemplateRegistry>,
}

impl ParseResult {
    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }
}

/// Parses sources, builds the registry and drives one [`PassManager`].
///
/// Doc strings, when stripped, are removed from the finished tree only; the
/// registry always keeps them.
///
/// Syntax errors are recorded and parsing carries on with the next file, so
/// one call reports every broken file. If any file failed, no pass runs.
pub struct FileSetParser<'a> {
    sources: &'a [SourceUnit],
    dependencies: &'a [Dependency],
    pass_manager: PassManager,
    cache: Option<&'a AstCache>,
    strip_doc_strings: bool,
}

impl<'a> FileSetParser<'a> {
    pub fn new(
        sources: &'a [SourceUnit],
        dependencies: &'a [Dependency],
        pass_manager: PassManager,
    ) -> Self {
        Self {
            sources,
            dependencies,
            pass_manager,
            cache: None,
            strip_doc_strings: false,
        }
    }

    pub fn cache(mut self, cache: Option<&'a AstCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn strip_doc_strings(mut self, strip: bool) -> Self {
        self.strip_doc_strings = strip;
        self
    }

    pub fn parse(self, diagnostics: &mut Diagnostics) -> Result<ParseResult> {
        let mut files = Vec::with_capacity(self.sources.len());
        let mut failed = 0usize;
        for unit in self.sources {
            match self.parse_file(unit) {
                Ok(file) => files.push(file),
                Err(err) => {
                    failed += 1;
                    diagnostics.report(syntax_error(unit, &err));
                }
            }
        }
        if failed > 0 {
            tracing::debug!(failed, total = self.sources.len(), "skipping passes after syntax errors");
            return Ok(ParseResult {
                file_set: FileSetNode::new(files),
                registry: None,
            });
        }

        for file in &mut files {
            self.pass_manager.run_file_passes(file, diagnostics)?;
        }

        let mut file_set = FileSetNode::new(files);
        let registry = TemplateRegistry::build(&file_set, self.dependencies, diagnostics);
        tracing::debug!(
            templates = registry.len(),
            dependencies = self.dependencies.len(),
            "built template registry"
        );
        self.pass_manager
            .run_file_set_passes(&mut file_set, &registry, diagnostics)?;
        if self.strip_doc_strings {
            for file in &mut file_set.files {
                file.strip_doc_strings();
            }
        }

        Ok(ParseResult {
            file_set,
            registry: Some(registry),
        })
    }

    fn parse_file(&self, unit: &SourceUnit) -> Result<FileNode, Box<ParseError>> {
        match self.cache {
            Some(cache) => cache.get_or_parse(unit),
            None => stencil_parser::parse(unit),
        }
    }
}

fn syntax_error(unit: &SourceUnit, err: &ParseError) -> Diagnostic {
    let span = err.span();
    let location = LineIndex::new(unit.content()).location(
        unit.path(),
        span.offset(),
        span.offset() + span.len(),
    );
    Diagnostic::error(PHASE, err.to_string()).at(location)
}

#[cfg(test)]
mod tests {
    use stencil_ast::{CompilationUnit, TemplateKind, TemplateMetadata};
    use stencil_core::FileKind;

    use super::*;
    use crate::{config::PassManagerConfig, registry::DependencyKind};

    fn manager() -> PassManager {
        PassManager::new(PassManagerConfig::builder().build())
    }

    #[test]
    fn test_every_syntax_error_is_reported() {
        let sources = vec![
            SourceUnit::new("a.st", "{namespace a}{template .t}{if true}x{/template}"),
            SourceUnit::new("b.st", "{namespace b}{template .ok}fine{/template}"),
            SourceUnit::new("c.st", "{namespace c}{template .u}{$x +}{/template}"),
        ];
        let mut diagnostics = Diagnostics::new();
        let result = FileSetParser::new(&sources, &[], manager())
            .parse(&mut diagnostics)
            .unwrap();

        assert!(!result.has_registry());
        assert_eq!(result.file_set.files.len(), 1);
        let paths: Vec<String> = diagnostics
            .errors()
            .map(|d| d.location.as_ref().unwrap().path.to_string())
            .collect();
        assert_eq!(paths, vec!["a.st", "c.st"]);
        assert!(diagnostics.iter().all(|d| d.phase == PHASE));
    }

    #[test]
    fn test_dependencies_are_registered_without_parsing() {
        let sources = vec![SourceUnit::new(
            "a.st",
            "{namespace app}{template .page}{call lib.button /}{/template}",
        )];
        let button = TemplateMetadata::builder("lib.button", TemplateKind::Basic)
            .build()
            .unwrap();
        let dependencies = vec![Dependency::new(
            DependencyKind::Direct,
            "lib.json",
            CompilationUnit::new(vec![button]),
        )];

        let mut diagnostics = Diagnostics::new();
        let result = FileSetParser::new(&sources, &dependencies, manager())
            .parse(&mut diagnostics)
            .unwrap();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let registry = result.registry.unwrap();
        let button = registry.get("lib.button").unwrap();
        assert_eq!(button.file_kind(), FileKind::Dependency);
        assert_eq!(button.source_location().to_string(), "lib.json");
        assert_eq!(result.file_set.files.len(), 1);
    }

    #[test]
    fn test_stripped_doc_strings_stay_in_the_registry() {
        let sources = vec![SourceUnit::new(
            "a.st",
            "{namespace a}{template .t}{@param name: string} /** The name. */{$name}{/template}",
        )];
        let mut diagnostics = Diagnostics::new();
        let result = FileSetParser::new(&sources, &[], manager())
            .strip_doc_strings(true)
            .parse(&mut diagnostics)
            .unwrap();
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);

        let registry = result.registry.unwrap();
        let param = registry.get("a.t").unwrap().parameter("name").unwrap();
        assert_eq!(param.description.as_deref(), Some("The name."));

        let (_, template) = result.file_set.files[0].templates().next().unwrap();
        assert_eq!(template.params[0].doc, None);
    }

    #[test]
    fn test_cache_is_consulted() {
        let cache = AstCache::new();
        let sources = vec![SourceUnit::new("a.st", "{namespace a}{template .t}hi{/template}")];
        for _ in 0..2 {
            let mut diagnostics = Diagnostics::new();
            FileSetParser::new(&sources, &[], manager())
                .cache(Some(&cache))
                .parse(&mut diagnostics)
                .unwrap();
            assert!(diagnostics.is_empty());
        }
        assert_eq!(cache.len(), 1);
    }
}
