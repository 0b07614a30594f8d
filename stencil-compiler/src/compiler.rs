//! The long-lived compiler and its entry points.
//!
//! A [`Compiler`] holds the sources and options of a build. Each entry point
//! runs one compilation through [`Compiler::entry_point`], which owns the
//! diagnostics of that call and turns them into the call's outcome.

use std::{collections::BTreeSet, fmt, io::Write, path::PathBuf, sync::Arc};

use eyre::{Result, eyre};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use stencil_ast::{FileSetNode, Literal, TypeRegistry};
use stencil_core::{SourcePath, SourceUnit};

use crate::{
    assembler::{FileSetParser, ParseResult},
    cache::AstCache,
    config::{
        AstRewrites, ConformanceConfig, CssRegistry, LoggingConfig, PassManagerConfig,
        PassManagerConfigBuilder,
    },
    diagnostics::{Diagnostic, Diagnostics, render},
    error::CompileError,
    msgs::MsgBundle,
    passes::{PassId, PassManager},
    plugins::{self, Mode, PluginResolver, UserPlugins},
    registry::{Dependency, TemplateRegistry},
};

/// Experimental feature that fails a compilation on any warning.
pub const THROW_ON_WARNINGS: &str = "testonly_throw_on_warnings";

/// Where the warnings of a successful compilation go.
#[derive(Clone, Default)]
pub enum WarningSink {
    /// One `tracing` warning event per compilation.
    #[default]
    Log,
    Writer(Arc<Mutex<dyn Write + Send>>),
}

impl fmt::Debug for WarningSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningSink::Log => f.write_str("Log"),
            WarningSink::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Backends a full compile can be tailored for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    JsSrc,
    IncrementalDom,
    PySrc,
    JavaInfo,
}

/// A validated tree and registry, ready for a backend.
#[derive(Debug, Clone)]
pub struct CompiledTemplates {
    pub file_set: FileSetNode,
    pub registry: TemplateRegistry,
}

#[derive(Debug, Clone)]
pub struct HeaderResult {
    pub file_set: FileSetNode,
    pub registry: TemplateRegistry,
    pub css_registry: Option<Arc<CssRegistry>>,
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// `None` when a source failed to parse.
    pub registry: Option<TemplateRegistry>,
    pub file_set: FileSetNode,
    pub warnings: Vec<Diagnostic>,
}

/// Accumulates the options of a [`Compiler`].
#[derive(Debug, Default)]
pub struct CompilerBuilder {
    sources: Vec<SourceUnit>,
    dependencies: Vec<Dependency>,
    plugins: UserPlugins,
    plugin_runtime_roots: Vec<PathBuf>,
    conformance: Arc<ConformanceConfig>,
    logging: Arc<LoggingConfig>,
    css_registry: Option<Arc<CssRegistry>>,
    type_registry: Option<TypeRegistry>,
    compile_time_globals: IndexMap<String, Literal>,
    cache: Option<Arc<AstCache>>,
    allow_external_calls: Option<bool>,
    disable_optimizer: bool,
    skip_plugin_validation: bool,
    add_debug_attributes: bool,
    experimental_features: BTreeSet<String>,
    warning_sink: WarningSink,
}

impl CompilerBuilder {
    pub fn add_source(mut self, unit: SourceUnit) -> Self {
        self.sources.push(unit);
        self
    }

    pub fn sources(mut self, units: impl IntoIterator<Item = SourceUnit>) -> Self {
        self.sources.extend(units);
        self
    }

    pub fn add_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn plugins(mut self, plugins: UserPlugins) -> Self {
        self.plugins = plugins;
        self
    }

    /// A directory that holds plugin runtimes, checked by
    /// [`Compiler::validate_user_plugins`].
    pub fn plugin_runtime_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.plugin_runtime_roots.push(root.into());
        self
    }

    pub fn conformance(mut self, conformance: ConformanceConfig) -> Self {
        self.conformance = Arc::new(conformance);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Arc::new(logging);
        self
    }

    pub fn css_registry(mut self, css: CssRegistry) -> Self {
        self.css_registry = Some(Arc::new(css));
        self
    }

    pub fn type_registry(mut self, registry: TypeRegistry) -> Self {
        self.type_registry = Some(registry);
        self
    }

    pub fn compile_time_globals(mut self, globals: IndexMap<String, Literal>) -> Self {
        self.compile_time_globals = globals;
        self
    }

    /// Reuse parsed trees across compilations through `cache`.
    pub fn cache(mut self, cache: Arc<AstCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn allow_external_calls(mut self, allow: bool) -> Self {
        self.allow_external_calls = Some(allow);
        self
    }

    pub fn disable_optimizer(mut self) -> Self {
        self.disable_optimizer = true;
        self
    }

    /// Resolve plugins permissively: unknown functions and directives are
    /// typed as unknown instead of reported.
    pub fn skip_plugin_validation(mut self) -> Self {
        self.skip_plugin_validation = true;
        self
    }

    pub fn add_debug_attributes(mut self) -> Self {
        self.add_debug_attributes = true;
        self
    }

    pub fn experimental_feature(mut self, feature: impl Into<String>) -> Self {
        self.experimental_features.insert(feature.into());
        self
    }

    pub fn warning_sink(mut self, sink: WarningSink) -> Self {
        self.warning_sink = sink;
        self
    }

    /// Freeze the options. Two sources with the same path are rejected.
    pub fn build(self) -> Result<Compiler> {
        let mut seen: IndexSet<&SourcePath> = IndexSet::new();
        for unit in &self.sources {
            if !seen.insert(unit.path()) {
                return Err(CompileError::configuration(format!(
                    "duplicate source path '{}'",
                    unit.path()
                ))
                .into());
            }
        }

        Ok(Compiler {
            sources: self.sources,
            dependencies: self.dependencies,
            plugins: self.plugins,
            plugin_runtime_roots: self.plugin_runtime_roots,
            conformance: self.conformance,
            logging: self.logging,
            css_registry: self.css_registry,
            type_registry: self.type_registry.unwrap_or_else(TypeRegistry::builtin),
            compile_time_globals: Arc::new(self.compile_time_globals),
            cache: self.cache,
            allow_external_calls: self.allow_external_calls,
            optimize: !self.disable_optimizer,
            skip_plugin_validation: self.skip_plugin_validation,
            add_debug_attributes: self.add_debug_attributes,
            experimental_features: self.experimental_features,
            warning_sink: self.warning_sink,
        })
    }
}

/// Sources plus options, shared by every compilation of a build.
///
/// Entry points take `&self`; nothing they do is visible to the next call
/// except through the optional [`AstCache`].
#[derive(Debug)]
pub struct Compiler {
    sources: Vec<SourceUnit>,
    dependencies: Vec<Dependency>,
    plugins: UserPlugins,
    plugin_runtime_roots: Vec<PathBuf>,
    conformance: Arc<ConformanceConfig>,
    logging: Arc<LoggingConfig>,
    css_registry: Option<Arc<CssRegistry>>,
    type_registry: TypeRegistry,
    compile_time_globals: Arc<IndexMap<String, Literal>>,
    cache: Option<Arc<AstCache>>,
    allow_external_calls: Option<bool>,
    optimize: bool,
    skip_plugin_validation: bool,
    add_debug_attributes: bool,
    experimental_features: BTreeSet<String>,
    warning_sink: WarningSink,
}

impl Compiler {
    pub fn builder() -> CompilerBuilder {
        CompilerBuilder::default()
    }

    pub fn sources(&self) -> &[SourceUnit] {
        &self.sources
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Compile for server-side rendering.
    pub fn compile_templates(&self) -> Result<CompiledTemplates> {
        self.entry_point("compile_templates", |diagnostics| {
            let allow_external_calls = self.disallow_external_calls()?;
            let resolver = self.resolver(self.plugin_mode(), diagnostics)?;
            let config = self
                .config(resolver)
                .allow_external_calls(allow_external_calls)
                .build();
            let result = self.parse(config, self.cache.is_none(), diagnostics)?;
            let registry = require_registry(result.registry, diagnostics)?;
            Ok(CompiledTemplates {
                file_set: result.file_set,
                registry,
            })
        })
    }

    /// Compile for one of the code generation backends.
    pub fn compile_for(&self, target: Target) -> Result<CompiledTemplates> {
        self.entry_point("compile_for", |diagnostics| {
            let resolver = self.resolver(self.plugin_mode(), diagnostics)?;
            let mut config = self.config(resolver);
            config = match target {
                Target::JsSrc | Target::IncrementalDom => config.desugar_html_and_state(false),
                Target::JavaInfo => config.optimize(false).desugar_html_and_state(false),
                Target::PySrc => config,
            };
            let result = self.parse(config.build(), false, diagnostics)?;
            let registry = require_registry(result.registry, diagnostics)?;
            Ok(CompiledTemplates {
                file_set: result.file_set,
                registry,
            })
        })
    }

    /// Compile only as far as needed for template signatures.
    pub fn compile_for_headers(&self) -> Result<HeaderResult> {
        self.entry_point("compile_for_headers", |diagnostics| {
            let allow_external_calls = self.disallow_external_calls()?;
            let resolver = self.resolver(self.plugin_mode(), diagnostics)?;
            let config = self
                .config(resolver)
                .allow_external_calls(allow_external_calls)
                .stop_before(PassId::CheckHeaderVars)
                .build();
            let result = self.parse(config, false, diagnostics)?;
            let registry = require_registry(result.registry, diagnostics)?;
            Ok(HeaderResult {
                file_set: result.file_set,
                registry,
                css_registry: self.css_registry.clone(),
            })
        })
    }

    /// Compile with every tree-distorting pass off, for source analyses.
    ///
    /// With `treat_errors_as_warnings` the errors are downgraded, so the call
    /// succeeds and returns them among the warnings.
    pub fn compile_for_analysis(
        &self,
        treat_errors_as_warnings: bool,
        rewrites: AstRewrites,
    ) -> Result<AnalysisResult> {
        self.entry_point("compile_for_analysis", |diagnostics| {
            let allow_external_calls = self.disallow_external_calls()?;
            let resolver = self.resolver(self.plugin_mode(), diagnostics)?;
            let config = self
                .config(resolver)
                .allow_external_calls(allow_external_calls)
                .allow_unknown_globals()
                .optimize(false)
                .insert_escaping_directives(false)
                .add_debug_attributes(false)
                .desugar_html_and_state(false)
                .ast_rewrites(rewrites)
                .build();
            let result = self.parse(config, false, diagnostics)?;
            if treat_errors_as_warnings {
                diagnostics.downgrade_errors();
            }
            Ok(AnalysisResult {
                registry: result.registry,
                file_set: result.file_set,
                warnings: diagnostics.warnings().cloned().collect(),
            })
        })
    }

    /// Collect the translatable messages.
    pub fn extract_msgs(&self) -> Result<MsgBundle> {
        self.entry_point("extract_msgs", |diagnostics| {
            let resolver = self.resolver(Mode::AllowUndefined, diagnostics)?;
            let config = self
                .config(resolver)
                .type_registry(TypeRegistry::unknown())
                .disable_all_type_checking()
                .allow_unknown_globals()
                .optimize(false)
                .desugar_html_and_state(false)
                .build();
            let result = self.parse(config, false, diagnostics)?;
            Ok(MsgBundle::extract(&result.file_set, diagnostics))
        })
    }

    /// Check that every user plugin has a runtime under the configured
    /// plugin runtime roots. Internal plugins are not checked.
    pub fn validate_user_plugins(&self) -> Result<()> {
        self.entry_point("validate_user_plugins", |diagnostics| {
            let resolver = self.resolver(Mode::RequireDefinitions, diagnostics)?;
            plugins::validate_user_plugins(&resolver, &self.plugin_runtime_roots, diagnostics);
            Ok(())
        })
    }

    /// Run the pipeline up to and including the conformance rules.
    pub fn check_conformance(&self) -> Result<ParseResult> {
        self.entry_point("check_conformance", |diagnostics| {
            let resolver = self.resolver(self.plugin_mode(), diagnostics)?;
            let config = self
                .config(resolver)
                .optimize(false)
                .desugar_html_and_state(false)
                .add_debug_attributes(false)
                .stop_after(PassId::Conformance)
                .build();
            self.parse(config, false, diagnostics)
        })
    }

    /// Run `op` with a fresh diagnostics sink and settle the outcome.
    ///
    /// A [`CompileError`] from `op` propagates as is. Any other failure is
    /// wrapped as [`CompileError::Internal`] when diagnostics were reported,
    /// and propagates unchanged otherwise. On success, errors in the sink
    /// fail the call and warnings go to the warning sink. The sink is
    /// consumed either way.
    fn entry_point<T>(
        &self,
        name: &str,
        op: impl FnOnce(&mut Diagnostics) -> Result<T>,
    ) -> Result<T> {
        tracing::debug!(entry_point = name, sources = self.sources.len(), "compiling");
        let mut diagnostics = Diagnostics::new();
        match op(&mut diagnostics) {
            Err(report) => {
                if report.downcast_ref::<CompileError>().is_some() || diagnostics.is_empty() {
                    Err(report)
                } else {
                    Err(report.wrap_err(CompileError::Internal {
                        diagnostics: diagnostics.into_vec(),
                    }))
                }
            }
            Ok(value) => {
                if diagnostics.has_errors() {
                    tracing::debug!(
                        entry_point = name,
                        errors = diagnostics.error_count(),
                        "compilation failed"
                    );
                    return Err(CompileError::Compilation {
                        diagnostics: diagnostics.into_vec(),
                    }
                    .into());
                }
                self.report_warnings(diagnostics)?;
                Ok(value)
            }
        }
    }

    fn report_warnings(&self, diagnostics: Diagnostics) -> Result<()> {
        let count = diagnostics.warning_count();
        if count == 0 {
            return Ok(());
        }
        if self.experimental_features.contains(THROW_ON_WARNINGS) {
            return Err(CompileError::Compilation {
                diagnostics: diagnostics.into_vec(),
            }
            .into());
        }

        let warnings = render(&diagnostics.into_vec());
        match &self.warning_sink {
            WarningSink::Log => tracing::warn!(count, "compiled with warnings:\n{}", warnings),
            WarningSink::Writer(writer) => {
                let mut writer = writer.lock();
                if let Err(err) = writeln!(writer, "{}", warnings) {
                    tracing::error!(%err, "failed to write compiler warnings");
                }
            }
        }
        Ok(())
    }

    /// External calls for a code-generating compile: off, unless they were
    /// explicitly turned on, which is a configuration error.
    fn disallow_external_calls(&self) -> Result<bool> {
        if self.allow_external_calls == Some(true) {
            return Err(CompileError::configuration(
                "external calls cannot be allowed when compiling templates for rendering",
            )
            .into());
        }
        Ok(false)
    }

    fn plugin_mode(&self) -> Mode {
        if self.skip_plugin_validation {
            Mode::AllowUndefined
        } else {
            Mode::RequireDefinitions
        }
    }

    /// A resolver over the internal and user plugins, failing on malformed
    /// registrations.
    fn resolver(&self, mode: Mode, diagnostics: &mut Diagnostics) -> Result<Arc<PluginResolver>> {
        let resolver = PluginResolver::new(mode, &self.plugins, diagnostics);
        throw_if_errors(diagnostics)?;
        Ok(Arc::new(resolver))
    }

    fn config(&self, resolver: Arc<PluginResolver>) -> PassManagerConfigBuilder {
        PassManagerConfig::builder()
            .type_registry(self.type_registry.clone())
            .plugin_resolver(resolver)
            .conformance(Arc::clone(&self.conformance))
            .logging(Arc::clone(&self.logging))
            .css_registry(self.css_registry.clone())
            .compile_time_globals(Arc::clone(&self.compile_time_globals))
            .allow_external_calls(self.allow_external_calls.unwrap_or(true))
            .optimize(self.optimize)
            .add_debug_attributes(self.add_debug_attributes)
    }

    fn parse(
        &self,
        config: PassManagerConfig,
        strip_doc_strings: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<ParseResult> {
        FileSetParser::new(&self.sources, &self.dependencies, PassManager::new(config))
            .cache(self.cache.as_deref())
            .strip_doc_strings(strip_doc_strings)
            .parse(diagnostics)
    }
}

fn throw_if_errors(diagnostics: &Diagnostics) -> Result<()> {
    if diagnostics.has_errors() {
        return Err(CompileError::Compilation {
            diagnostics: diagnostics.iter().cloned().collect(),
        }
        .into());
    }
    Ok(())
}

fn require_registry(
    registry: Option<TemplateRegistry>,
    diagnostics: &Diagnostics,
) -> Result<TemplateRegistry> {
    throw_if_errors(diagnostics)?;
    registry.ok_or_else(|| eyre!("no template registry was built"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler(src: &str) -> CompilerBuilder {
        Compiler::builder().add_source(SourceUnit::new("a.st", src))
    }

    #[test]
    fn test_unexpected_failure_without_diagnostics_is_unchanged() {
        let compiler = compiler("{namespace a}{template .t}x{/template}").build().unwrap();
        let err = compiler
            .entry_point::<()>("test", |_| Err(eyre!("boom")))
            .unwrap_err();
        assert!(err.downcast_ref::<CompileError>().is_none());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_unexpected_failure_after_diagnostics_is_internal() {
        let compiler = compiler("{namespace a}{template .t}x{/template}").build().unwrap();
        let err = compiler
            .entry_point::<()>("test", |diagnostics| {
                diagnostics.report(Diagnostic::error("check-calls", "bad call"));
                Err(eyre!("boom"))
            })
            .unwrap_err();
        let Some(CompileError::Internal { diagnostics }) = err.downcast_ref::<CompileError>() else {
            panic!("expected an internal error, got {:?}", err);
        };
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(err.root_cause().to_string(), "boom");
    }

    #[test]
    fn test_compile_errors_pass_through() {
        let compiler = compiler("{namespace a}{template .t}x{/template}").build().unwrap();
        let err = compiler
            .entry_point::<()>("test", |diagnostics| {
                diagnostics.report(Diagnostic::warning("optimize", "meh"));
                Err(CompileError::configuration("nope").into())
            })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompileError>(),
            Some(CompileError::Configuration { .. })
        ));
    }

    #[test]
    fn test_debug_attributes_reach_the_tree() {
        let compiler = compiler("{namespace a}{template .t}<div>x</div>{/template}")
            .add_debug_attributes()
            .build()
            .unwrap();
        let compiled = compiler.compile_for(Target::JsSrc).unwrap();
        let file = &compiled.file_set.files[0];
        let (_, template) = file.templates().next().unwrap();
        let stencil_ast::NodeKind::HtmlOpenTag(tag) = &file.node(template.body[0]).kind else {
            panic!("html should not be desugared for js");
        };
        assert_eq!(tag.attributes[0].name, crate::passes::DEBUG_ATTRIBUTE);
    }
}
