//! Per-invocation pass manager configuration and its serializable pieces.

use std::sync::Arc;

use eyre::{Result, WrapErr, bail};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use stencil_ast::{Literal, TypeRegistry};

use crate::{
    passes::PassId,
    plugins::{Mode, PluginResolver},
};

/// Whether passes that rewrite source-level syntax run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AstRewrites {
    #[default]
    All,
    /// Keep the tree as written: no syntax desugaring, no global inlining.
    None,
}

/// Where the pass list is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationRule {
    StopBefore(PassId),
    StopAfter(PassId),
}

/// Organization-wide usage rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceConfig {
    #[serde(default)]
    pub rules: Vec<ConformanceRule>,
}

impl ConformanceConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).wrap_err("invalid conformance config")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConformanceRule {
    BannedFunction { name: String, message: String },
    BannedDirective { name: String, message: String },
    BannedRawText { text: String, message: String },
    BannedHtmlTag { tag: String, message: String },
}

impl ConformanceRule {
    pub fn message(&self) -> &str {
        match self {
            ConformanceRule::BannedFunction { message, .. }
            | ConformanceRule::BannedDirective { message, .. }
            | ConformanceRule::BannedRawText { message, .. }
            | ConformanceRule::BannedHtmlTag { message, .. } => message,
        }
    }
}

/// Visual elements that `{velog}` may reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub elements: Vec<LoggableElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggableElement {
    pub name: String,
    pub id: u64,
}

impl LoggingConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).wrap_err("invalid logging config")
    }

    pub fn element(&self, name: &str) -> Option<&LoggableElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

/// Known CSS class names for `css('name')` checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssRegistry {
    #[serde(default)]
    pub classes: IndexSet<String>,
}

impl CssRegistry {
    pub fn new(classes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).wrap_err("invalid css registry")
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

/// Read compile-time globals from TOML. Nested tables become dotted names.
///
/// ```toml
/// [app]
/// MAX_ITEMS = 10
/// TITLE = "Shop"
/// ```
pub fn globals_from_toml(content: &str) -> Result<IndexMap<String, Literal>> {
    let table: toml::Table = toml::from_str(content).wrap_err("invalid globals file")?;
    let mut globals = IndexMap::new();
    flatten_globals("", &table, &mut globals)?;
    Ok(globals)
}

fn flatten_globals(
    prefix: &str,
    table: &toml::Table,
    out: &mut IndexMap<String, Literal>,
) -> Result<()> {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let literal = match value {
            toml::Value::String(s) => Literal::String(s.clone()),
            toml::Value::Integer(i) => Literal::Int(*i),
            toml::Value::Float(f) => Literal::Float(*f),
            toml::Value::Boolean(b) => Literal::Bool(*b),
            toml::Value::Table(nested) => {
                flatten_globals(&name, nested, out)?;
                continue;
            }
            other => bail!("global '{}' has unsupported type {}", name, other.type_str()),
        };
        out.insert(name, literal);
    }
    Ok(())
}

/// Immutable configuration of one pass manager run.
///
/// Built with [`PassManagerConfig::builder`] from the compiler's stored
/// options plus the overrides of one entry point.
#[derive(Debug, Clone)]
pub struct PassManagerConfig {
    type_registry: TypeRegistry,
    plugin_resolver: Arc<PluginResolver>,
    conformance: Arc<ConformanceConfig>,
    logging: Arc<LoggingConfig>,
    css_registry: Option<Arc<CssRegistry>>,
    compile_time_globals: Arc<IndexMap<String, Literal>>,
    allow_external_calls: bool,
    allow_unknown_globals: bool,
    type_checking: bool,
    optimize: bool,
    desugar_html_and_state: bool,
    insert_escaping_directives: bool,
    add_debug_attributes: bool,
    continuation_rules: Vec<ContinuationRule>,
    ast_rewrites: AstRewrites,
}

impl PassManagerConfig {
    pub fn builder() -> PassManagerConfigBuilder {
        PassManagerConfigBuilder::default()
    }

    pub fn type_registry(&self) -> &TypeRegistry {
        &self.type_registry
    }

    pub fn plugin_resolver(&self) -> &PluginResolver {
        &self.plugin_resolver
    }

    pub fn conformance(&self) -> &ConformanceConfig {
        &self.conformance
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    pub fn css_registry(&self) -> Option<&CssRegistry> {
        self.css_registry.as_deref()
    }

    pub fn compile_time_globals(&self) -> &IndexMap<String, Literal> {
        &self.compile_time_globals
    }

    pub fn allow_external_calls(&self) -> bool {
        self.allow_external_calls
    }

    pub fn allow_unknown_globals(&self) -> bool {
        self.allow_unknown_globals
    }

    pub fn type_checking(&self) -> bool {
        self.type_checking
    }

    pub fn optimize(&self) -> bool {
        self.optimize
    }

    pub fn desugar_html_and_state(&self) -> bool {
        self.desugar_html_and_state
    }

    pub fn insert_escaping_directives(&self) -> bool {
        self.insert_escaping_directives
    }

    pub fn add_debug_attributes(&self) -> bool {
        self.add_debug_attributes
    }

    pub fn continuation_rules(&self) -> &[ContinuationRule] {
        &self.continuation_rules
    }

    pub fn ast_rewrites(&self) -> AstRewrites {
        self.ast_rewrites
    }
}

/// Builder for [`PassManagerConfig`].
#[derive(Debug, Clone)]
pub struct PassManagerConfigBuilder {
    type_registry: TypeRegistry,
    plugin_resolver: Option<Arc<PluginResolver>>,
    conformance: Arc<ConformanceConfig>,
    logging: Arc<LoggingConfig>,
    css_registry: Option<Arc<CssRegistry>>,
    compile_time_globals: Arc<IndexMap<String, Literal>>,
    allow_external_calls: bool,
    allow_unknown_globals: bool,
    type_checking: bool,
    optimize: bool,
    desugar_html_and_state: bool,
    insert_escaping_directives: bool,
    add_debug_attributes: bool,
    continuation_rules: Vec<ContinuationRule>,
    ast_rewrites: AstRewrites,
}

impl Default for PassManagerConfigBuilder {
    fn default() -> Self {
        Self {
            type_registry: TypeRegistry::builtin(),
            plugin_resolver: None,
            conformance: Arc::default(),
            logging: Arc::default(),
            css_registry: None,
            compile_time_globals: Arc::default(),
            allow_external_calls: true,
            allow_unknown_globals: false,
            type_checking: true,
            optimize: true,
            desugar_html_and_state: true,
            insert_escaping_directives: true,
            add_debug_attributes: false,
            continuation_rules: Vec::new(),
            ast_rewrites: AstRewrites::All,
        }
    }
}

impl PassManagerConfigBuilder {
    pub fn type_registry(mut self, registry: TypeRegistry) -> Self {
        self.type_registry = registry;
        self
    }

    pub fn plugin_resolver(mut self, resolver: Arc<PluginResolver>) -> Self {
        self.plugin_resolver = Some(resolver);
        self
    }

    pub fn conformance(mut self, conformance: Arc<ConformanceConfig>) -> Self {
        self.conformance = conformance;
        self
    }

    pub fn logging(mut self, logging: Arc<LoggingConfig>) -> Self {
        self.logging = logging;
        self
    }

    pub fn css_registry(mut self, css: Option<Arc<CssRegistry>>) -> Self {
        self.css_registry = css;
        self
    }

    pub fn compile_time_globals(mut self, globals: Arc<IndexMap<String, Literal>>) -> Self {
        self.compile_time_globals = globals;
        self
    }

    pub fn allow_external_calls(mut self, allow: bool) -> Self {
        self.allow_external_calls = allow;
        self
    }

    pub fn allow_unknown_globals(mut self) -> Self {
        self.allow_unknown_globals = true;
        self
    }

    pub fn disable_all_type_checking(mut self) -> Self {
        self.type_checking = false;
        self
    }

    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn desugar_html_and_state(mut self, desugar: bool) -> Self {
        self.desugar_html_and_state = desugar;
        self
    }

    pub fn insert_escaping_directives(mut self, insert: bool) -> Self {
        self.insert_escaping_directives = insert;
        self
    }

    pub fn add_debug_attributes(mut self, add: bool) -> Self {
        self.add_debug_attributes = add;
        self
    }

    pub fn stop_before(mut self, pass: PassId) -> Self {
        self.continuation_rules.push(ContinuationRule::StopBefore(pass));
        self
    }

    pub fn stop_after(mut self, pass: PassId) -> Self {
        self.continuation_rules.push(ContinuationRule::StopAfter(pass));
        self
    }

    pub fn ast_rewrites(mut self, rewrites: AstRewrites) -> Self {
        self.ast_rewrites = rewrites;
        self
    }

    pub fn build(self) -> PassManagerConfig {
        let plugin_resolver = self
            .plugin_resolver
            .unwrap_or_else(|| Arc::new(PluginResolver::builtin(Mode::RequireDefinitions)));
        PassManagerConfig {
            type_registry: self.type_registry,
            plugin_resolver,
            conformance: self.conformance,
            logging: self.logging,
            css_registry: self.css_registry,
            compile_time_globals: self.compile_time_globals,
            allow_external_calls: self.allow_external_calls,
            allow_unknown_globals: self.allow_unknown_globals,
            type_checking: self.type_checking,
            optimize: self.optimize,
            desugar_html_and_state: self.desugar_html_and_state,
            insert_escaping_directives: self.insert_escaping_directives,
            add_debug_attributes: self.add_debug_attributes,
            continuation_rules: self.continuation_rules,
            ast_rewrites: self.ast_rewrites,
        }
    }
}
