use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Args;
use eyre::{Context, Result};
use parking_lot::Mutex;
use stencil_compiler::{
    Compiler, Dependency, DependencyKind, WarningSink,
    config::{ConformanceConfig, CssRegistry, LoggingConfig, globals_from_toml},
    plugins::UserPlugins,
};
use stencil_core::SourceUnit;

use crate::ops;

/// Inputs and options shared by every command that builds a compiler.
#[derive(Args)]
pub struct CompilerArgs {
    /// Template files, or directories searched for `.st` files
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Compilation unit of a direct dependency (JSON, see `stencil headers`)
    #[arg(long = "dep", value_name = "FILE")]
    pub dependencies: Vec<PathBuf>,

    /// Compilation unit of a transitive dependency
    #[arg(long = "indirect-dep", value_name = "FILE")]
    pub indirect_dependencies: Vec<PathBuf>,

    /// Plugin declarations (TOML)
    #[arg(long, value_name = "FILE")]
    pub plugins: Option<PathBuf>,

    /// Directory holding plugin runtime files
    #[arg(long = "plugin-root", value_name = "DIR")]
    pub plugin_roots: Vec<PathBuf>,

    /// Conformance rules (TOML)
    #[arg(long, value_name = "FILE")]
    pub conformance: Option<PathBuf>,

    /// Loggable element declarations (TOML)
    #[arg(long, value_name = "FILE")]
    pub logging: Option<PathBuf>,

    /// Known CSS classes (TOML)
    #[arg(long, value_name = "FILE")]
    pub css: Option<PathBuf>,

    /// Compile-time globals (TOML)
    #[arg(long, value_name = "FILE")]
    pub globals: Option<PathBuf>,

    /// Keep the tree unoptimized
    #[arg(long)]
    pub no_optimize: bool,

    /// Do not require user plugins to be declared
    #[arg(long)]
    pub skip_plugin_validation: bool,

    /// Tag rendered elements with their template name and location
    #[arg(long)]
    pub debug_attributes: bool,
}

impl CompilerArgs {
    pub fn compiler(&self) -> Result<Compiler> {
        let mut builder = Compiler::builder()
            .warning_sink(WarningSink::Writer(Arc::new(Mutex::new(io::stderr()))));

        for path in ops::collect_sources(&self.sources)? {
            builder = builder.add_source(SourceUnit::from_file(&path)?);
        }
        for path in &self.dependencies {
            builder = builder.add_dependency(read_dependency(DependencyKind::Direct, path)?);
        }
        for path in &self.indirect_dependencies {
            builder =
                builder.add_dependency(read_dependency(DependencyKind::Indirect, path)?);
        }

        if let Some(path) = &self.plugins {
            builder = builder.plugins(UserPlugins::from_toml(&read(path)?)?);
        }
        for root in &self.plugin_roots {
            builder = builder.plugin_runtime_root(root);
        }
        if let Some(path) = &self.conformance {
            builder = builder.conformance(ConformanceConfig::from_toml(&read(path)?)?);
        }
        if let Some(path) = &self.logging {
            builder = builder.logging(LoggingConfig::from_toml(&read(path)?)?);
        }
        if let Some(path) = &self.css {
            builder = builder.css_registry(CssRegistry::from_toml(&read(path)?)?);
        }
        if let Some(path) = &self.globals {
            builder = builder.compile_time_globals(globals_from_toml(&read(path)?)?);
        }

        if self.no_optimize {
            builder = builder.disable_optimizer();
        }
        if self.skip_plugin_validation {
            builder = builder.skip_plugin_validation();
        }
        if self.debug_attributes {
            builder = builder.add_debug_attributes();
        }

        builder.build()
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).wrap_err_with(|| format!("failed to read '{}'", path.display()))
}

fn read_dependency(kind: DependencyKind, path: &Path) -> Result<Dependency> {
    Dependency::from_json(kind, path, &read(path)?)
}
