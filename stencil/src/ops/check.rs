//! Check operation - full compilation.

use eyre::Result;
use stencil_compiler::{Compiler, Target};

use crate::reports::CheckReport;

/// Compile every source, for rendering or for one backend.
pub fn check(compiler: &Compiler, target: Option<Target>) -> Result<CheckReport> {
    let compiled = match target {
        Some(target) => compiler.compile_for(target)?,
        None => compiler.compile_templates()?,
    };

    let templates = compiled
        .registry
        .templates()
        .filter(|t| !t.file_kind().is_dependency())
        .count();

    Ok(CheckReport {
        files: compiled.file_set.files.len(),
        templates,
        dependencies: compiler.dependencies().len(),
    })
}
