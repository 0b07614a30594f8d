//! Analyze operation - tolerant compilation for tooling.

use eyre::Result;
use stencil_compiler::{AstRewrites, Compiler};

use crate::reports::{AnalyzeReport, TemplateInfo};

/// Compile with every tree-rewriting pass off and summarize the templates.
pub fn analyze(compiler: &Compiler, strict: bool, rewrites: AstRewrites) -> Result<AnalyzeReport> {
    let result = compiler.compile_for_analysis(!strict, rewrites)?;

    let templates = result
        .registry
        .as_ref()
        .map(|registry| {
            registry
                .templates()
                .filter(|t| !t.file_kind().is_dependency())
                .map(|t| TemplateInfo {
                    name: t.template_name().to_string(),
                    kind: t.kind().to_string(),
                    params: t.parameters().len(),
                    location: t.source_location().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(AnalyzeReport {
        parsed: result.registry.is_some(),
        templates,
        problems: result.warnings.len(),
    })
}
