use std::path::PathBuf;

use super::PluginResolver;
use crate::diagnostics::{Diagnostic, Diagnostics};

const PHASE: &str = "validate-plugins";

/// Check that every user plugin has a runtime implementation.
///
/// Internal plugins are skipped. Without `runtime_roots` only the presence of
/// a runtime declaration is checked.
pub fn validate_user_plugins(
    resolver: &PluginResolver,
    runtime_roots: &[PathBuf],
    diagnostics: &mut Diagnostics,
) {
    let functions = resolver
        .user_functions()
        .map(|p| (format!("function '{}'", p.name), p.runtime.as_deref()));
    let methods = resolver.user_methods().map(|p| {
        (
            format!("method '{}' on {}", p.name, p.receiver),
            p.runtime.as_deref(),
        )
    });
    let directives = resolver
        .user_directives()
        .map(|p| (format!("print directive '{}'", p.name), p.runtime.as_deref()));

    let mut checked = 0;
    for (label, runtime) in functions.chain(methods).chain(directives) {
        checked += 1;
        let Some(runtime) = runtime else {
            diagnostics.report(Diagnostic::error(
                PHASE,
                format!("{} declares no runtime", label),
            ));
            continue;
        };
        if runtime_roots.is_empty() {
            continue;
        }
        if !runtime_roots.iter().any(|root| root.join(runtime).exists()) {
            diagnostics.report(Diagnostic::error(
                PHASE,
                format!(
                    "runtime '{}' of {} was not found under any plugin runtime root",
                    runtime, label
                ),
            ));
        }
    }
    tracing::debug!(checked, roots = runtime_roots.len(), "validated user plugins");
}
