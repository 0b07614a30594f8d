use eyre::Result;
use stencil_ast::{
    CallNode, CallParamValue, FileNode, FileSetNode, NodeKind, TemplateMetadata, Visibility,
};
use stencil_core::{FileKind, SourceLocation};

use super::{FileSetPass, PassContext, PassId, types::content_type};
use crate::registry::TemplateRegistry;

/// Check every `{call}` against the registry: the callee must exist (unless
/// external calls are allowed), be callable from here, and receive valid
/// parameters.
///
/// Delegate calls are only checked for existence.
pub struct CheckCalls;

impl FileSetPass for CheckCalls {
    fn id(&self) -> PassId {
        PassId::CheckCalls
    }

    fn run(
        &self,
        file_set: &mut FileSetNode,
        registry: &TemplateRegistry,
        ctx: &mut PassContext<'_>,
    ) -> Result<()> {
        let mut checked = 0usize;
        for file in &file_set.files {
            for id in file.reachable_nodes() {
                let NodeKind::Call(call) = &file.node(id).kind else {
                    continue;
                };
                checked += 1;
                let location = file.location(file.node(id).span);
                for message in check_call(file, call, registry, ctx.config.allow_external_calls()) {
                    ctx.diagnostics
                        .error(self.id().name(), message, location.clone());
                }
            }
        }
        tracing::debug!(checked, "checked call sites");
        Ok(())
    }
}

fn check_call(
    file: &FileNode,
    call: &CallNode,
    registry: &TemplateRegistry,
    allow_external_calls: bool,
) -> Vec<String> {
    if call.delegate {
        if !allow_external_calls && !registry.has_delegate(&call.callee) {
            return vec![format!("delcall to undefined delegate '{}'", call.callee)];
        }
        return Vec::new();
    }

    let Some(callee) = registry.get(&call.callee) else {
        if allow_external_calls {
            return Vec::new();
        }
        return vec![format!("call to undefined template '{}'", call.callee)];
    };

    let mut errors = Vec::new();
    if callee.file_kind() == FileKind::IndirectDependency {
        errors.push(format!(
            "template '{}' comes from an indirect dependency and cannot be called directly",
            call.callee
        ));
    }
    if callee.visibility() == Visibility::Private && !same_file(callee.source_location(), file) {
        errors.push(format!(
            "template '{}' is private to {}",
            call.callee,
            callee.source_location().path
        ));
    }
    errors.extend(check_params(file, call, callee));
    errors
}

fn same_file(location: &SourceLocation, file: &FileNode) -> bool {
    location.path == file.path
}

fn check_params(file: &FileNode, call: &CallNode, callee: &TemplateMetadata) -> Vec<String> {
    let mut errors = Vec::new();
    for param in &call.params {
        let Some(declared) = callee.parameter(&param.name) else {
            errors.push(format!(
                "'{}' has no parameter '{}'",
                call.callee, param.name
            ));
            continue;
        };
        let given = match &param.value {
            CallParamValue::Expr(expr) => file.expr(*expr).ty(),
            CallParamValue::Content { kind, .. } => content_type(*kind),
        };
        if !declared.ty.is_assignable_from(&given) {
            errors.push(format!(
                "parameter '{}' of '{}' expects {}, found {}",
                param.name, call.callee, declared.ty, given
            ));
        }
    }

    if !call.data_all {
        for required in callee.required_params() {
            if !call.params.iter().any(|p| p.name == required.name) {
                errors.push(format!(
                    "call to '{}' is missing required parameter '{}'",
                    call.callee, required.name
                ));
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use stencil_ast::{CompilationUnit, TemplateKind};

    use super::*;
    use crate::{
        config::PassManagerConfig,
        diagnostics::Diagnostics,
        passes::{
            resolve::ResolveImports,
            testing::{messages, parse_as, run_file_pass, run_file_set_pass_with},
            types::ResolveTypes,
        },
        registry::{Dependency, DependencyKind},
    };

    fn checked(allow_external_calls: bool) -> Vec<String> {
        let mut files = vec![
            parse_as(
                "a.st",
                "{namespace app}{template .page}{@param n: int}\
                 {call .card}{param title: 'x' /}{/call}\
                 {call .card /}\
                 {call .card}{param title: $n /}{param bogus: 1 /}{/call}\
                 {call .card data=\"all\" /}\
                 {call lib.secret /}\
                 {call app.nope /}\
                 {call base.icon /}\
                 {delcall my.missing /}\
                 {/template}\
                 {template .card}{@param title: string}{$title}{/template}",
            ),
            parse_as(
                "b.st",
                "{namespace lib}{template .secret visibility=\"private\"}s{/template}",
            ),
        ];
        for file in &mut files {
            assert!(run_file_pass(&ResolveImports, file).is_empty());
            assert!(run_file_pass(&ResolveTypes, file).is_empty());
        }
        let mut set = FileSetNode::new(files);

        let icon = TemplateMetadata::builder("base.icon", TemplateKind::Basic)
            .build()
            .expect("valid metadata");
        let dependencies = vec![Dependency::new(
            DependencyKind::Indirect,
            "base.json",
            CompilationUnit::new(vec![icon]),
        )];
        let mut diagnostics = Diagnostics::new();
        let registry = TemplateRegistry::build(&set, &dependencies, &mut diagnostics);
        assert!(diagnostics.is_empty());

        let config = PassManagerConfig::builder()
            .allow_external_calls(allow_external_calls)
            .build();
        messages(&run_file_set_pass_with(&CheckCalls, &mut set, &registry, &config))
    }

    #[test]
    fn test_disallowed_external_calls() {
        assert_eq!(
            checked(false),
            vec![
                "call to 'app.card' is missing required parameter 'title'",
                "parameter 'title' of 'app.card' expects string, found int",
                "'app.card' has no parameter 'bogus'",
                "template 'lib.secret' is private to b.st",
                "call to undefined template 'app.nope'",
                "template 'base.icon' comes from an indirect dependency and cannot be called directly",
                "delcall to undefined delegate 'my.missing'",
            ]
        );
    }

    #[test]
    fn test_allowed_external_calls() {
        let messages = checked(true);
        assert_eq!(messages.len(), 5);
        assert!(!messages.iter().any(|m| m.contains("undefined")));
    }
}
