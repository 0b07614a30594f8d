//! Plugins bundled with the compiler.
//!
//! Each list is a process-wide static so an internal plugin is recognized by
//! pointer identity, however a user names their own plugins.

use std::sync::{Arc, LazyLock};

use stencil_ast::Type;

use super::{FunctionPlugin, MethodPlugin, PrintDirectivePlugin, Signature};

static FUNCTIONS: LazyLock<Vec<Arc<FunctionPlugin>>> = LazyLock::new(|| {
    let any_list = Type::list(Type::Unknown);
    let any_map = Type::map(Type::Unknown, Type::Unknown);
    [
        FunctionPlugin::new("css", vec![Signature::new(vec![Type::String], Type::String)]),
        FunctionPlugin::new("length", vec![Signature::new(vec![any_list.clone()], Type::Int)]),
        FunctionPlugin::new("keys", vec![Signature::new(vec![any_map], any_list)]),
        FunctionPlugin::new(
            "max",
            vec![Signature::new(vec![Type::Float, Type::Float], Type::Float)],
        ),
        FunctionPlugin::new(
            "min",
            vec![Signature::new(vec![Type::Float, Type::Float], Type::Float)],
        ),
        FunctionPlugin::new(
            "round",
            vec![
                Signature::new(vec![Type::Float], Type::Int),
                Signature::new(vec![Type::Float, Type::Int], Type::Float),
            ],
        ),
        FunctionPlugin::new("isNonnull", vec![Signature::new(vec![Type::Any], Type::Bool)]),
        FunctionPlugin::new(
            "checkNotNull",
            vec![Signature::new(vec![Type::Any], Type::Unknown)],
        ),
    ]
    .into_iter()
    .map(Arc::new)
    .collect()
});

static METHODS: LazyLock<Vec<Arc<MethodPlugin>>> = LazyLock::new(|| {
    [
        MethodPlugin::new("length", Type::String, vec![Signature::new(vec![], Type::Int)]),
        MethodPlugin::new("trim", Type::String, vec![Signature::new(vec![], Type::String)]),
        MethodPlugin::new(
            "contains",
            Type::String,
            vec![Signature::new(vec![Type::String], Type::Bool)],
        ),
        MethodPlugin::new(
            "length",
            Type::list(Type::Unknown),
            vec![Signature::new(vec![], Type::Int)],
        ),
        MethodPlugin::new(
            "keys",
            Type::map(Type::Unknown, Type::Unknown),
            vec![Signature::new(vec![], Type::list(Type::Unknown))],
        ),
    ]
    .into_iter()
    .map(Arc::new)
    .collect()
});

static DIRECTIVES: LazyLock<Vec<Arc<PrintDirectivePlugin>>> = LazyLock::new(|| {
    [
        ("escapeHtml", vec![0]),
        ("escapeHtmlAttribute", vec![0]),
        ("filterNormalizeUri", vec![0]),
        ("filterCssValue", vec![0]),
        ("escapeJsValue", vec![0]),
        ("noAutoescape", vec![0]),
        ("truncate", vec![1, 2]),
        ("changeNewlineToBr", vec![0]),
        ("id", vec![0]),
        ("text", vec![0]),
    ]
    .into_iter()
    .map(|(name, arities)| Arc::new(PrintDirectivePlugin::new(name, arities)))
    .collect()
});

pub fn internal_functions() -> &'static [Arc<FunctionPlugin>] {
    &FUNCTIONS
}

pub fn internal_methods() -> &'static [Arc<MethodPlugin>] {
    &METHODS
}

pub fn internal_directives() -> &'static [Arc<PrintDirectivePlugin>] {
    &DIRECTIVES
}

pub(crate) fn is_internal_function(plugin: &Arc<FunctionPlugin>) -> bool {
    FUNCTIONS.iter().any(|p| Arc::ptr_eq(p, plugin))
}

pub(crate) fn is_internal_method(plugin: &Arc<MethodPlugin>) -> bool {
    METHODS.iter().any(|p| Arc::ptr_eq(p, plugin))
}

pub(crate) fn is_internal_directive(plugin: &Arc<PrintDirectivePlugin>) -> bool {
    DIRECTIVES.iter().any(|p| Arc::ptr_eq(p, plugin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_not_name() {
        let css = internal_functions()
            .iter()
            .find(|p| p.name == "css")
            .expect("css is internal");
        assert!(is_internal_function(css));

        let lookalike = Arc::new(FunctionPlugin::clone(css));
        assert!(!is_internal_function(&lookalike));
    }
}
