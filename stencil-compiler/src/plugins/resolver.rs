use std::sync::Arc;

use indexmap::IndexMap;
use stencil_ast::{Callee, Type};

use super::{
    FunctionPlugin, MethodPlugin, PrintDirectivePlugin, Signature, UserPlugins,
    internal::{
        internal_directives, internal_functions, internal_methods, is_internal_directive,
        is_internal_function, is_internal_method,
    },
};
use crate::diagnostics::{Diagnostic, Diagnostics};

const PHASE: &str = "plugins";

/// How unresolved call sites are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Every referenced plugin must be registered.
    #[default]
    RequireDefinitions,
    /// Unresolved references are typed as unknown without a diagnostic.
    AllowUndefined,
}

/// Registered plugins, keyed by name.
#[derive(Debug, Clone)]
pub struct PluginResolver {
    mode: Mode,
    functions: IndexMap<String, Arc<FunctionPlugin>>,
    methods: IndexMap<String, Vec<Arc<MethodPlugin>>>,
    directives: IndexMap<String, Arc<PrintDirectivePlugin>>,
}

impl PluginResolver {
    /// A resolver over the internal plugins only.
    pub fn builtin(mode: Mode) -> Self {
        let mut diagnostics = Diagnostics::new();
        Self::new(mode, &UserPlugins::default(), &mut diagnostics)
    }

    /// Register the internal plugins followed by `user`.
    ///
    /// Malformed or conflicting registrations are reported to `diagnostics`;
    /// the first registration of a name wins. Check the sink before using
    /// the resolver.
    pub fn new(mode: Mode, user: &UserPlugins, diagnostics: &mut Diagnostics) -> Self {
        let mut resolver = Self {
            mode,
            functions: IndexMap::new(),
            methods: IndexMap::new(),
            directives: IndexMap::new(),
        };
        for plugin in internal_functions().iter().chain(&user.functions) {
            resolver.add_function(plugin, diagnostics);
        }
        for plugin in internal_methods().iter().chain(&user.methods) {
            resolver.add_method(plugin, diagnostics);
        }
        for plugin in internal_directives().iter().chain(&user.directives) {
            resolver.add_directive(plugin, diagnostics);
        }
        resolver
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn add_function(&mut self, plugin: &Arc<FunctionPlugin>, diagnostics: &mut Diagnostics) {
        if let Some(existing) = self.functions.get(&plugin.name) {
            if !Arc::ptr_eq(existing, plugin) {
                diagnostics.report(Diagnostic::error(
                    PHASE,
                    format!("function '{}' is registered more than once", plugin.name),
                ));
            }
            return;
        }
        let label = format!("function '{}'", plugin.name);
        if !check_signatures(&label, &plugin.signatures, diagnostics) {
            return;
        }
        self.functions.insert(plugin.name.clone(), plugin.clone());
    }

    fn add_method(&mut self, plugin: &Arc<MethodPlugin>, diagnostics: &mut Diagnostics) {
        let overloads = self.methods.entry(plugin.name.clone()).or_default();
        if let Some(existing) = overloads.iter().find(|m| m.receiver == plugin.receiver) {
            if !Arc::ptr_eq(existing, plugin) {
                diagnostics.report(Diagnostic::error(
                    PHASE,
                    format!(
                        "method '{}' on {} is registered more than once",
                        plugin.name, plugin.receiver
                    ),
                ));
            }
            return;
        }
        let label = format!("method '{}' on {}", plugin.name, plugin.receiver);
        if check_signatures(&label, &plugin.signatures, diagnostics) {
            overloads.push(plugin.clone());
        }
    }

    fn add_directive(&mut self, plugin: &Arc<PrintDirectivePlugin>, diagnostics: &mut Diagnostics) {
        if let Some(existing) = self.directives.get(&plugin.name) {
            if !Arc::ptr_eq(existing, plugin) {
                diagnostics.report(Diagnostic::error(
                    PHASE,
                    format!("print directive '{}' is registered more than once", plugin.name),
                ));
            }
            return;
        }
        if plugin.arities.is_empty() {
            diagnostics.report(Diagnostic::error(
                PHASE,
                format!("print directive '{}' declares no arities", plugin.name),
            ));
            return;
        }
        self.directives.insert(plugin.name.clone(), plugin.clone());
    }

    /// Resolve `name(args)` with `arity` arguments.
    ///
    /// Returns the error message for the call site when resolution fails.
    pub fn resolve_function(&self, name: &str, arity: usize) -> Result<Callee, String> {
        let Some(plugin) = self.functions.get(name) else {
            return self.undefined(format!("unknown function '{}'", name));
        };
        match plugin.signatures.iter().find(|s| s.arity() == arity) {
            Some(signature) => Ok(callee(name, signature)),
            None => self.undefined(format!(
                "function '{}' called with {} argument(s); expected {}",
                name,
                arity,
                arities(&plugin.signatures)
            )),
        }
    }

    /// Resolve `base.name(args)` for a base of type `receiver`.
    pub fn resolve_method(&self, name: &str, receiver: &Type, arity: usize) -> Result<Callee, String> {
        let candidates: Vec<&Arc<MethodPlugin>> = self
            .methods
            .get(name)
            .into_iter()
            .flatten()
            .filter(|m| m.receiver.is_assignable_from(receiver))
            .collect();
        if candidates.is_empty() {
            return self.undefined(format!("unknown method '{}' on {}", name, receiver));
        }
        let signatures = || candidates.iter().flat_map(|m| m.signatures.iter());
        match signatures().find(|s| s.arity() == arity) {
            Some(signature) => Ok(callee(name, signature)),
            None => self.undefined(format!(
                "method '{}' called with {} argument(s); expected {}",
                name,
                arity,
                arities(signatures())
            )),
        }
    }

    /// Check a `|name:args` directive.
    pub fn resolve_directive(&self, name: &str, arity: usize) -> Result<(), String> {
        let Some(plugin) = self.directives.get(name) else {
            return self.undefined(format!("unknown print directive '{}'", name)).map(|_| ());
        };
        if plugin.arities.contains(&arity) {
            return Ok(());
        }
        let expected = plugin
            .arities
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        self.undefined(format!(
            "print directive '{}' takes {} argument(s), not {}",
            name, expected, arity
        ))
        .map(|_| ())
    }

    fn undefined(&self, message: String) -> Result<Callee, String> {
        match self.mode {
            Mode::RequireDefinitions => Err(message),
            Mode::AllowUndefined => Ok(Callee::Unknown),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Arc<FunctionPlugin>> {
        self.functions.get(name)
    }

    pub fn directive(&self, name: &str) -> Option<&Arc<PrintDirectivePlugin>> {
        self.directives.get(name)
    }

    pub fn user_functions(&self) -> impl Iterator<Item = &Arc<FunctionPlugin>> {
        self.functions.values().filter(|p| !is_internal_function(p))
    }

    pub fn user_methods(&self) -> impl Iterator<Item = &Arc<MethodPlugin>> {
        self.methods
            .values()
            .flatten()
            .filter(|p| !is_internal_method(p))
    }

    pub fn user_directives(&self) -> impl Iterator<Item = &Arc<PrintDirectivePlugin>> {
        self.directives.values().filter(|p| !is_internal_directive(p))
    }
}

fn callee(name: &str, signature: &Signature) -> Callee {
    Callee::Plugin {
        name: name.to_string(),
        params: signature.params.clone(),
        returns: signature.returns.clone(),
    }
}

fn arities<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> String {
    let mut arities: Vec<usize> = signatures.into_iter().map(Signature::arity).collect();
    arities.sort_unstable();
    arities.dedup();
    arities
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}

fn check_signatures(label: &str, signatures: &[Signature], diagnostics: &mut Diagnostics) -> bool {
    if signatures.is_empty() {
        diagnostics.report(Diagnostic::error(
            PHASE,
            format!("{} declares no signatures", label),
        ));
        return false;
    }
    let mut seen = Vec::new();
    for signature in signatures {
        if seen.contains(&signature.arity()) {
            diagnostics.report(Diagnostic::error(
                PHASE,
                format!(
                    "{} declares two signatures with {} parameter(s)",
                    label,
                    signature.arity()
                ),
            ));
            return false;
        }
        seen.push(signature.arity());
    }
    true
}
