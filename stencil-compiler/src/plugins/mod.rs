//! Functions, methods and print directives callable from templates.
//!
//! The compiler bundles a set of internal plugins; users register more through
//! [`UserPlugins`]. A [`PluginResolver`] holds both and answers call-site
//! lookups in one of two [`Mode`]s.

mod internal;
mod resolver;
mod validate;

use std::sync::Arc;

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use stencil_ast::Type;

pub use internal::{internal_directives, internal_functions, internal_methods};
pub use resolver::{Mode, PluginResolver};
pub use validate::validate_user_plugins;

/// One overload of a function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub params: Vec<Type>,
    pub returns: Type,
}

impl Signature {
    pub fn new(params: Vec<Type>, returns: Type) -> Self {
        Self { params, returns }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionPlugin {
    pub name: String,
    pub signatures: Vec<Signature>,
    /// Path of the implementation, relative to a plugin runtime root.
    #[serde(default)]
    pub runtime: Option<String>,
}

impl FunctionPlugin {
    pub fn new(name: impl Into<String>, signatures: Vec<Signature>) -> Self {
        Self {
            name: name.into(),
            signatures,
            runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
}

/// A method called as `$value.name(args)` on values of the receiver type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodPlugin {
    pub name: String,
    pub receiver: Type,
    pub signatures: Vec<Signature>,
    #[serde(default)]
    pub runtime: Option<String>,
}

impl MethodPlugin {
    pub fn new(name: impl Into<String>, receiver: Type, signatures: Vec<Signature>) -> Self {
        Self {
            name: name.into(),
            receiver,
            signatures,
            runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
}

/// A `|name:args` print directive. Directives accept any argument types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintDirectivePlugin {
    pub name: String,
    pub arities: Vec<usize>,
    #[serde(default)]
    pub runtime: Option<String>,
}

impl PrintDirectivePlugin {
    pub fn new(name: impl Into<String>, arities: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            arities,
            runtime: None,
        }
    }

    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
}

/// Plugins supplied by the user of the compiler.
#[derive(Debug, Clone, Default)]
pub struct UserPlugins {
    pub functions: Vec<Arc<FunctionPlugin>>,
    pub methods: Vec<Arc<MethodPlugin>>,
    pub directives: Vec<Arc<PrintDirectivePlugin>>,
}

#[derive(Deserialize)]
struct PluginFile {
    #[serde(default)]
    functions: Vec<FunctionPlugin>,
    #[serde(default)]
    methods: Vec<MethodPlugin>,
    #[serde(default)]
    directives: Vec<PrintDirectivePlugin>,
}

impl UserPlugins {
    /// Read plugin declarations from TOML.
    ///
    /// ```toml
    /// [[functions]]
    /// name = "formatPrice"
    /// runtime = "price.js"
    /// signatures = [{ params = ["float"], returns = "string" }]
    /// ```
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: PluginFile = toml::from_str(content).wrap_err("invalid plugin file")?;
        Ok(Self {
            functions: file.functions.into_iter().map(Arc::new).collect(),
            methods: file.methods.into_iter().map(Arc::new).collect(),
            directives: file.directives.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn function(mut self, plugin: FunctionPlugin) -> Self {
        self.functions.push(Arc::new(plugin));
        self
    }

    pub fn method(mut self, plugin: MethodPlugin) -> Self {
        self.methods.push(Arc::new(plugin));
        self
    }

    pub fn directive(mut self, plugin: PrintDirectivePlugin) -> Self {
        self.directives.push(Arc::new(plugin));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.methods.is_empty() && self.directives.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugins_from_toml() {
        let plugins = UserPlugins::from_toml(
            r#"
            [[functions]]
            name = "formatPrice"
            runtime = "price.js"
            signatures = [{ params = ["float"], returns = "string" }]

            [[methods]]
            name = "upper"
            receiver = "string"
            signatures = [{ returns = "string" }]

            [[directives]]
            name = "bidi"
            arities = [0]
        "#,
        )
        .expect("valid plugin file");

        assert_eq!(plugins.functions[0].name, "formatPrice");
        assert_eq!(plugins.functions[0].signatures[0].params, vec![Type::Float]);
        assert_eq!(plugins.methods[0].receiver, Type::String);
        assert_eq!(plugins.methods[0].signatures[0].arity(), 0);
        assert_eq!(plugins.directives[0].runtime, None);
    }
}
