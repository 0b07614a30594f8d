//! Template value types and the named-type registry.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The type of a template value.
///
/// Serialized as its textual form (e.g. `"list<string>"`) so compilation
/// units stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Type {
    /// `?`: not known to the compiler; every check passes.
    Unknown,
    Any,
    Null,
    Bool,
    Int,
    Float,
    String,
    Html,
    Attributes,
    Uri,
    Css,
    Js,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
}

impl Type {
    pub fn list(element: Type) -> Self {
        Type::List(Box::new(element))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Box::new(key), Box::new(value))
    }

    /// Unknown and any are compatible with everything.
    pub fn is_loose(&self) -> bool {
        matches!(self, Type::Unknown | Type::Any)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Whether a value of type `other` may be used where `self` is expected.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self.is_loose() || other.is_loose() {
            return true;
        }
        match (self, other) {
            (Type::Float, Type::Int) => true,
            (Type::List(a), Type::List(b)) => a.is_assignable_from(b),
            (Type::Map(ak, av), Type::Map(bk, bv)) => {
                ak.is_assignable_from(bk) && av.is_assignable_from(bv)
            }
            (a, b) => a == b,
        }
    }

    /// The narrowest type both sides are assignable to.
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            self.clone()
        } else if self.is_numeric() && other.is_numeric() {
            Type::Float
        } else if self.is_assignable_from(other) {
            self.clone()
        } else if other.is_assignable_from(self) {
            other.clone()
        } else {
            Type::Any
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => write!(f, "?"),
            Type::Any => write!(f, "any"),
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Html => write!(f, "html"),
            Type::Attributes => write!(f, "attributes"),
            Type::Uri => write!(f, "uri"),
            Type::Css => write!(f, "css"),
            Type::Js => write!(f, "js"),
            Type::List(element) => write!(f, "list<{}>", element),
            Type::Map(key, value) => write!(f, "map<{}, {}>", key, value),
        }
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for Type {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TypeRegistry::builtin().resolve(&value)
    }
}

/// Error resolving a type expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("unknown type '{0}'")]
    UnknownName(String),
    #[error("malformed type expression '{expr}': {reason}")]
    Malformed { expr: String, reason: String },
}

/// Resolves type expressions such as `list<map<string, int>>`.
///
/// The builtin registry knows the primitive names. Additional names can be
/// registered as aliases. The *unknown* registry resolves every expression,
/// well-formed or not, to [`Type::Unknown`]; it is used by reduced-fidelity
/// compiles that must not fail on types.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    named: IndexMap<String, Type>,
    resolve_all_to_unknown: bool,
}

impl TypeRegistry {
    pub fn builtin() -> Self {
        let named = [
            ("?", Type::Unknown),
            ("any", Type::Any),
            ("null", Type::Null),
            ("bool", Type::Bool),
            ("int", Type::Int),
            ("float", Type::Float),
            ("number", Type::Float),
            ("string", Type::String),
            ("html", Type::Html),
            ("attributes", Type::Attributes),
            ("uri", Type::Uri),
            ("css", Type::Css),
            ("js", Type::Js),
        ]
        .into_iter()
        .map(|(name, ty)| (name.to_string(), ty))
        .collect();
        Self {
            named,
            resolve_all_to_unknown: false,
        }
    }

    /// A registry that types everything as unknown.
    pub fn unknown() -> Self {
        Self {
            named: IndexMap::new(),
            resolve_all_to_unknown: true,
        }
    }

    /// Register an additional named type.
    pub fn with_alias(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.named.insert(name.into(), ty);
        self
    }

    pub fn is_unknown_registry(&self) -> bool {
        self.resolve_all_to_unknown
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.named.get(name)
    }

    /// Resolve a type expression.
    pub fn resolve(&self, expr: &str) -> Result<Type, TypeError> {
        if self.resolve_all_to_unknown {
            return Ok(Type::Unknown);
        }
        let mut parser = TypeExprParser {
            src: expr,
            pos: 0,
            registry: self,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != expr.len() {
            return Err(parser.malformed("unexpected trailing input"));
        }
        Ok(ty)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

struct TypeExprParser<'a> {
    src: &'a str,
    pos: usize,
    registry: &'a TypeRegistry,
}

impl TypeExprParser<'_> {
    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), TypeError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.malformed(&format!("expected '{}'", c)))
        }
    }

    fn malformed(&self, reason: &str) -> TypeError {
        TypeError::Malformed {
            expr: self.src.to_string(),
            reason: reason.to_string(),
        }
    }

    fn parse_type(&mut self) -> Result<Type, TypeError> {
        self.skip_ws();
        if self.eat('?') {
            return Ok(Type::Unknown);
        }
        let name_len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(self.rest().len());
        if name_len == 0 {
            return Err(self.malformed("expected a type name"));
        }
        let name = &self.src[self.pos..self.pos + name_len];
        self.pos += name_len;

        match name {
            "list" => {
                self.expect('<')?;
                let element = self.parse_type()?;
                self.expect('>')?;
                Ok(Type::list(element))
            }
            "map" => {
                self.expect('<')?;
                let key = self.parse_type()?;
                self.expect(',')?;
                let value = self.parse_type()?;
                self.expect('>')?;
                Ok(Type::map(key, value))
            }
            _ => self
                .registry
                .lookup(name)
                .cloned()
                .ok_or_else(|| TypeError::UnknownName(name.to_string())),
        }
    }
}
