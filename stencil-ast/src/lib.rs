//! Abstract syntax tree and template metadata for Stencil.
//!
//! This crate provides the data the compilation pipeline operates on:
//!
//! ```text
//! source (.st) → stencil-parser → FileNode arenas → passes → FileSetNode + TemplateRegistry → backend
//! ```
//!
//! Each parsed file owns an arena of [`Node`]s and an arena of [`Expr`]s.
//! Nodes refer to each other through [`NodeId`]s that stay stable while
//! passes rewrite the tree in place.
//!
//! [`TemplateMetadata`] is the dependency-minimal synopsis of a template. It
//! can be derived from a parsed template or decoded from a serialized
//! [`CompilationUnit`].

// Miette's derive macro generates code that triggers these warnings
#![allow(unused_assignments)]

mod expr;
mod ids;
mod index_vec;
mod metadata;
mod node;
mod template;
mod types;

pub use expr::{BinaryOp, Callee, Expr, ExprKind, Literal, UnaryOp};
pub use ids::{ExprId, NodeId};
pub use index_vec::{Idx, IndexVec};
pub use metadata::{
    CompilationUnit, DataAllCallSituation, DelegateInfo, MetadataError, Parameter,
    TemplateMetadata, TemplateMetadataBuilder,
};
pub use node::{
    CallNode, CallParam, CallParamValue, FileNode, FileSetNode, ForNode, HtmlAttribute, HtmlTag,
    IfBranch, IfNode, LetNode, LetValue, MsgNode, Node, NodeKind, ParamDecl, PrintDirective,
    PrintNode, SpecialChar, Span, StateDecl, TemplateNode, VeLogNode,
};
pub use template::{ContentKind, ParamKind, TemplateKind, Visibility};
pub use types::{Type, TypeError, TypeRegistry};
