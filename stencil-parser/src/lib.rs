//! Parser for Stencil template files.
//!
//! [`parse`] turns one [`SourceUnit`](stencil_core::SourceUnit) into a
//! [`FileNode`](stencil_ast::FileNode). Syntax errors are reported as
//! [`ParseError`]s carrying the file content, so they render with source
//! snippets through `miette`.

// Miette's derive macro generates code that triggers these warnings
#![allow(unused_assignments)]

mod cursor;
mod error;
mod expr;
mod parser;

pub use error::{ParseError, Result, SourceContext};
pub use parser::parse;
