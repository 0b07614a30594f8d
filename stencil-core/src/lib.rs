//! Core utilities and types for the Stencil template compiler.
//!
//! This crate provides the fundamental source-level types shared by the
//! parser, the AST and the compilation pipeline.

mod fingerprint;
mod kind;
mod location;
mod source;

pub use fingerprint::Fingerprint;
pub use kind::FileKind;
pub use location::{LineIndex, Point, SourceLocation};
pub use source::{SourcePath, SourceUnit};
