//! Compilation pipeline for Stencil templates.
//!
//! A [`Compiler`] holds a bundle of sources and precompiled dependencies and
//! exposes one entry point per kind of compilation:
//!
//! ```text
//! sources ─┐
//!          ├─ FileSetParser ─ file passes ─ TemplateRegistry ─ file set passes ─ result
//! deps ────┘
//! ```
//!
//! Each call collects its own [`Diagnostics`]. Error diagnostics fail the
//! call with [`CompileError::Compilation`]; warnings go to the configured
//! [`WarningSink`].

// Miette's derive macro generates code that triggers these warnings
#![allow(unused_assignments)]

mod assembler;
mod cache;
mod compiler;
pub mod config;
pub mod diagnostics;
mod error;
mod msgs;
pub mod passes;
pub mod plugins;
mod registry;

pub use assembler::{FileSetParser, ParseResult};
pub use cache::AstCache;
pub use compiler::{
    AnalysisResult, CompiledTemplates, Compiler, CompilerBuilder, HeaderResult, THROW_ON_WARNINGS,
    Target, WarningSink,
};
pub use config::{AstRewrites, PassManagerConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::CompileError;
pub use msgs::{Message, MsgBundle, MsgPart};
pub use registry::{Dependency, DependencyKind, TemplateRegistry};
