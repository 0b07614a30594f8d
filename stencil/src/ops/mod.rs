//! Core operations.
//!
//! This module contains the logic behind the stencil commands, separated
//! from CLI argument parsing and output rendering.

pub mod analyze;
pub mod check;
pub mod sources;

pub use analyze::analyze;
pub use check::check;
pub use sources::collect_sources;
