//! Report data structures for commands.
//!
//! Commands build reports, then render them to an Output target.

mod analyze;
mod check;
mod output;

pub use analyze::{AnalyzeReport, TemplateInfo};
pub use check::CheckReport;
pub use output::{Report, TerminalOutput};
