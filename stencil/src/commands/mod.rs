mod analyze;
mod check;
mod conformance;
mod extract;
mod headers;
mod inputs;
mod plugins;

use analyze::AnalyzeCommand;
use check::CheckCommand;
use clap::{Parser, Subcommand};
use conformance::ConformanceCommand;
use eyre::Result;
use extract::ExtractCommand;
use headers::HeadersCommand;
use plugins::PluginsCommand;
use stencil_compiler::CompileError;

/// Extension trait for exiting on compilation failures with pretty formatting
pub(crate) trait UnwrapOrExit<T> {
    fn unwrap_or_exit(self) -> T;
}

impl<T> UnwrapOrExit<T> for Result<T> {
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(v) => v,
            Err(report) => {
                match report.downcast::<CompileError>() {
                    Ok(err) => eprintln!("{:?}", miette::Report::new(err)),
                    Err(report) => eprintln!("Error: {:?}", report),
                }
                std::process::exit(1);
            }
        }
    }
}

#[derive(Parser)]
#[command(name = "stencil")]
#[command(version)]
#[command(about = "Compile and analyze Stencil templates")]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Check(cmd) => cmd.run(),
            Commands::Conformance(cmd) => cmd.run(),
            Commands::Headers(cmd) => cmd.run(),
            Commands::Analyze(cmd) => cmd.run(),
            Commands::Extract(cmd) => cmd.run(),
            Commands::Plugins(cmd) => cmd.run(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile templates and report problems
    Check(CheckCommand),

    /// Run the conformance rules only
    Conformance(ConformanceCommand),

    /// Write template signatures as a dependency file
    Headers(HeadersCommand),

    /// Summarize templates for tooling, tolerating errors
    Analyze(AnalyzeCommand),

    /// Extract translatable messages
    Extract(ExtractCommand),

    /// Check that user plugins have runtimes
    Plugins(PluginsCommand),
}
