use clap::Args;
use eyre::Result;
use stencil_compiler::AstRewrites;

use super::{UnwrapOrExit, inputs::CompilerArgs};
use crate::{
    ops,
    reports::{Report, TerminalOutput},
};

#[derive(Args)]
pub struct AnalyzeCommand {
    #[command(flatten)]
    pub inputs: CompilerArgs,

    /// Fail on errors instead of reporting them as warnings
    #[arg(long)]
    pub strict: bool,

    /// Keep the tree exactly as written
    #[arg(long)]
    pub no_rewrites: bool,
}

impl AnalyzeCommand {
    pub fn run(&self) -> Result<()> {
        let compiler = self.inputs.compiler().unwrap_or_exit();
        let rewrites = if self.no_rewrites {
            AstRewrites::None
        } else {
            AstRewrites::All
        };
        let report = ops::analyze(&compiler, self.strict, rewrites).unwrap_or_exit();
        report.render(&mut TerminalOutput::new());
        Ok(())
    }
}
