use clap::{Args, ValueEnum};
use eyre::Result;
use stencil_compiler::Target;

use super::{UnwrapOrExit, inputs::CompilerArgs};
use crate::{
    ops,
    reports::{Report, TerminalOutput},
};

#[derive(Args)]
pub struct CheckCommand {
    #[command(flatten)]
    pub inputs: CompilerArgs,

    /// Compile for a code generation backend instead of for rendering
    #[arg(long, value_enum)]
    pub target: Option<BackendTarget>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendTarget {
    Js,
    Idom,
    Py,
    JavaInfo,
}

impl From<BackendTarget> for Target {
    fn from(target: BackendTarget) -> Self {
        match target {
            BackendTarget::Js => Target::JsSrc,
            BackendTarget::Idom => Target::IncrementalDom,
            BackendTarget::Py => Target::PySrc,
            BackendTarget::JavaInfo => Target::JavaInfo,
        }
    }
}

impl CheckCommand {
    pub fn run(&self) -> Result<()> {
        let compiler = self.inputs.compiler().unwrap_or_exit();
        let report = ops::check(&compiler, self.target.map(Target::from)).unwrap_or_exit();
        report.render(&mut TerminalOutput::new());
        Ok(())
    }
}
