use clap::Args;
use eyre::Result;

use super::{UnwrapOrExit, inputs::CompilerArgs};

#[derive(Args)]
pub struct ConformanceCommand {
    #[command(flatten)]
    pub inputs: CompilerArgs,
}

impl ConformanceCommand {
    pub fn run(&self) -> Result<()> {
        let compiler = self.inputs.compiler().unwrap_or_exit();
        let result = compiler.check_conformance().unwrap_or_exit();
        println!(
            "✓ {} file{} conform",
            result.file_set.files.len(),
            if result.file_set.files.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }
}
