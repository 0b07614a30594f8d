use clap::Args;
use eyre::Result;

use super::{UnwrapOrExit, inputs::CompilerArgs};

#[derive(Args)]
pub struct PluginsCommand {
    #[command(flatten)]
    pub inputs: CompilerArgs,
}

impl PluginsCommand {
    pub fn run(&self) -> Result<()> {
        let compiler = self.inputs.compiler().unwrap_or_exit();
        compiler.validate_user_plugins().unwrap_or_exit();
        println!("✓ every user plugin has a runtime");
        Ok(())
    }
}
